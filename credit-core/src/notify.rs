//! User-facing notification routing
//!
//! The core pushes messages through a sink the host injects; delivery is
//! fire-and-forget and never blocks a ledger operation.

use std::fmt;

/// Message severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Operation succeeded
    Success,
    /// Operation failed and needs attention
    Error,
    /// Informational
    Info,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Success => write!(f, "success"),
            NotificationKind::Error => write!(f, "error"),
            NotificationKind::Info => write!(f, "info"),
        }
    }
}

/// Sink for user-facing messages
pub trait NotificationSink: Send + Sync {
    /// Push a message; must not block
    fn show(&self, message: &str, kind: NotificationKind);
}

/// Default sink that routes notifications to the log
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn show(&self, message: &str, kind: NotificationKind) {
        match kind {
            NotificationKind::Success | NotificationKind::Info => {
                tracing::info!(kind = %kind, "{}", message)
            }
            NotificationKind::Error => tracing::warn!(kind = %kind, "{}", message),
        }
    }
}

/// Sink that records messages in memory, for assertions in tests
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: parking_lot::Mutex<Vec<(String, NotificationKind)>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages recorded so far
    pub fn messages(&self) -> Vec<(String, NotificationKind)> {
        self.messages.lock().clone()
    }

    /// Whether any recorded message contains the needle
    pub fn contains(&self, needle: &str) -> bool {
        self.messages.lock().iter().any(|(m, _)| m.contains(needle))
    }
}

impl NotificationSink for MemorySink {
    fn show(&self, message: &str, kind: NotificationKind) {
        self.messages.lock().push((message.to_string(), kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records() {
        let sink = MemorySink::new();
        sink.show("credits deducted", NotificationKind::Success);
        sink.show("network down, retrying", NotificationKind::Info);

        assert_eq!(sink.messages().len(), 2);
        assert!(sink.contains("retrying"));
        assert!(!sink.contains("corruption"));
    }
}
