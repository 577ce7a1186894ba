//! Error taxonomy for the credit ledger
//!
//! Every failure is constructed at the point where it happens as a typed
//! variant; retry classification and recovery planning work off the
//! [`ErrorKind`] discriminant instead of message sniffing.

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Bad input, surfaced immediately with a user-readable message
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote endpoint unreachable or request failed in transit
    #[error("Network error: {0}")]
    Network(String),

    /// Local persistence error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Payment verification failed
    #[error("Payment error: {0}")]
    Payment(String),

    /// Remote reconciliation failed
    #[error("Sync error: {0}")]
    Sync(String),

    /// Local state no longer matches the transaction log
    #[error("Data corruption: {0}")]
    DataCorruption(String),

    /// Concurrency error (cancelled operation, closed channel, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

/// Discriminant used for retry classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input
    Validation,
    /// Transient network failure
    Network,
    /// Local persistence failure
    Storage,
    /// Payment verification failure
    Payment,
    /// Remote reconciliation failure
    Sync,
    /// Corrupted local state
    DataCorruption,
    /// Cancelled or racing operation
    Concurrency,
    /// Bad configuration
    Config,
    /// Serialization failure
    Serialization,
    /// IO failure
    Io,
    /// Anything else
    Other,
}

impl Error {
    /// Classification discriminant for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Network(_) => ErrorKind::Network,
            Error::Storage(_) => ErrorKind::Storage,
            Error::Payment(_) => ErrorKind::Payment,
            Error::Sync(_) => ErrorKind::Sync,
            Error::DataCorruption(_) => ErrorKind::DataCorruption,
            Error::Concurrency(_) => ErrorKind::Concurrency,
            Error::Config(_) => ErrorKind::Config,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::Io(_) => ErrorKind::Io,
            Error::Other(_) => ErrorKind::Other,
        }
    }

    /// Build a recovery plan for this error
    ///
    /// Only network and sync failures recover without user intervention;
    /// everything else needs a fallback action or an explicit trigger.
    pub fn recovery_plan(&self) -> RecoveryPlan {
        match self.kind() {
            ErrorKind::Network => RecoveryPlan {
                actions: vec![
                    RecoveryAction::RetryWithBackoff,
                    RecoveryAction::WaitForNetwork,
                    RecoveryAction::EnterOfflineMode,
                ],
                recommended: RecoveryAction::RetryWithBackoff,
                can_auto_recover: true,
            },
            ErrorKind::Sync => RecoveryPlan {
                actions: vec![
                    RecoveryAction::RetryWithBackoff,
                    RecoveryAction::WaitForNetwork,
                ],
                recommended: RecoveryAction::RetryWithBackoff,
                can_auto_recover: true,
            },
            ErrorKind::Storage | ErrorKind::Io => RecoveryPlan {
                actions: vec![
                    RecoveryAction::RetryWithBackoff,
                    RecoveryAction::EnterOfflineMode,
                ],
                recommended: RecoveryAction::RetryWithBackoff,
                can_auto_recover: false,
            },
            ErrorKind::Payment => RecoveryPlan {
                actions: vec![
                    RecoveryAction::UseAlternatePayment,
                    RecoveryAction::RetryWithBackoff,
                ],
                recommended: RecoveryAction::UseAlternatePayment,
                can_auto_recover: false,
            },
            ErrorKind::DataCorruption => RecoveryPlan {
                actions: vec![
                    RecoveryAction::RefetchFromRemote,
                    RecoveryAction::ContactSupport,
                ],
                recommended: RecoveryAction::RefetchFromRemote,
                can_auto_recover: false,
            },
            ErrorKind::Validation | ErrorKind::Config => RecoveryPlan {
                actions: vec![RecoveryAction::FixInput],
                recommended: RecoveryAction::FixInput,
                can_auto_recover: false,
            },
            ErrorKind::Concurrency | ErrorKind::Serialization | ErrorKind::Other => RecoveryPlan {
                actions: vec![RecoveryAction::ContactSupport],
                recommended: RecoveryAction::ContactSupport,
                can_auto_recover: false,
            },
        }
    }
}

/// Action the caller can take in response to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Retry the operation with exponential backoff
    RetryWithBackoff,
    /// Wait for the network oracle to report online
    WaitForNetwork,
    /// Continue serving from local state only
    EnterOfflineMode,
    /// Offer the user a different payment method
    UseAlternatePayment,
    /// Wipe local state and refetch from the remote ledger
    RefetchFromRemote,
    /// The input was rejected; correct it and resubmit
    FixInput,
    /// Non-recoverable; escalate
    ContactSupport,
}

/// Recovery plan derived from an error
#[derive(Debug, Clone)]
pub struct RecoveryPlan {
    /// Actions available to the caller, most preferred first
    pub actions: Vec<RecoveryAction>,
    /// The action the core recommends
    pub recommended: RecoveryAction,
    /// Whether the core can recover without user intervention
    pub can_auto_recover: bool,
}
