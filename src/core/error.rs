use super::types::StockId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StockError {
    #[error("Stock '{0}' not found")]
    NotFound(StockId),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Concurrent modification of stock '{id}': expected version {expected}, found {actual}")]
    ConcurrentModification {
        id: StockId,
        expected: u64,
        actual: u64,
    },

    #[error("Timed out after {waited_ms}ms waiting for lock '{key}'")]
    LockTimeout { key: String, waited_ms: u64 },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: usize,
        last: Box<StockError>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StockError {
    /// Failures that may succeed when the same operation is attempted again.
    ///
    /// `NotFound` and `InvalidOperation` are deterministic for a given
    /// committed state and never belong here.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StockError::ConcurrentModification { .. }
                | StockError::LockTimeout { .. }
                | StockError::StoreUnavailable(_)
        )
    }

    /// Short label used in logs and scenario reports.
    pub fn kind(&self) -> &'static str {
        match self {
            StockError::NotFound(_) => "not_found",
            StockError::InvalidOperation(_) => "invalid_operation",
            StockError::ConcurrentModification { .. } => "concurrent_modification",
            StockError::LockTimeout { .. } => "lock_timeout",
            StockError::StoreUnavailable(_) => "store_unavailable",
            StockError::RetryExhausted { .. } => "retry_exhausted",
            StockError::InvalidConfig(_) => "invalid_config",
        }
    }
}

pub type Result<T> = std::result::Result<T, StockError>;

impl<T> From<std::sync::PoisonError<T>> for StockError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}
