use crate::core::{Result, StockError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings of the in-memory transactional backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a transaction waits for a row lock before `LockTimeout`.
    pub row_lock_wait_ms: u64,
    /// Simulated round trip added to every fetch. Zero disables it.
    pub io_latency_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            row_lock_wait_ms: 50_000,
            io_latency_ms: 0,
        }
    }
}

impl StoreConfig {
    pub fn row_lock_wait_ms(mut self, ms: u64) -> Self {
        self.row_lock_wait_ms = ms;
        self
    }

    pub fn io_latency_ms(mut self, ms: u64) -> Self {
        self.io_latency_ms = ms;
        self
    }

    pub fn row_lock_wait(&self) -> Duration {
        Duration::from_millis(self.row_lock_wait_ms)
    }

    pub fn io_latency(&self) -> Option<Duration> {
        (self.io_latency_ms > 0).then(|| Duration::from_millis(self.io_latency_ms))
    }
}

/// Configuration for the optimistic retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: usize,
    /// Backoff after the first failed attempt.
    pub base_backoff_ms: u64,
    /// Cap for the doubling backoff. Equal to `base_backoff_ms` gives a
    /// fixed interval.
    pub max_backoff_ms: u64,
    /// Whether `StoreUnavailable` counts as transient.
    pub retry_store_unavailable: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1000,
            base_backoff_ms: 50,
            max_backoff_ms: 50,
            retry_store_unavailable: true,
        }
    }
}

impl RetryPolicy {
    /// Retries transient failures until one attempt succeeds.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: usize::MAX,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Fixed interval between attempts.
    pub fn fixed_backoff_ms(mut self, ms: u64) -> Self {
        self.base_backoff_ms = ms;
        self.max_backoff_ms = ms;
        self
    }

    /// Doubling interval starting at `base_ms`, capped at `max_ms`.
    pub fn exponential_backoff_ms(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.base_backoff_ms = base_ms;
        self.max_backoff_ms = max_ms;
        self
    }

    pub fn retry_store_unavailable(mut self, retry: bool) -> Self {
        self.retry_store_unavailable = retry;
        self
    }

    /// Backoff to sleep after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: usize) -> Duration {
        let base = self.base_backoff_ms;
        let cap = self.max_backoff_ms.max(base);

        let mut backoff = base;
        for _ in 1..attempt {
            backoff = backoff.saturating_mul(2).min(cap);
            if backoff == cap || backoff == 0 {
                break;
            }
        }
        Duration::from_millis(backoff)
    }

    /// Whether `err` is worth another attempt at all, regardless of the cap.
    pub fn is_retryable(&self, err: &StockError) -> bool {
        match err {
            StockError::StoreUnavailable(_) => self.retry_store_unavailable,
            other => other.is_transient(),
        }
    }

    /// Whether a failure of attempt number `attempt` should be retried.
    pub fn should_retry(&self, attempt: usize, err: &StockError) -> bool {
        attempt < self.max_attempts.max(1) && self.is_retryable(err)
    }
}

/// Top-level configuration of the stock decrement stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockConfig {
    pub store: StoreConfig,
    pub retry: RetryPolicy,
    /// How long `decrease_with_named_lock` waits for the named lock.
    pub named_lock_wait_ms: u64,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            retry: RetryPolicy::default(),
            named_lock_wait_ms: 3_000,
        }
    }
}

impl StockConfig {
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn named_lock_wait_ms(mut self, ms: u64) -> Self {
        self.named_lock_wait_ms = ms;
        self
    }

    pub fn named_lock_wait(&self) -> Duration {
        Duration::from_millis(self.named_lock_wait_ms)
    }

    /// Parse from JSON; missing fields keep their defaults.
    ///
    /// ```ignore
    /// let config = StockConfig::from_json_str(r#"{ "retry": { "max_attempts": 5 } }"#)?;
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StockError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StockError::InvalidConfig(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(StockError::InvalidConfig(
                "retry.max_attempts must be > 0".into(),
            ));
        }

        if self.retry.base_backoff_ms > self.retry.max_backoff_ms {
            return Err(StockError::InvalidConfig(
                "retry.base_backoff_ms cannot exceed retry.max_backoff_ms".into(),
            ));
        }

        if self.store.row_lock_wait_ms == 0 {
            return Err(StockError::InvalidConfig(
                "store.row_lock_wait_ms must be > 0".into(),
            ));
        }

        Ok(())
    }
}
