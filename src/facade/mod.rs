// ============================================================================
// Stock Facade - retry orchestration and named-lock scoping
// ============================================================================

mod lease;

use crate::config::StockConfig;
use crate::core::{Result, StockError, StockId};
use crate::service::{NamedLockStockService, OptimisticStockService, PessimisticStockService};
use crate::storage::StockStore;
use futures::FutureExt;
use lease::LeaseGuard;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Entry point for callers that decrement stock.
///
/// # Examples
///
/// ```ignore
/// let store = Arc::new(MemoryStockStore::default());
/// let stock = store.create_stock(ProductId(1), 100).await?;
///
/// let facade = StockFacade::new(Arc::clone(&store), StockConfig::default());
/// facade.decrease_with_optimistic_retry(stock.id(), 1).await?;
/// ```
pub struct StockFacade<S: StockStore> {
    store: Arc<S>,
    config: StockConfig,
    pessimistic: PessimisticStockService<S>,
    optimistic: OptimisticStockService<S>,
    named_lock: NamedLockStockService<S>,
}

impl<S: StockStore> StockFacade<S> {
    pub fn new(store: Arc<S>, config: StockConfig) -> Self {
        Self {
            pessimistic: PessimisticStockService::new(Arc::clone(&store)),
            optimistic: OptimisticStockService::new(Arc::clone(&store)),
            named_lock: NamedLockStockService::new(Arc::clone(&store)),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &StockConfig {
        &self.config
    }

    /// Decrement under a row lock. Concurrent callers queue, nothing to retry.
    pub async fn decrease_pessimistic(&self, id: StockId, amount: u64) -> Result<()> {
        self.pessimistic.decrease(id, amount).await
    }

    /// One optimistic attempt; a lost race surfaces as `ConcurrentModification`.
    pub async fn decrease_optimistic_once(&self, id: StockId, amount: u64) -> Result<()> {
        self.optimistic.decrease(id, amount).await
    }

    /// Optimistic decrement retried on transient failures.
    ///
    /// `NotFound` and `InvalidOperation` are returned from the first attempt.
    /// Conflicts, lock timeouts and (when enabled) outages are retried after
    /// the policy's backoff until `max_attempts` is reached, which yields
    /// `RetryExhausted` carrying the last failure.
    pub async fn decrease_with_optimistic_retry(&self, id: StockId, amount: u64) -> Result<()> {
        let retry = &self.config.retry;
        let mut attempt = 1usize;

        loop {
            let err = match self.optimistic.decrease(id, amount).await {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(stock_id = %id, attempt, "Optimistic decrease succeeded after retry");
                    }
                    return Ok(());
                }
                Err(err) => err,
            };

            if !retry.is_retryable(&err) {
                return Err(err);
            }

            if !retry.should_retry(attempt, &err) {
                warn!(stock_id = %id, attempts = attempt, error = %err, "Giving up on optimistic decrease");
                return Err(StockError::RetryExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let backoff = retry.backoff(attempt);
            debug!(
                stock_id = %id,
                attempt,
                kind = err.kind(),
                backoff_ms = backoff.as_millis() as u64,
                "Retrying optimistic decrease"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Decrement while holding the named lock for `id`.
    ///
    /// The lock is released exactly once before this returns, whether the
    /// decrement succeeded, failed or panicked. A panic is resumed after the
    /// release. A failed release is logged and does not mask the decrement's
    /// own outcome.
    pub async fn decrease_with_named_lock(&self, id: StockId, amount: u64) -> Result<()> {
        let key = id.lock_key();
        let lease = self
            .store
            .acquire_named_lock(&key, self.config.named_lock_wait())
            .await?;
        let mut guard = LeaseGuard::new(Arc::clone(&self.store), lease);

        let outcome = AssertUnwindSafe(self.named_lock.decrease(id, amount))
            .catch_unwind()
            .await;

        if let Err(err) = guard.release().await {
            warn!(key = %key, error = %err, "Named lock release failed");
        }

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
