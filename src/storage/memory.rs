use super::{LockTable, NamedLockLease, StockStore};
use crate::config::StoreConfig;
use crate::core::{ProductId, Result, Stock, StockError, StockId};
use crate::transaction::{PendingWrite, TransactionId, TransactionManager};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedMutexGuard, RwLock};
use tracing::{debug, warn};

/// Committed state of one stock row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRow {
    pub product_id: ProductId,
    pub quantity: u64,
    pub version: u64,
}

/// In-process transactional stock store.
///
/// - reads see committed rows plus the reading transaction's own staged writes
/// - `persist` behaves like an UPDATE: it takes the row lock and keeps it
///   until the transaction ends
/// - named locks live outside transactions and are released only through
///   their lease
pub struct MemoryStockStore {
    config: StoreConfig,
    rows: RwLock<HashMap<StockId, StockRow>>,
    next_id: AtomicU64,
    transactions: TransactionManager,
    row_locks: LockTable<StockId>,
    named_locks: LockTable<String>,
    /// Current holder of every taken named lock.
    named_holders: Mutex<HashMap<String, (u64, OwnedMutexGuard<()>)>>,
    next_holder: AtomicU64,
    available: AtomicBool,
}

impl Default for MemoryStockStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl MemoryStockStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            rows: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            transactions: TransactionManager::new(),
            row_locks: LockTable::new(),
            named_locks: LockTable::new(),
            named_holders: Mutex::new(HashMap::new()),
            next_holder: AtomicU64::new(1),
            available: AtomicBool::new(true),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Simulates an outage: while unavailable every operation except
    /// rollback and named-lock release fails with `StoreUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Committed view of a row, outside any transaction.
    pub async fn snapshot(&self, id: StockId) -> Option<StockRow> {
        self.rows.read().await.get(&id).cloned()
    }

    pub fn is_named_lock_held(&self, key: &str) -> bool {
        self.named_locks.is_locked(&key.to_string())
    }

    pub fn is_row_locked(&self, id: StockId) -> bool {
        self.row_locks.is_locked(&id)
    }

    pub async fn active_transactions(&self) -> usize {
        self.transactions.active_count().await
    }

    fn ensure_available(&self) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StockError::StoreUnavailable(
                "in-memory store is marked unavailable".into(),
            ));
        }
        Ok(())
    }

    async fn ensure_active(&self, tx: TransactionId) -> Result<()> {
        if !self.transactions.is_active(tx).await {
            return Err(StockError::InvalidOperation(format!(
                "Transaction {} not found or already finished",
                tx
            )));
        }
        Ok(())
    }

    /// Delay between a read and its result reaching the caller.
    async fn simulate_io(&self) {
        if let Some(latency) = self.config.io_latency() {
            tokio::time::sleep(latency).await;
        }
    }

    async fn ensure_row_exists(&self, id: StockId) -> Result<()> {
        if self.rows.read().await.contains_key(&id) {
            Ok(())
        } else {
            Err(StockError::NotFound(id))
        }
    }

    /// Takes the row lock for `tx` unless it already holds it.
    async fn lock_row(&self, tx: TransactionId, id: StockId) -> Result<()> {
        if self.transactions.holds_row_lock(tx, id).await? {
            return Ok(());
        }

        let wait = self.config.row_lock_wait();
        let Some(guard) = self.row_locks.acquire(&id, wait).await? else {
            warn!(%tx, stock_id = %id, wait_ms = wait.as_millis() as u64, "Row lock wait timed out");
            return Err(lock_timeout(format!("row:{}", id), wait));
        };

        self.transactions.attach_row_lock(tx, id, guard).await
    }

    async fn read(&self, tx: TransactionId, id: StockId, versioned: bool) -> Result<Stock> {
        let row = self
            .rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StockError::NotFound(id))?;

        let quantity = match self.transactions.pending_write(tx, id).await? {
            Some(write) => write.quantity,
            None => row.quantity,
        };
        let version = versioned.then_some(row.version);

        Ok(Stock::new(id, row.product_id, quantity, version))
    }
}

#[async_trait]
impl StockStore for MemoryStockStore {
    async fn begin(&self) -> Result<TransactionId> {
        self.ensure_available()?;
        Ok(self.transactions.begin().await)
    }

    async fn commit(&self, tx: TransactionId) -> Result<()> {
        let mut txn = self.transactions.take(tx).await?;

        if let Err(err) = self.ensure_available() {
            txn.rollback()?;
            return Err(err);
        }

        let mut rows = self.rows.write().await;

        let conflict = txn.writes().find_map(|(id, write)| {
            let actual = rows.get(id).map(|row| row.version)?;
            match write.expected_version {
                Some(expected) if expected != actual => Some(StockError::ConcurrentModification {
                    id: *id,
                    expected,
                    actual,
                }),
                _ => None,
            }
        });
        if let Some(err) = conflict {
            txn.rollback()?;
            return Err(err);
        }

        let writes = txn.commit()?;
        for (id, write) in &writes {
            if let Some(row) = rows.get_mut(id) {
                row.quantity = write.quantity;
                row.version += 1;
            }
        }
        drop(rows);

        debug!(
            %tx,
            writes = writes.len(),
            elapsed_us = txn.duration().as_micros() as u64,
            "Transaction committed"
        );
        drop(txn);
        Ok(())
    }

    async fn rollback(&self, tx: TransactionId) -> Result<()> {
        self.transactions.rollback(tx).await?;
        debug!(%tx, "Transaction rolled back");
        Ok(())
    }

    async fn create_stock(&self, product_id: ProductId, quantity: u64) -> Result<Stock> {
        self.ensure_available()?;

        let id = StockId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let row = StockRow {
            product_id,
            quantity,
            version: 0,
        };
        self.rows.write().await.insert(id, row);

        debug!(stock_id = %id, %product_id, quantity, "Stock created");
        Ok(Stock::new(id, product_id, quantity, Some(0)))
    }

    async fn fetch_by_id(&self, tx: TransactionId, id: StockId) -> Result<Stock> {
        self.ensure_available()?;
        self.ensure_active(tx).await?;
        let stock = self.read(tx, id, false).await?;
        self.simulate_io().await;
        Ok(stock)
    }

    async fn fetch_with_pessimistic_lock(&self, tx: TransactionId, id: StockId) -> Result<Stock> {
        self.ensure_available()?;
        self.ensure_active(tx).await?;
        self.ensure_row_exists(id).await?;
        self.lock_row(tx, id).await?;
        let stock = self.read(tx, id, false).await?;
        self.simulate_io().await;
        Ok(stock)
    }

    async fn fetch_with_version(&self, tx: TransactionId, id: StockId) -> Result<Stock> {
        self.ensure_available()?;
        self.ensure_active(tx).await?;
        let stock = self.read(tx, id, true).await?;
        self.simulate_io().await;
        Ok(stock)
    }

    async fn persist(&self, tx: TransactionId, stock: &Stock) -> Result<()> {
        self.ensure_available()?;
        self.ensure_active(tx).await?;

        let id = stock.id();
        self.ensure_row_exists(id).await?;
        self.lock_row(tx, id).await?;

        if let Some(expected) = stock.version() {
            let actual = self
                .rows
                .read()
                .await
                .get(&id)
                .map(|row| row.version)
                .ok_or(StockError::NotFound(id))?;

            if actual != expected {
                debug!(%tx, stock_id = %id, expected, actual, "Version check failed");
                return Err(StockError::ConcurrentModification {
                    id,
                    expected,
                    actual,
                });
            }
        }

        self.transactions
            .stage_write(
                tx,
                id,
                PendingWrite {
                    quantity: stock.quantity(),
                    expected_version: stock.version(),
                },
            )
            .await
    }

    async fn acquire_named_lock(&self, key: &str, wait: Duration) -> Result<NamedLockLease> {
        self.ensure_available()?;

        let Some(guard) = self.named_locks.acquire(&key.to_string(), wait).await? else {
            warn!(key, wait_ms = wait.as_millis() as u64, "Named lock wait timed out");
            return Err(lock_timeout(key.to_string(), wait));
        };

        let holder = self.next_holder.fetch_add(1, Ordering::SeqCst);
        {
            let mut holders = self.named_holders.lock()?;
            holders.insert(key.to_string(), (holder, guard));
        }

        debug!(key, holder, "Named lock acquired");
        Ok(NamedLockLease::new(key, holder))
    }

    async fn release_named_lock(&self, lease: NamedLockLease) -> Result<()> {
        let released = {
            let mut holders = self.named_holders.lock()?;
            let owned = matches!(
                holders.get(lease.key()),
                Some((holder, _)) if *holder == lease.holder()
            );
            if owned {
                holders.remove(lease.key())
            } else {
                None
            }
        };

        match released {
            Some(held) => {
                drop(held);
                self.named_locks.remove_idle(&lease.key().to_string());
                debug!(key = lease.key(), holder = lease.holder(), "Named lock released");
            }
            None => warn!(
                key = lease.key(),
                holder = lease.holder(),
                "Release of a named lock this lease does not hold"
            ),
        }
        Ok(())
    }
}

fn lock_timeout(key: String, wait: Duration) -> StockError {
    StockError::LockTimeout {
        key,
        waited_ms: wait.as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn seeded(quantity: u64) -> (MemoryStockStore, StockId) {
        let store = MemoryStockStore::default();
        let stock = store.create_stock(ProductId(1), quantity).await.unwrap();
        (store, stock.id())
    }

    #[tokio::test]
    async fn test_create_assigns_ids_and_initial_version() {
        let store = MemoryStockStore::default();
        let a = store.create_stock(ProductId(1), 10).await.unwrap();
        let b = store.create_stock(ProductId(2), 20).await.unwrap();

        assert_ne!(a.id(), b.id());
        assert_eq!(a.version(), Some(0));
        assert_eq!(store.snapshot(b.id()).await.unwrap().quantity, 20);
    }

    #[tokio::test]
    async fn test_commit_applies_write_and_bumps_version() {
        let (store, id) = seeded(10).await;

        let tx = store.begin().await.unwrap();
        let mut stock = store.fetch_with_version(tx, id).await.unwrap();
        stock.decrease(3).unwrap();
        store.persist(tx, &stock).await.unwrap();

        // own write visible, others see committed state
        assert_eq!(store.fetch_by_id(tx, id).await.unwrap().quantity(), 7);
        assert_eq!(store.snapshot(id).await.unwrap().quantity, 10);

        store.commit(tx).await.unwrap();

        let row = store.snapshot(id).await.unwrap();
        assert_eq!(row.quantity, 7);
        assert_eq!(row.version, 1);
        assert!(!store.is_row_locked(id));
        assert_eq!(store.active_transactions().await, 0);
    }

    #[tokio::test]
    async fn test_rollback_discards_write() {
        let (store, id) = seeded(10).await;

        let tx = store.begin().await.unwrap();
        let mut stock = store.fetch_with_pessimistic_lock(tx, id).await.unwrap();
        assert!(store.is_row_locked(id));
        stock.decrease(10).unwrap();
        store.persist(tx, &stock).await.unwrap();
        store.rollback(tx).await.unwrap();

        let row = store.snapshot(id).await.unwrap();
        assert_eq!(row.quantity, 10);
        assert_eq!(row.version, 0);
        assert!(!store.is_row_locked(id));
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let (store, id) = seeded(10).await;

        let slow = store.begin().await.unwrap();
        let mut stale = store.fetch_with_version(slow, id).await.unwrap();

        let fast = store.begin().await.unwrap();
        let mut fresh = store.fetch_with_version(fast, id).await.unwrap();
        fresh.decrease(1).unwrap();
        store.persist(fast, &fresh).await.unwrap();
        store.commit(fast).await.unwrap();

        stale.decrease(1).unwrap();
        let err = store.persist(slow, &stale).await.unwrap_err();
        assert_eq!(
            err,
            StockError::ConcurrentModification {
                id,
                expected: 0,
                actual: 1
            }
        );
        store.rollback(slow).await.unwrap();
        assert_eq!(store.snapshot(id).await.unwrap().quantity, 9);
    }

    #[tokio::test]
    async fn test_row_lock_wait_times_out() {
        let store = MemoryStockStore::new(StoreConfig::default().row_lock_wait_ms(20));
        let id = store.create_stock(ProductId(1), 5).await.unwrap().id();

        let holder = store.begin().await.unwrap();
        store.fetch_with_pessimistic_lock(holder, id).await.unwrap();

        let waiter = store.begin().await.unwrap();
        let err = store
            .fetch_with_pessimistic_lock(waiter, id)
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::LockTimeout { .. }));

        // plain reads never wait for the row lock
        assert_eq!(store.fetch_by_id(waiter, id).await.unwrap().quantity(), 5);
    }

    #[tokio::test]
    async fn test_pessimistic_reader_waits_for_commit() {
        let (store, id) = seeded(2).await;
        let store = Arc::new(store);

        let first = store.begin().await.unwrap();
        let mut stock = store.fetch_with_pessimistic_lock(first, id).await.unwrap();

        let second = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let tx = store.begin().await.unwrap();
                let seen = store.fetch_with_pessimistic_lock(tx, id).await.unwrap();
                store.rollback(tx).await.unwrap();
                seen.quantity()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        stock.decrease(1).unwrap();
        store.persist(first, &stock).await.unwrap();
        store.commit(first).await.unwrap();

        assert_eq!(second.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_row() {
        let store = MemoryStockStore::default();
        let tx = store.begin().await.unwrap();
        for result in [
            store.fetch_by_id(tx, StockId(99)).await,
            store.fetch_with_version(tx, StockId(99)).await,
            store.fetch_with_pessimistic_lock(tx, StockId(99)).await,
        ] {
            assert_eq!(result.unwrap_err(), StockError::NotFound(StockId(99)));
        }
    }

    #[tokio::test]
    async fn test_named_lock_is_independent_of_transactions() {
        let (store, id) = seeded(1).await;
        let key = id.lock_key();

        let lease = store
            .acquire_named_lock(&key, Duration::from_millis(10))
            .await
            .unwrap();

        let tx = store.begin().await.unwrap();
        store.commit(tx).await.unwrap();
        assert!(store.is_named_lock_held(&key));

        let err = store
            .acquire_named_lock(&key, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::LockTimeout { .. }));

        store.release_named_lock(lease).await.unwrap();
        assert!(!store.is_named_lock_held(&key));
        let again = store.acquire_named_lock(&key, Duration::ZERO).await.unwrap();
        assert_eq!(again.key(), key);
    }

    #[tokio::test]
    async fn test_released_named_locks_do_not_accumulate() {
        let store = MemoryStockStore::default();
        for n in 0..20 {
            let lease = store
                .acquire_named_lock(&format!("order:{}", n), Duration::ZERO)
                .await
                .unwrap();
            store.release_named_lock(lease).await.unwrap();
        }
        assert_eq!(store.named_locks.len(), 0);

        let held = store.acquire_named_lock("order:0", Duration::ZERO).await.unwrap();
        assert_eq!(store.named_locks.len(), 1);
        store.release_named_lock(held).await.unwrap();
        assert_eq!(store.named_locks.len(), 0);
    }

    #[tokio::test]
    async fn test_stale_lease_does_not_release_new_holder() {
        let store = MemoryStockStore::default();
        let first = store.acquire_named_lock("k", Duration::ZERO).await.unwrap();
        let stale = NamedLockLease::new("k", first.holder());
        store.release_named_lock(first).await.unwrap();

        let _second = store.acquire_named_lock("k", Duration::ZERO).await.unwrap();
        store.release_named_lock(stale).await.unwrap();
        assert!(store.is_named_lock_held("k"));
    }

    #[tokio::test]
    async fn test_outage() {
        let (store, id) = seeded(3).await;
        let tx = store.begin().await.unwrap();
        let mut stock = store.fetch_with_version(tx, id).await.unwrap();
        stock.decrease(1).unwrap();
        store.persist(tx, &stock).await.unwrap();

        store.set_available(false);
        assert!(matches!(
            store.commit(tx).await,
            Err(StockError::StoreUnavailable(_))
        ));
        assert!(matches!(
            store.begin().await,
            Err(StockError::StoreUnavailable(_))
        ));
        // rollback stays possible during an outage
        store.rollback(tx).await.unwrap();
        assert!(!store.is_row_locked(id));

        store.set_available(true);
        assert_eq!(store.snapshot(id).await.unwrap().quantity, 3);
    }
}
