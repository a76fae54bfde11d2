// ============================================================================
// Store Access Port
// ============================================================================
//
// Everything the decrement strategies need from a transactional backend.
// `MemoryStockStore` is the in-process implementation; any other backend
// (a relational database with row locks and advisory locks) plugs in by
// implementing `StockStore`.
//
// ============================================================================

pub mod lock_table;
pub mod memory;

pub use lock_table::LockTable;
pub use memory::{MemoryStockStore, StockRow};

use crate::core::{ProductId, Result, Stock, StockId};
use crate::transaction::TransactionId;
use async_trait::async_trait;
use std::time::Duration;

/// Proof of holding a named lock.
///
/// Deliberately not `Clone`: releasing consumes the lease, so one acquisition
/// can be released only once.
#[derive(Debug, PartialEq, Eq)]
pub struct NamedLockLease {
    key: String,
    holder: u64,
}

impl NamedLockLease {
    pub fn new(key: impl Into<String>, holder: u64) -> Self {
        Self {
            key: key.into(),
            holder,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn holder(&self) -> u64 {
        self.holder
    }
}

#[async_trait]
pub trait StockStore: Send + Sync + 'static {
    /// Starts a new, independent transaction.
    async fn begin(&self) -> Result<TransactionId>;

    /// Applies every staged write atomically and releases the transaction's
    /// row locks.
    async fn commit(&self, tx: TransactionId) -> Result<()>;

    /// Discards staged writes and releases row locks. Calling it for an
    /// unknown or finished transaction is a no-op.
    async fn rollback(&self, tx: TransactionId) -> Result<()>;

    /// Inserts a new row; the store assigns the id and starts the version at 0.
    async fn create_stock(&self, product_id: ProductId, quantity: u64) -> Result<Stock>;

    /// Plain read without lock or version.
    async fn fetch_by_id(&self, tx: TransactionId, id: StockId) -> Result<Stock>;

    /// Read that takes the row lock for `tx`, blocking other lock-taking
    /// readers and writers of the row until `tx` ends.
    async fn fetch_with_pessimistic_lock(&self, tx: TransactionId, id: StockId) -> Result<Stock>;

    /// Read that carries the committed version for a later conditional
    /// [`persist`](StockStore::persist). Takes no lock.
    async fn fetch_with_version(&self, tx: TransactionId, id: StockId) -> Result<Stock>;

    /// Stages the stock's quantity for commit.
    ///
    /// When the stock carries a version the write is conditional: it fails
    /// with `ConcurrentModification` if the committed version moved on.
    async fn persist(&self, tx: TransactionId, stock: &Stock) -> Result<()>;

    /// Waits up to `wait` for the named lock, failing with `LockTimeout`.
    /// The lock is not tied to any transaction.
    async fn acquire_named_lock(&self, key: &str, wait: Duration) -> Result<NamedLockLease>;

    /// Releases a named lock, whether or not any transaction is still open.
    async fn release_named_lock(&self, lease: NamedLockLease) -> Result<()>;
}
