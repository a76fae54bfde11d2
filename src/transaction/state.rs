// ============================================================================
// Transaction State
// ============================================================================
//
// A transaction moves Active -> Committed | Aborted. While active it owns:
// - staged writes, applied atomically on commit
// - row-lock guards, released when the transaction leaves the Active state
//
// ============================================================================

use crate::core::{Result, StockError, StockId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::OwnedMutexGuard;

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// New quantity for one row, applied on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingWrite {
    pub quantity: u64,
    /// Version the writer read; `None` for unconditional writes.
    pub expected_version: Option<u64>,
}

#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    writes: HashMap<StockId, PendingWrite>,
    row_locks: HashMap<StockId, OwnedMutexGuard<()>>,
    start_time: std::time::Instant,
}

impl Transaction {
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            writes: HashMap::new(),
            row_locks: HashMap::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn pending_write(&self, stock_id: StockId) -> Option<&PendingWrite> {
        self.writes.get(&stock_id)
    }

    pub fn writes(&self) -> impl Iterator<Item = (&StockId, &PendingWrite)> {
        self.writes.iter()
    }

    pub fn holds_row_lock(&self, stock_id: StockId) -> bool {
        self.row_locks.contains_key(&stock_id)
    }

    /// Keeps the row lock until the transaction ends.
    pub fn attach_row_lock(&mut self, stock_id: StockId, guard: OwnedMutexGuard<()>) {
        self.row_locks.entry(stock_id).or_insert(guard);
    }

    /// Stage a write, replacing any earlier write to the same row.
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn stage_write(&mut self, stock_id: StockId, write: PendingWrite) -> Result<()> {
        self.ensure_active("stage a write")?;
        self.writes.insert(stock_id, write);
        Ok(())
    }

    /// Mark transaction as committed.
    ///
    /// Staged writes are drained and returned. Row locks stay held until the
    /// transaction is dropped, so the caller applies the writes first.
    pub fn commit(&mut self) -> Result<HashMap<StockId, PendingWrite>> {
        self.ensure_active("commit")?;
        self.state = TransactionState::Committed;
        Ok(std::mem::take(&mut self.writes))
    }

    /// Mark transaction as aborted, discard writes and release row locks.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active("rollback")?;
        self.writes.clear();
        self.row_locks.clear();
        self.state = TransactionState::Aborted;
        Ok(())
    }

    fn ensure_active(&self, action: &str) -> Result<()> {
        if !self.state.is_active() {
            return Err(StockError::InvalidOperation(format!(
                "Cannot {}: transaction {} is {}",
                action, self.id, self.state
            )));
        }
        Ok(())
    }
}
