// ============================================================================
// stocklock Library
// ============================================================================
//
// Decrementing a shared stock counter under contention, four ways:
// - pessimistic: exclusive row lock held for the transaction
// - optimistic: version-checked write, optionally retried
// - named lock: session-scoped advisory lock around a fresh transaction
// - local mutex: per-id mutex inside one process
//
// ============================================================================

pub mod config;
pub mod core;
pub mod facade;
pub mod service;
pub mod storage;
pub mod transaction;

pub use config::{RetryPolicy, StockConfig, StoreConfig};
pub use crate::core::{ProductId, Result, Stock, StockError, StockId};
pub use facade::StockFacade;
pub use service::{
    LocalMutexStockService, NamedLockStockService, OptimisticStockService,
    PessimisticStockService, UnguardedStockService,
};
pub use storage::{MemoryStockStore, NamedLockLease, StockRow, StockStore};
pub use transaction::TransactionId;
