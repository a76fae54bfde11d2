// ============================================================================
// Decrement Strategies
// ============================================================================
//
// Every service runs exactly one decrement attempt in its own transaction
// and never retries. Retrying and named-lock scoping live in the facade.
//
// ============================================================================

mod guard;
pub mod local_mutex;
pub mod named_lock;
pub mod optimistic;
pub mod pessimistic;
pub mod unguarded;

pub use local_mutex::LocalMutexStockService;
pub use named_lock::NamedLockStockService;
pub use optimistic::OptimisticStockService;
pub use pessimistic::PessimisticStockService;
pub use unguarded::UnguardedStockService;

pub(crate) use guard::TxGuard;
