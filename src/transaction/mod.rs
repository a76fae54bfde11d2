// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Transactions buffer their writes until commit and own the row locks they
// acquire, so both vanish together on commit or rollback. Named locks are
// deliberately not tracked here: they belong to the caller, not to any
// transaction.
//
// ============================================================================

pub mod manager;
pub mod state;

pub use manager::TransactionManager;
pub use state::{PendingWrite, Transaction, TransactionId, TransactionState};
