use super::error::{Result, StockError};
use super::types::{ProductId, StockId};

/// Transaction-scoped copy of a persisted stock counter.
///
/// The store stays the source of truth: a `Stock` is fetched, mutated through
/// [`Stock::decrease`] and handed back to the store inside the same
/// transaction, then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stock {
    id: StockId,
    product_id: ProductId,
    quantity: u64,
    /// Present only when the row was read for an optimistic check.
    version: Option<u64>,
}

impl Stock {
    pub fn new(id: StockId, product_id: ProductId, quantity: u64, version: Option<u64>) -> Self {
        Self {
            id,
            product_id,
            quantity,
            version,
        }
    }

    pub fn id(&self) -> StockId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Subtracts `amount` from the quantity in place.
    ///
    /// # Errors
    /// Returns `InvalidOperation` when `amount` is zero or larger than the
    /// current quantity. The quantity is untouched in both cases.
    pub fn decrease(&mut self, amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(StockError::InvalidOperation(
                "decrease amount must be positive".into(),
            ));
        }

        let remaining = self.quantity.checked_sub(amount).ok_or_else(|| {
            StockError::InvalidOperation(format!(
                "stock {} cannot go below zero: quantity {}, requested {}",
                self.id, self.quantity, amount
            ))
        })?;

        self.quantity = remaining;
        Ok(())
    }
}
