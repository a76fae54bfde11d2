pub mod error;
pub mod stock;
pub mod types;

pub use error::{Result, StockError};
pub use stock::Stock;
pub use types::{ProductId, StockId};
