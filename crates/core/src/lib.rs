//! Domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the stock error taxonomy, and the injectable
//! clock used for expiry comparisons.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ErrorKind, StockError, StockResult};
pub use id::{CategoryId, DepartmentId, DocumentId, LineItemId, LotId, ProductId};
