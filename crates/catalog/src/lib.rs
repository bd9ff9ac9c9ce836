//! Product catalog model and stock health.
//!
//! Products themselves are created and edited by catalog management outside
//! this core; what lives here is the validated product shape and the derived
//! stock-health classification the rest of the system reads.

pub mod health;
pub mod product;

pub use health::{classify, StockHealth};
pub use product::{normalize_sku, Product, ProductStatus};
