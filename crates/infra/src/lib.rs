//! Infrastructure layer: stock stores, unit-of-work sessions, and the
//! transaction coordinator that composes the domain crates into atomic
//! business operations.

pub mod coordinator;
pub mod store;


pub use coordinator::{InboundLine, LineAllocation, OutboundLine, ReconcileOutcome, TransactionCoordinator};
pub use store::{InMemoryStockStore, PostgresStockStore, StockSession, StockStore, StoreError};
