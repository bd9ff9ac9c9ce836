//! Perishable inventory lots.
//!
//! Pure domain logic: the lot record, pack↔main unit conversion, and the
//! first-expired-first-out (FEFO) allocation planner. Nothing in this crate
//! performs I/O; the infra crate feeds it locked lot snapshots and applies the
//! plans it produces.

pub mod allocation;
pub mod conversion;
pub mod lot;

pub use allocation::{plan_explicit, plan_fefo, LotDeduction};
pub use conversion::{to_main, QuantityInput};
pub use lot::{Lot, LotDraft};
