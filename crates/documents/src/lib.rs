//! Composite documents and their line items.
//!
//! A document (supplier transaction or sales order) owns an ordered set of
//! line items. Edits arrive as a complete desired line set; the reconciler
//! computes the minimal create/update/delete mutation to reach it. Pure diff
//! logic; applying the plan is the infra layer's job.

pub mod document;
pub mod line_item;
pub mod reconcile;

pub use document::{DocumentHeader, DocumentKind, OrderStatus, TransactionDirection};
pub use line_item::{IncomingLine, LineFields, LineItem};
pub use reconcile::{plan, LineUpdate, ReconcilePlan};
