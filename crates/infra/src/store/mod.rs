//! Stock store abstraction.
//!
//! A [`StockStore`] hands out [`StockSession`]s; one session is one unit of
//! work, and `commit`/`rollback` are its only terminal operations. Everything
//! the coordinator does against lots, products, documents, and line items goes
//! through a session, so atomicity is visible at the type level rather than
//! hidden in an ambient connection.
//!
//! Two implementations: an in-memory store for tests and benches, and a
//! Postgres store where a session wraps one database transaction and
//! candidate locking is `SELECT ... FOR UPDATE`.

mod memory;
mod postgres;

pub use memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use stockroom_catalog::{Product, ProductStatus};
use stockroom_core::{DepartmentId, DocumentId, LineItemId, LotId, ProductId, StockError};
use stockroom_documents::{DocumentHeader, LineFields, LineItem};
use stockroom_inventory::{Lot, LotDraft};

/// Storage-layer error.
///
/// Domain failures pass through unchanged so callers keep the full taxonomy;
/// everything else is a backend fault tagged with the failing operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] StockError),

    #[error("storage failure during {op}: {source}")]
    Backend {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// The session was already committed or rolled back.
    #[error("session already terminated")]
    SessionClosed,
}

impl StoreError {
    pub fn backend(op: &'static str, source: sqlx::Error) -> Self {
        Self::Backend { op, source }
    }

    /// The domain error inside, if this is one.
    pub fn as_domain(&self) -> Option<&StockError> {
        match self {
            Self::Domain(e) => Some(e),
            _ => None,
        }
    }
}

/// Factory for unit-of-work sessions.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StockSession>, StoreError>;
}

/// One atomic unit of work against the stock store.
///
/// Uncommitted mutations are invisible to other sessions; dropping a session
/// without committing discards them.
#[async_trait]
pub trait StockSession: Send {
    // --- lots -------------------------------------------------------------

    /// Locked, expiry-ordered candidate read for FEFO allocation.
    ///
    /// Returns lots for the product+department with `expiry_date > today` and
    /// `qty_on_hand > 0`, ordered `expiry_date ASC, lot_no ASC`, each held
    /// under an exclusive lock until the session terminates. The fixed lock
    /// order is what makes overlapping allocations deadlock-free.
    async fn lock_candidate_lots(
        &mut self,
        product_id: ProductId,
        department_id: DepartmentId,
        today: NaiveDate,
    ) -> Result<Vec<Lot>, StoreError>;

    /// Locked read of a single lot (explicit-lot outbound, manual adjustment).
    async fn lock_lot(&mut self, lot_id: LotId) -> Result<Option<Lot>, StoreError>;

    /// Unlocked read of every lot for a product, optionally scoped to one
    /// department. Classifier and audit reads.
    async fn list_lots(
        &mut self,
        product_id: ProductId,
        department_id: Option<DepartmentId>,
    ) -> Result<Vec<Lot>, StoreError>;

    /// Create a lot. Fails with `DuplicateLotNo` when the
    /// `(lot_no, product, department)` triple exists, including collisions
    /// with expired lots.
    async fn create_lot(&mut self, draft: &LotDraft, today: NaiveDate)
        -> Result<Lot, StoreError>;

    /// Apply `delta` to a lot's quantity. The sole enforcement point for
    /// non-negativity: fails with `NegativeResultingStock` when the result
    /// would drop below zero.
    async fn adjust_qty(&mut self, lot_id: LotId, delta: f64) -> Result<Lot, StoreError>;

    /// Delete a lot. Fails with `LotInUse` while transaction lines reference it.
    async fn delete_lot(&mut self, lot_id: LotId) -> Result<(), StoreError>;

    // --- products ---------------------------------------------------------

    async fn get_product(&mut self, product_id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Write back the derived status (owned by the stock health classifier).
    async fn set_product_status(
        &mut self,
        product_id: ProductId,
        status: ProductStatus,
    ) -> Result<(), StoreError>;

    // --- documents and line items ----------------------------------------

    async fn get_document(
        &mut self,
        document_id: DocumentId,
    ) -> Result<Option<DocumentHeader>, StoreError>;

    async fn list_line_items(
        &mut self,
        document_id: DocumentId,
    ) -> Result<Vec<LineItem>, StoreError>;

    async fn insert_line_item(
        &mut self,
        document_id: DocumentId,
        fields: &LineFields,
    ) -> Result<LineItem, StoreError>;

    async fn update_line_item(
        &mut self,
        line_id: LineItemId,
        fields: &LineFields,
    ) -> Result<LineItem, StoreError>;

    async fn delete_line_item(&mut self, line_id: LineItemId) -> Result<(), StoreError>;

    // --- terminal operations ----------------------------------------------

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
