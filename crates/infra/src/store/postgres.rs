//! Postgres-backed stock store.
//!
//! One [`StockSession`] wraps one database transaction; candidate locking is
//! `SELECT ... FOR UPDATE`, so a concurrent allocation against the same lots
//! blocks until this session commits or rolls back. Statement and transaction
//! timeouts are the database's concern; a timed-out session surfaces as a
//! backend error and the transaction is gone either way.
//!
//! ## Error mapping
//!
//! | Postgres error | Constraint | Mapped to |
//! |----------------|------------|-----------|
//! | `23505` unique violation | `stock_lots_lot_no_product_id_department_id_key` | `DuplicateLotNo` |
//! | `23503` foreign key violation | `line_items_lot_id_fkey` | `LotInUse` |
//! | anything else | (any) | `StoreError::Backend` tagged with the operation |

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use stockroom_catalog::{Product, ProductStatus};
use stockroom_core::{
    CategoryId, DepartmentId, DocumentId, LineItemId, LotId, ProductId, StockError,
};
use stockroom_documents::{
    DocumentHeader, DocumentKind, LineFields, LineItem, OrderStatus, TransactionDirection,
};
use stockroom_inventory::{Lot, LotDraft};

use super::{StockSession, StockStore, StoreError};

const LOT_NO_UNIQUE: &str = "stock_lots_lot_no_product_id_department_id_key";
const LINE_LOT_FK: &str = "line_items_lot_id_fkey";

/// Postgres-backed stock store. Cheap to clone; shares the pool.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    async fn begin(&self) -> Result<Box<dyn StockSession>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::backend("begin", e))?;
        Ok(Box::new(PostgresSession { tx: Some(tx) }))
    }
}

struct PostgresSession {
    /// `None` once the session has been committed or rolled back.
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresSession {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::SessionClosed)
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, FromRow)]
struct LotRow {
    id: Uuid,
    lot_no: String,
    product_id: Uuid,
    department_id: Uuid,
    qty_on_hand: f64,
    expiry_date: NaiveDate,
    conversion_rate: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LotRow> for Lot {
    fn from(row: LotRow) -> Self {
        Self {
            id: LotId::from_uuid(row.id),
            lot_no: row.lot_no,
            product_id: ProductId::from_uuid(row.product_id),
            department_id: DepartmentId::from_uuid(row.department_id),
            qty_on_hand: row.qty_on_hand,
            expiry_date: row.expiry_date,
            conversion_rate: row.conversion_rate,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const LOT_COLUMNS: &str = "id, lot_no, product_id, department_id, qty_on_hand, expiry_date, \
                           conversion_rate, created_at, updated_at";

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    category_id: Uuid,
    pack_unit: String,
    main_unit: String,
    low_stock_threshold: f64,
    near_expiry_days: i32,
    admin_locked: bool,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = sqlx::Error;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ProductId::from_uuid(row.id),
            sku: row.sku,
            name: row.name,
            category_id: CategoryId::from_uuid(row.category_id),
            pack_unit: row.pack_unit,
            main_unit: row.main_unit,
            low_stock_threshold: row.low_stock_threshold,
            near_expiry_days: row.near_expiry_days.max(0) as u32,
            admin_locked: row.admin_locked,
            status: status_from_str(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    department_id: Uuid,
    kind: String,
    direction: Option<String>,
    status: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for DocumentHeader {
    type Error = sqlx::Error;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let kind = match (row.kind.as_str(), row.direction.as_deref(), row.status.as_deref()) {
            ("transaction", Some("in"), _) => DocumentKind::Transaction {
                direction: TransactionDirection::In,
            },
            ("transaction", Some("out"), _) => DocumentKind::Transaction {
                direction: TransactionDirection::Out,
            },
            ("order", _, Some(status)) => DocumentKind::Order {
                status: order_status_from_str(status)?,
            },
            (kind, direction, status) => {
                return Err(decode_error(format!(
                    "document {} has unrecognized shape (kind={kind:?}, direction={direction:?}, status={status:?})",
                    row.id
                )));
            }
        };
        Ok(Self {
            id: DocumentId::from_uuid(row.id),
            department_id: DepartmentId::from_uuid(row.department_id),
            kind,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LineItemRow {
    id: Uuid,
    document_id: Uuid,
    product_id: Uuid,
    qty: f64,
    lot_id: Option<Uuid>,
    expiry_date: Option<NaiveDate>,
    note: Option<String>,
}

impl From<LineItemRow> for LineItem {
    fn from(row: LineItemRow) -> Self {
        Self {
            id: LineItemId::from_uuid(row.id),
            document_id: DocumentId::from_uuid(row.document_id),
            fields: LineFields {
                product_id: ProductId::from_uuid(row.product_id),
                qty: row.qty,
                lot_id: row.lot_id.map(LotId::from_uuid),
                expiry_date: row.expiry_date,
                note: row.note,
            },
        }
    }
}

fn decode_error(detail: String) -> sqlx::Error {
    sqlx::Error::Decode(detail.into())
}

fn status_to_str(status: ProductStatus) -> &'static str {
    match status {
        ProductStatus::Active => "active",
        ProductStatus::Warning => "warning",
        ProductStatus::Disable => "disable",
    }
}

fn status_from_str(s: &str) -> Result<ProductStatus, sqlx::Error> {
    match s {
        "active" => Ok(ProductStatus::Active),
        "warning" => Ok(ProductStatus::Warning),
        "disable" => Ok(ProductStatus::Disable),
        other => Err(decode_error(format!("unknown product status '{other}'"))),
    }
}

fn order_status_from_str(s: &str) -> Result<OrderStatus, sqlx::Error> {
    match s {
        "draft" => Ok(OrderStatus::Draft),
        "confirmed" => Ok(OrderStatus::Confirmed),
        "completed" => Ok(OrderStatus::Completed),
        "cancelled" => Ok(OrderStatus::Cancelled),
        other => Err(decode_error(format!("unknown order status '{other}'"))),
    }
}

/// True when the error is the given named-constraint violation.
fn violates(e: &sqlx::Error, constraint: &str) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.constraint() == Some(constraint))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[async_trait]
impl StockSession for PostgresSession {
    #[instrument(skip(self), fields(%product_id, %department_id), err)]
    async fn lock_candidate_lots(
        &mut self,
        product_id: ProductId,
        department_id: DepartmentId,
        today: NaiveDate,
    ) -> Result<Vec<Lot>, StoreError> {
        let sql = format!(
            r#"
            SELECT {LOT_COLUMNS}
            FROM stock_lots
            WHERE product_id = $1 AND department_id = $2
              AND expiry_date > $3 AND qty_on_hand > 0
            ORDER BY expiry_date ASC, lot_no ASC
            FOR UPDATE
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(product_id.as_uuid())
            .bind(department_id.as_uuid())
            .bind(today)
            .fetch_all(self.tx()?.as_mut())
            .await
            .map_err(|e| StoreError::backend("lock_candidate_lots", e))?;

        rows.into_iter()
            .map(|row| {
                LotRow::from_row(&row)
                    .map(Lot::from)
                    .map_err(|e| StoreError::backend("lock_candidate_lots", e))
            })
            .collect()
    }

    #[instrument(skip(self), fields(%lot_id), err)]
    async fn lock_lot(&mut self, lot_id: LotId) -> Result<Option<Lot>, StoreError> {
        let sql = format!("SELECT {LOT_COLUMNS} FROM stock_lots WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(lot_id.as_uuid())
            .fetch_optional(self.tx()?.as_mut())
            .await
            .map_err(|e| StoreError::backend("lock_lot", e))?;

        row.map(|row| {
            LotRow::from_row(&row)
                .map(Lot::from)
                .map_err(|e| StoreError::backend("lock_lot", e))
        })
        .transpose()
    }

    async fn list_lots(
        &mut self,
        product_id: ProductId,
        department_id: Option<DepartmentId>,
    ) -> Result<Vec<Lot>, StoreError> {
        let sql = format!(
            r#"
            SELECT {LOT_COLUMNS}
            FROM stock_lots
            WHERE product_id = $1
              AND ($2::uuid IS NULL OR department_id = $2)
            ORDER BY expiry_date ASC, lot_no ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(product_id.as_uuid())
            .bind(department_id.map(|d| *d.as_uuid()))
            .fetch_all(self.tx()?.as_mut())
            .await
            .map_err(|e| StoreError::backend("list_lots", e))?;

        rows.into_iter()
            .map(|row| {
                LotRow::from_row(&row)
                    .map(Lot::from)
                    .map_err(|e| StoreError::backend("list_lots", e))
            })
            .collect()
    }

    #[instrument(skip(self, draft), fields(lot_no = %draft.lot_no, product_id = %draft.product_id), err)]
    async fn create_lot(
        &mut self,
        draft: &LotDraft,
        today: NaiveDate,
    ) -> Result<Lot, StoreError> {
        draft.validate(today)?;

        let sql = format!(
            r#"
            INSERT INTO stock_lots (
                id, lot_no, product_id, department_id,
                qty_on_hand, expiry_date, conversion_rate
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {LOT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(LotId::new().as_uuid())
            .bind(&draft.lot_no)
            .bind(draft.product_id.as_uuid())
            .bind(draft.department_id.as_uuid())
            .bind(draft.qty_on_hand)
            .bind(draft.expiry_date)
            .bind(draft.conversion_rate)
            .fetch_one(self.tx()?.as_mut())
            .await
            .map_err(|e| {
                if violates(&e, LOT_NO_UNIQUE) {
                    return StockError::duplicate_lot(draft.lot_no.clone()).into();
                }
                StoreError::backend("create_lot", e)
            })?;

        LotRow::from_row(&row)
            .map(Lot::from)
            .map_err(|e| StoreError::backend("create_lot", e))
    }

    #[instrument(skip(self), fields(%lot_id, delta), err)]
    async fn adjust_qty(&mut self, lot_id: LotId, delta: f64) -> Result<Lot, StoreError> {
        if !delta.is_finite() {
            return Err(StockError::NegativeQuantity { qty: delta }.into());
        }

        // Lock the row first so the resulting quantity we validate is the one
        // we overwrite.
        let current = self
            .lock_lot(lot_id)
            .await?
            .ok_or(StoreError::Domain(StockError::NotFound))?;

        let resulting = current.qty_on_hand + delta;
        if resulting < 0.0 {
            return Err(StockError::NegativeResultingStock { lot_id, resulting }.into());
        }

        let sql = format!(
            r#"
            UPDATE stock_lots
            SET qty_on_hand = $2, updated_at = now()
            WHERE id = $1
            RETURNING {LOT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(lot_id.as_uuid())
            .bind(resulting)
            .fetch_one(self.tx()?.as_mut())
            .await
            .map_err(|e| StoreError::backend("adjust_qty", e))?;

        LotRow::from_row(&row)
            .map(Lot::from)
            .map_err(|e| StoreError::backend("adjust_qty", e))
    }

    #[instrument(skip(self), fields(%lot_id), err)]
    async fn delete_lot(&mut self, lot_id: LotId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM stock_lots WHERE id = $1")
            .bind(lot_id.as_uuid())
            .execute(self.tx()?.as_mut())
            .await
            .map_err(|e| {
                if violates(&e, LINE_LOT_FK) {
                    return StockError::LotInUse { lot_id }.into();
                }
                StoreError::backend("delete_lot", e)
            })?;

        if result.rows_affected() == 0 {
            return Err(StockError::NotFound.into());
        }
        Ok(())
    }

    async fn get_product(
        &mut self,
        product_id: ProductId,
    ) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, sku, name, category_id, pack_unit, main_unit,
                   low_stock_threshold, near_expiry_days, admin_locked, status,
                   created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_optional(self.tx()?.as_mut())
        .await
        .map_err(|e| StoreError::backend("get_product", e))?;

        row.map(|row| {
            ProductRow::from_row(&row)
                .and_then(Product::try_from)
                .map_err(|e| StoreError::backend("get_product", e))
        })
        .transpose()
    }

    #[instrument(skip(self), fields(%product_id, ?status), err)]
    async fn set_product_status(
        &mut self,
        product_id: ProductId,
        status: ProductStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE products SET status = $2, updated_at = now() WHERE id = $1",
        )
        .bind(product_id.as_uuid())
        .bind(status_to_str(status))
        .execute(self.tx()?.as_mut())
        .await
        .map_err(|e| StoreError::backend("set_product_status", e))?;

        if result.rows_affected() == 0 {
            return Err(StockError::NotFound.into());
        }
        Ok(())
    }

    async fn get_document(
        &mut self,
        document_id: DocumentId,
    ) -> Result<Option<DocumentHeader>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, department_id, kind, direction, status, created_at
            FROM documents
            WHERE id = $1
            "#,
        )
        .bind(document_id.as_uuid())
        .fetch_optional(self.tx()?.as_mut())
        .await
        .map_err(|e| StoreError::backend("get_document", e))?;

        row.map(|row| {
            DocumentRow::from_row(&row)
                .and_then(DocumentHeader::try_from)
                .map_err(|e| StoreError::backend("get_document", e))
        })
        .transpose()
    }

    async fn list_line_items(
        &mut self,
        document_id: DocumentId,
    ) -> Result<Vec<LineItem>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, product_id, qty, lot_id, expiry_date, note
            FROM line_items
            WHERE document_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(document_id.as_uuid())
        .fetch_all(self.tx()?.as_mut())
        .await
        .map_err(|e| StoreError::backend("list_line_items", e))?;

        rows.into_iter()
            .map(|row| {
                LineItemRow::from_row(&row)
                    .map(LineItem::from)
                    .map_err(|e| StoreError::backend("list_line_items", e))
            })
            .collect()
    }

    #[instrument(skip(self, fields), fields(%document_id, product_id = %fields.product_id), err)]
    async fn insert_line_item(
        &mut self,
        document_id: DocumentId,
        fields: &LineFields,
    ) -> Result<LineItem, StoreError> {
        fields.validate()?;

        let row = sqlx::query(
            r#"
            INSERT INTO line_items (id, document_id, product_id, qty, lot_id, expiry_date, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, document_id, product_id, qty, lot_id, expiry_date, note
            "#,
        )
        .bind(LineItemId::new().as_uuid())
        .bind(document_id.as_uuid())
        .bind(fields.product_id.as_uuid())
        .bind(fields.qty)
        .bind(fields.lot_id.map(|l| *l.as_uuid()))
        .bind(fields.expiry_date)
        .bind(&fields.note)
        .fetch_one(self.tx()?.as_mut())
        .await
        .map_err(|e| StoreError::backend("insert_line_item", e))?;

        LineItemRow::from_row(&row)
            .map(LineItem::from)
            .map_err(|e| StoreError::backend("insert_line_item", e))
    }

    #[instrument(skip(self, fields), fields(%line_id), err)]
    async fn update_line_item(
        &mut self,
        line_id: LineItemId,
        fields: &LineFields,
    ) -> Result<LineItem, StoreError> {
        fields.validate()?;

        let row = sqlx::query(
            r#"
            UPDATE line_items
            SET product_id = $2, qty = $3, lot_id = $4, expiry_date = $5, note = $6
            WHERE id = $1
            RETURNING id, document_id, product_id, qty, lot_id, expiry_date, note
            "#,
        )
        .bind(line_id.as_uuid())
        .bind(fields.product_id.as_uuid())
        .bind(fields.qty)
        .bind(fields.lot_id.map(|l| *l.as_uuid()))
        .bind(fields.expiry_date)
        .bind(&fields.note)
        .fetch_optional(self.tx()?.as_mut())
        .await
        .map_err(|e| StoreError::backend("update_line_item", e))?
        .ok_or(StoreError::Domain(StockError::NotFound))?;

        LineItemRow::from_row(&row)
            .map(LineItem::from)
            .map_err(|e| StoreError::backend("update_line_item", e))
    }

    #[instrument(skip(self), fields(%line_id), err)]
    async fn delete_line_item(&mut self, line_id: LineItemId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM line_items WHERE id = $1")
            .bind(line_id.as_uuid())
            .execute(self.tx()?.as_mut())
            .await
            .map_err(|e| StoreError::backend("delete_line_item", e))?;

        if result.rows_affected() == 0 {
            return Err(StockError::NotFound.into());
        }
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::SessionClosed)?;
        tx.commit()
            .await
            .map_err(|e| StoreError::backend("commit", e))
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::SessionClosed)?;
        tx.rollback()
            .await
            .map_err(|e| StoreError::backend("rollback", e))
    }
}
