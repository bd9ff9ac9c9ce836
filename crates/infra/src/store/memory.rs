//! In-memory stock store.
//!
//! Intended for tests and benches. A session takes the store-wide mutex for
//! its whole lifetime, which serializes units of work the way the relational
//! store's row locks do, and keeps a snapshot of the state at `begin` so
//! rollback is a restore. Not optimized for performance.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockroom_catalog::{Product, ProductStatus};
use stockroom_core::{DepartmentId, DocumentId, LineItemId, LotId, ProductId, StockError};
use stockroom_documents::{DocumentHeader, LineFields, LineItem};
use stockroom_inventory::{Lot, LotDraft};

use super::{StockSession, StockStore, StoreError};

#[derive(Debug, Default, Clone)]
struct State {
    products: HashMap<ProductId, Product>,
    lots: HashMap<LotId, Lot>,
    documents: HashMap<DocumentId, DocumentHeader>,
    lines: HashMap<LineItemId, LineItem>,
}

/// In-memory store; cloneable handle over shared state.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStockStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a product directly, bypassing sessions. Test setup only.
    pub async fn seed_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id, product);
    }

    /// Seed a document header directly, bypassing sessions. Test setup only.
    pub async fn seed_document(&self, document: DocumentHeader) {
        self.state
            .lock()
            .await
            .documents
            .insert(document.id, document);
    }

    /// Seed a lot directly, bypassing sessions and draft validation.
    /// Test setup only (e.g. planting already-expired lots).
    pub async fn seed_lot(&self, lot: Lot) {
        self.state.lock().await.lots.insert(lot.id, lot);
    }

    /// Snapshot of every lot, for pre/post assertions in tests.
    pub async fn dump_lots(&self) -> Vec<Lot> {
        let mut lots: Vec<Lot> = self.state.lock().await.lots.values().cloned().collect();
        lots.sort_by(|a, b| a.lot_no.cmp(&b.lot_no));
        lots
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn begin(&self) -> Result<Box<dyn StockSession>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(InMemorySession {
            guard,
            snapshot,
            committed: false,
        }))
    }
}

struct InMemorySession {
    guard: OwnedMutexGuard<State>,
    snapshot: State,
    committed: bool,
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        // A session dropped without commit behaves like rollback.
        if !self.committed {
            *self.guard = std::mem::take(&mut self.snapshot);
        }
    }
}

#[async_trait]
impl StockSession for InMemorySession {
    async fn lock_candidate_lots(
        &mut self,
        product_id: ProductId,
        department_id: DepartmentId,
        today: NaiveDate,
    ) -> Result<Vec<Lot>, StoreError> {
        // The session-wide mutex already excludes every other writer, so the
        // per-row lock is implicit here.
        let mut lots: Vec<Lot> = self
            .guard
            .lots
            .values()
            .filter(|l| {
                l.product_id == product_id
                    && l.department_id == department_id
                    && l.expiry_date > today
                    && l.qty_on_hand > 0.0
            })
            .cloned()
            .collect();
        lots.sort_by(|a, b| {
            a.expiry_date
                .cmp(&b.expiry_date)
                .then_with(|| a.lot_no.cmp(&b.lot_no))
        });
        Ok(lots)
    }

    async fn lock_lot(&mut self, lot_id: LotId) -> Result<Option<Lot>, StoreError> {
        Ok(self.guard.lots.get(&lot_id).cloned())
    }

    async fn list_lots(
        &mut self,
        product_id: ProductId,
        department_id: Option<DepartmentId>,
    ) -> Result<Vec<Lot>, StoreError> {
        let mut lots: Vec<Lot> = self
            .guard
            .lots
            .values()
            .filter(|l| {
                l.product_id == product_id
                    && department_id.is_none_or(|d| l.department_id == d)
            })
            .cloned()
            .collect();
        lots.sort_by(|a, b| {
            a.expiry_date
                .cmp(&b.expiry_date)
                .then_with(|| a.lot_no.cmp(&b.lot_no))
        });
        Ok(lots)
    }

    async fn create_lot(
        &mut self,
        draft: &LotDraft,
        today: NaiveDate,
    ) -> Result<Lot, StoreError> {
        draft.validate(today)?;

        // Lot numbers collide with *any* lot for the product+department,
        // expired stock included.
        let duplicate = self.guard.lots.values().any(|l| {
            l.product_id == draft.product_id
                && l.department_id == draft.department_id
                && l.lot_no == draft.lot_no
        });
        if duplicate {
            return Err(StockError::duplicate_lot(draft.lot_no.clone()).into());
        }

        let now = Utc::now();
        let lot = Lot {
            id: LotId::new(),
            lot_no: draft.lot_no.clone(),
            product_id: draft.product_id,
            department_id: draft.department_id,
            qty_on_hand: draft.qty_on_hand,
            expiry_date: draft.expiry_date,
            conversion_rate: draft.conversion_rate,
            created_at: now,
            updated_at: now,
        };
        self.guard.lots.insert(lot.id, lot.clone());
        Ok(lot)
    }

    async fn adjust_qty(&mut self, lot_id: LotId, delta: f64) -> Result<Lot, StoreError> {
        if !delta.is_finite() {
            return Err(StockError::NegativeQuantity { qty: delta }.into());
        }
        let lot = self
            .guard
            .lots
            .get_mut(&lot_id)
            .ok_or(StoreError::Domain(StockError::NotFound))?;

        let resulting = lot.qty_on_hand + delta;
        if resulting < 0.0 {
            return Err(StockError::NegativeResultingStock { lot_id, resulting }.into());
        }
        lot.qty_on_hand = resulting;
        lot.updated_at = Utc::now();
        Ok(lot.clone())
    }

    async fn delete_lot(&mut self, lot_id: LotId) -> Result<(), StoreError> {
        if !self.guard.lots.contains_key(&lot_id) {
            return Err(StockError::NotFound.into());
        }
        let referenced = self
            .guard
            .lines
            .values()
            .any(|line| line.fields.lot_id == Some(lot_id));
        if referenced {
            return Err(StockError::LotInUse { lot_id }.into());
        }
        self.guard.lots.remove(&lot_id);
        Ok(())
    }

    async fn get_product(
        &mut self,
        product_id: ProductId,
    ) -> Result<Option<Product>, StoreError> {
        Ok(self.guard.products.get(&product_id).cloned())
    }

    async fn set_product_status(
        &mut self,
        product_id: ProductId,
        status: ProductStatus,
    ) -> Result<(), StoreError> {
        let product = self
            .guard
            .products
            .get_mut(&product_id)
            .ok_or(StoreError::Domain(StockError::NotFound))?;
        product.status = status;
        product.updated_at = Utc::now();
        Ok(())
    }

    async fn get_document(
        &mut self,
        document_id: DocumentId,
    ) -> Result<Option<DocumentHeader>, StoreError> {
        Ok(self.guard.documents.get(&document_id).cloned())
    }

    async fn list_line_items(
        &mut self,
        document_id: DocumentId,
    ) -> Result<Vec<LineItem>, StoreError> {
        let mut lines: Vec<LineItem> = self
            .guard
            .lines
            .values()
            .filter(|l| l.document_id == document_id)
            .cloned()
            .collect();
        lines.sort_by_key(|l| l.id);
        Ok(lines)
    }

    async fn insert_line_item(
        &mut self,
        document_id: DocumentId,
        fields: &LineFields,
    ) -> Result<LineItem, StoreError> {
        fields.validate()?;
        if !self.guard.documents.contains_key(&document_id) {
            return Err(StockError::NotFound.into());
        }
        let line = LineItem {
            id: LineItemId::new(),
            document_id,
            fields: fields.clone(),
        };
        self.guard.lines.insert(line.id, line.clone());
        Ok(line)
    }

    async fn update_line_item(
        &mut self,
        line_id: LineItemId,
        fields: &LineFields,
    ) -> Result<LineItem, StoreError> {
        fields.validate()?;
        let line = self
            .guard
            .lines
            .get_mut(&line_id)
            .ok_or(StoreError::Domain(StockError::NotFound))?;
        line.fields = fields.clone();
        Ok(line.clone())
    }

    async fn delete_line_item(&mut self, line_id: LineItemId) -> Result<(), StoreError> {
        self.guard
            .lines
            .remove(&line_id)
            .map(|_| ())
            .ok_or(StoreError::Domain(StockError::NotFound))
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.committed = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        *self.guard = std::mem::take(&mut self.snapshot);
        self.committed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::StockError;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn draft(lot_no: &str, qty: f64) -> LotDraft {
        LotDraft {
            lot_no: lot_no.to_string(),
            product_id: ProductId::new(),
            department_id: DepartmentId::new(),
            qty_on_hand: qty,
            expiry_date: day(2025, 6, 1),
            conversion_rate: 1.0,
        }
    }

    #[tokio::test]
    async fn uncommitted_sessions_leave_no_trace() {
        let store = InMemoryStockStore::new();
        let today = day(2025, 1, 1);

        let mut session = store.begin().await.unwrap();
        session.create_lot(&draft("L1", 5.0), today).await.unwrap();
        drop(session);

        assert!(store.dump_lots().await.is_empty());
    }

    #[tokio::test]
    async fn rollback_restores_the_begin_snapshot() {
        let store = InMemoryStockStore::new();
        let today = day(2025, 1, 1);

        let mut session = store.begin().await.unwrap();
        let lot = session.create_lot(&draft("L1", 5.0), today).await.unwrap();
        session.commit().await.unwrap();

        let mut session = store.begin().await.unwrap();
        session.adjust_qty(lot.id, -3.0).await.unwrap();
        session.rollback().await.unwrap();

        assert_eq!(store.dump_lots().await[0].qty_on_hand, 5.0);
    }

    #[tokio::test]
    async fn duplicate_lot_no_is_rejected_within_scope() {
        let store = InMemoryStockStore::new();
        let today = day(2025, 1, 1);
        let d = draft("L1", 5.0);

        let mut session = store.begin().await.unwrap();
        session.create_lot(&d, today).await.unwrap();
        let err = session.create_lot(&d, today).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(StockError::DuplicateLotNo { .. })
        ));

        // Same lot number under a different product is fine.
        let mut other = d.clone();
        other.product_id = ProductId::new();
        session.create_lot(&other, today).await.unwrap();
    }

    #[tokio::test]
    async fn adjust_below_zero_is_a_consistency_error() {
        let store = InMemoryStockStore::new();
        let today = day(2025, 1, 1);

        let mut session = store.begin().await.unwrap();
        let lot = session.create_lot(&draft("L1", 5.0), today).await.unwrap();
        let err = session.adjust_qty(lot.id, -6.0).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(StockError::NegativeResultingStock { .. })
        ));
    }

    #[tokio::test]
    async fn candidate_read_filters_and_orders() {
        let store = InMemoryStockStore::new();
        let today = day(2025, 1, 1);
        let product_id = ProductId::new();
        let department_id = DepartmentId::new();

        let mut session = store.begin().await.unwrap();
        for (lot_no, expiry, qty) in [
            ("B", day(2025, 2, 1), 5.0),
            ("A", day(2025, 2, 1), 5.0),
            ("C", day(2025, 1, 10), 5.0),
            ("EMPTY", day(2025, 3, 1), 0.0),
        ] {
            session
                .create_lot(
                    &LotDraft {
                        lot_no: lot_no.to_string(),
                        product_id,
                        department_id,
                        qty_on_hand: qty,
                        expiry_date: expiry,
                        conversion_rate: 1.0,
                    },
                    today,
                )
                .await
                .unwrap();
        }
        session.commit().await.unwrap();

        // Expired lot seeded directly; create_lot would refuse it.
        store
            .seed_lot(Lot {
                id: LotId::new(),
                lot_no: "EXPIRED".to_string(),
                product_id,
                department_id,
                qty_on_hand: 9.0,
                expiry_date: day(2024, 12, 1),
                conversion_rate: 1.0,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await;

        let mut session = store.begin().await.unwrap();
        let candidates = session
            .lock_candidate_lots(product_id, department_id, today)
            .await
            .unwrap();
        let names: Vec<&str> = candidates.iter().map(|l| l.lot_no.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn delete_lot_refuses_while_referenced() {
        let store = InMemoryStockStore::new();
        let today = day(2025, 1, 1);
        let document = DocumentHeader {
            id: DocumentId::new(),
            department_id: DepartmentId::new(),
            kind: stockroom_documents::DocumentKind::Transaction {
                direction: stockroom_documents::TransactionDirection::Out,
            },
            created_at: Utc::now(),
        };
        store.seed_document(document.clone()).await;

        let mut session = store.begin().await.unwrap();
        let lot = session.create_lot(&draft("L1", 5.0), today).await.unwrap();
        let line = session
            .insert_line_item(
                document.id,
                &LineFields {
                    product_id: lot.product_id,
                    qty: 2.0,
                    lot_id: Some(lot.id),
                    expiry_date: None,
                    note: None,
                },
            )
            .await
            .unwrap();

        let err = session.delete_lot(lot.id).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(StockError::LotInUse { .. })));

        session.delete_line_item(line.id).await.unwrap();
        session.delete_lot(lot.id).await.unwrap();
        session.commit().await.unwrap();
        assert!(store.dump_lots().await.is_empty());
    }
}
