//! Transaction coordinator: the composition root.
//!
//! Each public method is one business operation wrapped in one unit of work.
//! The method begins a session, runs the domain logic against it, and either
//! commits or rolls the whole thing back; partial allocation or partial line
//! sync is never observable. No retries happen here; lock waits and timeouts
//! are the store's concern.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use stockroom_catalog::{classify, StockHealth};
use stockroom_core::{
    Clock, DepartmentId, DocumentId, LineItemId, LotId, ProductId, StockError, SystemClock,
};
use stockroom_documents::{DocumentKind, IncomingLine, LineFields, LineItem, TransactionDirection};
use stockroom_inventory::{plan_explicit, plan_fefo, Lot, LotDeduction, LotDraft, QuantityInput};

use crate::store::{StockSession, StockStore, StoreError};

/// One line of an outbound transaction being posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundLine {
    pub product_id: ProductId,
    /// Demand in main units.
    pub qty: f64,
    /// Explicit lot choice; `None` means FEFO.
    pub lot_id: Option<LotId>,
    pub note: Option<String>,
}

/// One line of an inbound transaction being posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundLine {
    pub product_id: ProductId,
    pub lot_no: String,
    pub expiry_date: NaiveDate,
    pub input: QuantityInput,
    pub note: Option<String>,
}

/// A posted outbound line together with the deductions that satisfied it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineAllocation {
    pub line: LineItem,
    pub deductions: Vec<LotDeduction>,
}

/// What a reconciliation actually changed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub created: Vec<LineItem>,
    pub updated: Vec<LineItem>,
    pub deleted: Vec<LineItemId>,
}

/// Composition root over a [`StockStore`].
pub struct TransactionCoordinator<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: StockStore> TransactionCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock (deterministic tests pin it to a fixed date).
    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Allocate `qty` main units outbound.
    ///
    /// With `lot_id` the deduction hits that lot alone; without it the FEFO
    /// walk runs over the locked candidate list. Returns the per-lot
    /// deductions for audit logging.
    #[instrument(skip(self), fields(%product_id, %department_id, qty, ?lot_id), err)]
    pub async fn allocate_outbound(
        &self,
        product_id: ProductId,
        department_id: DepartmentId,
        qty: f64,
        lot_id: Option<LotId>,
    ) -> Result<Vec<LotDeduction>, StoreError> {
        let today = self.clock.today();
        let mut session = self.store.begin().await?;
        let result =
            apply_outbound(&mut *session, product_id, department_id, qty, lot_id, today).await;
        finish(session, result).await
    }

    /// Receive an inbound batch: create one lot per line, converting pack
    /// input to main units. All lines land or none do.
    #[instrument(skip(self, lines), fields(%department_id, lines = lines.len()), err)]
    pub async fn receive_inbound(
        &self,
        department_id: DepartmentId,
        lines: Vec<InboundLine>,
    ) -> Result<Vec<Lot>, StoreError> {
        let today = self.clock.today();
        let mut session = self.store.begin().await?;
        let result = receive_lots(&mut *session, department_id, lines, today).await;
        finish(session, result).await
    }

    /// Manually correct a lot to an absolute quantity (main units, or pack
    /// units converted through the supplied rate).
    #[instrument(skip(self, input), fields(%lot_id), err)]
    pub async fn adjust_lot_quantity(
        &self,
        lot_id: LotId,
        input: QuantityInput,
    ) -> Result<Lot, StoreError> {
        let target = input.resolve()?;
        if target < 0.0 {
            return Err(StockError::NegativeQuantity { qty: target }.into());
        }
        let mut session = self.store.begin().await?;
        let result = set_lot_quantity(&mut *session, lot_id, target).await;
        finish(session, result).await
    }

    /// Delete a manually entered lot. Refused while transaction lines still
    /// reference it.
    #[instrument(skip(self), fields(%lot_id), err)]
    pub async fn delete_lot(&self, lot_id: LotId) -> Result<(), StoreError> {
        let mut session = self.store.begin().await?;
        let result = session.delete_lot(lot_id).await;
        finish(session, result).await
    }

    /// Synchronize a document's lines with the caller's desired set.
    #[instrument(skip(self, incoming), fields(%document_id, incoming = incoming.len()), err)]
    pub async fn reconcile_lines(
        &self,
        document_id: DocumentId,
        incoming: Vec<IncomingLine>,
    ) -> Result<ReconcileOutcome, StoreError> {
        let mut session = self.store.begin().await?;
        let result = apply_reconcile(&mut *session, document_id, &incoming).await;
        finish(session, result).await
    }

    /// Post a new outbound transaction: insert its lines and allocate stock
    /// for each, all in one unit of work.
    #[instrument(skip(self, lines), fields(%document_id, lines = lines.len()), err)]
    pub async fn create_outbound_transaction(
        &self,
        document_id: DocumentId,
        lines: Vec<OutboundLine>,
    ) -> Result<Vec<LineAllocation>, StoreError> {
        let today = self.clock.today();
        let mut session = self.store.begin().await?;
        let result = post_outbound(&mut *session, document_id, &lines, today).await;
        finish(session, result).await
    }

    /// Post a new inbound transaction: insert its lines and create their lots,
    /// all in one unit of work.
    #[instrument(skip(self, lines), fields(%document_id, lines = lines.len()), err)]
    pub async fn create_inbound_transaction(
        &self,
        document_id: DocumentId,
        lines: Vec<InboundLine>,
    ) -> Result<Vec<(LineItem, Lot)>, StoreError> {
        let today = self.clock.today();
        let mut session = self.store.begin().await?;
        let result = post_inbound(&mut *session, document_id, lines, today).await;
        finish(session, result).await
    }

    /// Recompute and persist a product's derived stock health.
    ///
    /// Reads without locks; meant to run best-effort after lot mutations, not
    /// inside the allocation critical section.
    #[instrument(skip(self), fields(%product_id), err)]
    pub async fn refresh_stock_health(
        &self,
        product_id: ProductId,
    ) -> Result<StockHealth, StoreError> {
        let today = self.clock.today();
        let mut session = self.store.begin().await?;
        let result = recompute_health(&mut *session, product_id, today).await;
        finish(session, result).await
    }
}

/// Commit the session on success, roll it back on any failure. A failed
/// rollback is logged but the original error wins.
async fn finish<T>(
    session: Box<dyn StockSession>,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    match result {
        Ok(value) => {
            session.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rb) = session.rollback().await {
                warn!(error = %rb, "rollback failed after operation error");
            }
            Err(e)
        }
    }
}

/// Plan and apply one outbound deduction set against an open session.
async fn apply_outbound(
    session: &mut dyn StockSession,
    product_id: ProductId,
    department_id: DepartmentId,
    qty: f64,
    lot_id: Option<LotId>,
    today: NaiveDate,
) -> Result<Vec<LotDeduction>, StoreError> {
    let plan = match lot_id {
        Some(lot_id) => {
            let lot = session
                .lock_lot(lot_id)
                .await?
                .ok_or(StoreError::Domain(StockError::NotFound))?;
            vec![plan_explicit(&lot, qty)?]
        }
        None => {
            let candidates = session
                .lock_candidate_lots(product_id, department_id, today)
                .await?;
            plan_fefo(&candidates, qty)?
        }
    };

    for deduction in &plan {
        session
            .adjust_qty(deduction.lot_id, -deduction.qty_deducted)
            .await?;
    }
    Ok(plan)
}

/// Create one lot per inbound line against an open session.
async fn receive_lots(
    session: &mut dyn StockSession,
    department_id: DepartmentId,
    lines: Vec<InboundLine>,
    today: NaiveDate,
) -> Result<Vec<Lot>, StoreError> {
    let mut lots = Vec::with_capacity(lines.len());
    for line in lines {
        let draft = draft_from_input(
            line.product_id,
            department_id,
            line.lot_no,
            line.expiry_date,
            line.input,
        )?;
        lots.push(session.create_lot(&draft, today).await?);
    }
    Ok(lots)
}

/// Lock a lot and move it to an absolute quantity via a delta adjustment.
async fn set_lot_quantity(
    session: &mut dyn StockSession,
    lot_id: LotId,
    target: f64,
) -> Result<Lot, StoreError> {
    let current = session
        .lock_lot(lot_id)
        .await?
        .ok_or(StoreError::Domain(StockError::NotFound))?;
    session
        .adjust_qty(lot_id, target - current.qty_on_hand)
        .await
}

/// Diff a document's lines against the desired set and apply the plan:
/// deletes, then updates, then creates.
async fn apply_reconcile(
    session: &mut dyn StockSession,
    document_id: DocumentId,
    incoming: &[IncomingLine],
) -> Result<ReconcileOutcome, StoreError> {
    let document = session
        .get_document(document_id)
        .await?
        .ok_or(StoreError::Domain(StockError::NotFound))?;
    if !document.kind.accepts_line_edits() {
        return Err(StockError::DocumentNotEditable { document_id }.into());
    }

    let existing = session.list_line_items(document_id).await?;
    let plan = stockroom_documents::plan(&existing, incoming)?;

    let mut outcome = ReconcileOutcome::default();
    for id in plan.to_delete {
        session.delete_line_item(id).await?;
        outcome.deleted.push(id);
    }
    for update in plan.to_update {
        if update.is_noop {
            continue;
        }
        let line = session.update_line_item(update.id, &update.fields).await?;
        outcome.updated.push(line);
    }
    for fields in plan.to_create {
        let line = session.insert_line_item(document_id, &fields).await?;
        outcome.created.push(line);
    }
    Ok(outcome)
}

async fn post_outbound(
    session: &mut dyn StockSession,
    document_id: DocumentId,
    lines: &[OutboundLine],
    today: NaiveDate,
) -> Result<Vec<LineAllocation>, StoreError> {
    let document = session
        .get_document(document_id)
        .await?
        .ok_or(StoreError::Domain(StockError::NotFound))?;
    let DocumentKind::Transaction {
        direction: TransactionDirection::Out,
    } = document.kind
    else {
        return Err(StockError::validation("document is not an outbound transaction").into());
    };

    // Run the lines through the reconciler so duplicate product references
    // merge before anything is written.
    let incoming: Vec<IncomingLine> = lines
        .iter()
        .map(|l| {
            IncomingLine::New(LineFields {
                product_id: l.product_id,
                qty: l.qty,
                lot_id: l.lot_id,
                expiry_date: None,
                note: l.note.clone(),
            })
        })
        .collect();
    let existing = session.list_line_items(document_id).await?;
    let plan = stockroom_documents::plan(&existing, &incoming)?;

    let mut allocations = Vec::with_capacity(plan.to_create.len());
    for fields in plan.to_create {
        let line = session.insert_line_item(document_id, &fields).await?;
        let deductions = apply_outbound(
            &mut *session,
            fields.product_id,
            document.department_id,
            fields.qty,
            fields.lot_id,
            today,
        )
        .await?;
        allocations.push(LineAllocation { line, deductions });
    }
    Ok(allocations)
}

async fn post_inbound(
    session: &mut dyn StockSession,
    document_id: DocumentId,
    lines: Vec<InboundLine>,
    today: NaiveDate,
) -> Result<Vec<(LineItem, Lot)>, StoreError> {
    let document = session
        .get_document(document_id)
        .await?
        .ok_or(StoreError::Domain(StockError::NotFound))?;
    let DocumentKind::Transaction {
        direction: TransactionDirection::In,
    } = document.kind
    else {
        return Err(StockError::validation("document is not an inbound transaction").into());
    };

    let mut posted = Vec::with_capacity(lines.len());
    for line in lines {
        let draft = draft_from_input(
            line.product_id,
            document.department_id,
            line.lot_no,
            line.expiry_date,
            line.input,
        )?;
        let lot = session.create_lot(&draft, today).await?;
        let item = session
            .insert_line_item(
                document_id,
                &LineFields {
                    product_id: line.product_id,
                    qty: lot.qty_on_hand,
                    lot_id: Some(lot.id),
                    expiry_date: Some(line.expiry_date),
                    note: line.note,
                },
            )
            .await?;
        posted.push((item, lot));
    }
    Ok(posted)
}

async fn recompute_health(
    session: &mut dyn StockSession,
    product_id: ProductId,
    today: NaiveDate,
) -> Result<StockHealth, StoreError> {
    let product = session
        .get_product(product_id)
        .await?
        .ok_or(StoreError::Domain(StockError::NotFound))?;
    let lots = session.list_lots(product_id, None).await?;
    let health = classify(&product, &lots, today);
    session.set_product_status(product_id, health.status).await?;
    Ok(health)
}

/// Build a lot draft from caller input, resolving pack quantities.
///
/// A main-unit quantity stores the lot with a conversion rate of 1; a pack
/// quantity stores the rate it arrived with.
fn draft_from_input(
    product_id: ProductId,
    department_id: DepartmentId,
    lot_no: String,
    expiry_date: NaiveDate,
    input: QuantityInput,
) -> Result<LotDraft, StoreError> {
    let qty_on_hand = input.resolve()?;
    let conversion_rate = match input {
        QuantityInput::Main(_) => 1.0,
        QuantityInput::Pack { rate, .. } => rate,
    };
    Ok(LotDraft {
        lot_no,
        product_id,
        department_id,
        qty_on_hand,
        expiry_date,
        conversion_rate,
    })
}
