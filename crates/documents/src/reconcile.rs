//! Line item reconciliation.
//!
//! Given a document's existing lines and a caller-supplied desired set, compute
//! the minimal create/update/delete plan. Lines are never moved between
//! documents; an id unknown to this document is an error, not a create.
//!
//! Application order (the coordinator's job): deletes, then updates, then
//! creates, inside the same unit of work as any parent-document field change.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use stockroom_core::{LineItemId, StockError, StockResult};

use crate::line_item::{IncomingLine, LineFields, LineItem};

/// An update of one existing line to the given fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineUpdate {
    pub id: LineItemId,
    pub fields: LineFields,
    /// True when the incoming fields equal the stored ones; appliers skip the
    /// write so resubmitting the current state is a no-op.
    pub is_noop: bool,
}

/// The computed create/update/delete sets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReconcilePlan {
    pub to_create: Vec<LineFields>,
    pub to_update: Vec<LineUpdate>,
    pub to_delete: Vec<LineItemId>,
}

impl ReconcilePlan {
    /// True when applying the plan would change nothing.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty()
            && self.to_delete.is_empty()
            && self.to_update.iter().all(|u| u.is_noop)
    }
}

/// Compute the reconciliation plan for one document.
///
/// Fails before any store write when an incoming line has a non-positive
/// quantity, when an `Existing` id does not belong to the document, or when
/// the same existing line appears twice in the desired set.
pub fn plan(existing: &[LineItem], incoming: &[IncomingLine]) -> StockResult<ReconcilePlan> {
    for line in incoming {
        line.fields().validate()?;
    }

    let existing_by_id: HashMap<LineItemId, &LineItem> =
        existing.iter().map(|l| (l.id, l)).collect();

    // Duplicate product references within one creation batch collapse via
    // last-write-wins, keyed by product. BTreeMap keeps emission order stable.
    let mut creates: BTreeMap<_, LineFields> = BTreeMap::new();
    let mut updates = Vec::new();
    let mut kept_ids: HashSet<LineItemId> = HashSet::new();

    for line in incoming {
        match line {
            IncomingLine::New(fields) => {
                creates.insert(fields.product_id, fields.clone());
            }
            IncomingLine::Existing { id, fields } => {
                let Some(current) = existing_by_id.get(id) else {
                    return Err(StockError::NotFound);
                };
                if !kept_ids.insert(*id) {
                    return Err(StockError::validation(format!(
                        "line {id} appears more than once in the desired set"
                    )));
                }
                updates.push(LineUpdate {
                    id: *id,
                    fields: fields.clone(),
                    is_noop: &current.fields == fields,
                });
            }
        }
    }

    let to_delete = existing
        .iter()
        .filter(|l| !kept_ids.contains(&l.id))
        .map(|l| l.id)
        .collect();

    Ok(ReconcilePlan {
        to_create: creates.into_values().collect(),
        to_update: updates,
        to_delete,
    })
}
