//! FEFO outbound allocation planning.
//!
//! The planner is pure: it receives the candidate lots the store has already
//! locked (expiry-ascending, lot_no tie-break) and computes per-lot deductions
//! without touching them. The coordinator applies a plan only when planning
//! succeeded, so a failed allocation never deducts anything.
//!
//! The greedy earliest-expiry walk is optimal for FEFO: any assignment that
//! satisfies demand can be exchanged into the greedy one without increasing
//! waste, and the lot_no tie-break makes the result deterministic.

use serde::{Deserialize, Serialize};

use stockroom_core::{LotId, StockError, StockResult};

use crate::lot::Lot;

/// One per-lot deduction in an allocation plan, kept for audit logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotDeduction {
    pub lot_id: LotId,
    pub lot_no: String,
    pub qty_deducted: f64,
    /// The lot's quantity after this deduction is applied.
    pub resulting_qty: f64,
}

/// Plan a FEFO allocation of `requested` main units against `candidates`.
///
/// `candidates` must already be ordered expiry-ascending with lot_no as the
/// tie-break and restricted to unexpired lots with stock, exactly what the
/// store's locked candidate read returns.
///
/// All-or-nothing: if the candidates cannot cover `requested`, the whole plan
/// fails with [`StockError::InsufficientStock`] carrying the shortfall and the
/// lot numbers inspected.
pub fn plan_fefo(candidates: &[Lot], requested: f64) -> StockResult<Vec<LotDeduction>> {
    if !requested.is_finite() || requested <= 0.0 {
        return Err(StockError::NegativeQuantity { qty: requested });
    }

    let mut deductions = Vec::new();
    let mut remaining = requested;

    for lot in candidates {
        if remaining <= 0.0 {
            break;
        }
        let take = remaining.min(lot.qty_on_hand);
        if take <= 0.0 {
            continue;
        }
        remaining -= take;
        deductions.push(LotDeduction {
            lot_id: lot.id,
            lot_no: lot.lot_no.clone(),
            qty_deducted: take,
            resulting_qty: lot.qty_on_hand - take,
        });
    }

    if remaining > 0.0 {
        return Err(StockError::InsufficientStock {
            requested,
            shortfall: remaining,
            lots_inspected: candidates.iter().map(|l| l.lot_no.clone()).collect(),
        });
    }

    Ok(deductions)
}

/// Plan a deduction against one explicitly chosen lot.
pub fn plan_explicit(lot: &Lot, requested: f64) -> StockResult<LotDeduction> {
    if !requested.is_finite() || requested <= 0.0 {
        return Err(StockError::NegativeQuantity { qty: requested });
    }
    if requested > lot.qty_on_hand {
        return Err(StockError::InsufficientStock {
            requested,
            shortfall: requested - lot.qty_on_hand,
            lots_inspected: vec![lot.lot_no.clone()],
        });
    }
    Ok(LotDeduction {
        lot_id: lot.id,
        lot_no: lot.lot_no.clone(),
        qty_deducted: requested,
        resulting_qty: lot.qty_on_hand - requested,
    })
}
