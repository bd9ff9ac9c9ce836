//! Inventory lot record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DepartmentId, LotId, ProductId, StockError, StockResult};

/// A batch of a product with its own expiry date and quantity, scoped to one
/// storage location.
///
/// `qty_on_hand` is always expressed in main units and is never negative; the
/// store's quantity-adjustment primitive is the only place that mutates it.
/// `(lot_no, product_id, department_id)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub lot_no: String,
    pub product_id: ProductId,
    pub department_id: DepartmentId,
    /// Quantity on hand, in main units. Invariant: >= 0.
    pub qty_on_hand: f64,
    pub expiry_date: NaiveDate,
    /// Pack -> main conversion rate for this lot. Invariant: > 0.
    pub conversion_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lot {
    /// True if the lot has expired as of `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date < today
    }
}

/// Input for creating a new lot (inbound movement or manual entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotDraft {
    pub lot_no: String,
    pub product_id: ProductId,
    pub department_id: DepartmentId,
    /// Initial quantity in main units.
    pub qty_on_hand: f64,
    pub expiry_date: NaiveDate,
    pub conversion_rate: f64,
}

impl LotDraft {
    /// Validate the draft against `today` before it touches the store.
    ///
    /// Checks everything except uniqueness of the lot number, which only the
    /// store can decide.
    pub fn validate(&self, today: NaiveDate) -> StockResult<()> {
        if self.lot_no.trim().is_empty() {
            return Err(StockError::validation("lot number cannot be empty"));
        }
        if self.expiry_date <= today {
            return Err(StockError::ExpiryInPast {
                expiry: self.expiry_date,
            });
        }
        if !self.qty_on_hand.is_finite() || self.qty_on_hand < 0.0 {
            return Err(StockError::NegativeQuantity {
                qty: self.qty_on_hand,
            });
        }
        if !self.conversion_rate.is_finite() || self.conversion_rate <= 0.0 {
            return Err(StockError::InvalidConversionRate {
                rate: self.conversion_rate,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(expiry: NaiveDate) -> LotDraft {
        LotDraft {
            lot_no: "LOT-001".to_string(),
            product_id: ProductId::new(),
            department_id: DepartmentId::new(),
            qty_on_hand: 10.0,
            expiry_date: expiry,
            conversion_rate: 1.0,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn draft_with_future_expiry_is_valid() {
        assert!(draft(day(2025, 2, 1)).validate(day(2025, 1, 1)).is_ok());
    }

    #[test]
    fn expiry_on_or_before_today_is_rejected() {
        let today = day(2025, 1, 1);
        assert!(matches!(
            draft(today).validate(today),
            Err(StockError::ExpiryInPast { .. })
        ));
        assert!(matches!(
            draft(day(2024, 12, 31)).validate(today),
            Err(StockError::ExpiryInPast { .. })
        ));
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let mut d = draft(day(2025, 2, 1));
        d.qty_on_hand = -1.0;
        assert!(matches!(
            d.validate(day(2025, 1, 1)),
            Err(StockError::NegativeQuantity { .. })
        ));
    }

    #[test]
    fn non_positive_rate_is_rejected() {
        let mut d = draft(day(2025, 2, 1));
        d.conversion_rate = 0.0;
        assert!(matches!(
            d.validate(day(2025, 1, 1)),
            Err(StockError::InvalidConversionRate { .. })
        ));
    }

    #[test]
    fn blank_lot_no_is_rejected() {
        let mut d = draft(day(2025, 2, 1));
        d.lot_no = "  ".to_string();
        assert!(matches!(
            d.validate(day(2025, 1, 1)),
            Err(StockError::Validation(_))
        ));
    }
}
