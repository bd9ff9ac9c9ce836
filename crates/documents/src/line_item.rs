//! Line items.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockroom_core::{DocumentId, LineItemId, LotId, ProductId, StockError, StockResult};

/// The caller-editable fields of a line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineFields {
    pub product_id: ProductId,
    /// Quantity in main units. Invariant: > 0.
    pub qty: f64,
    /// Explicitly chosen lot (outbound lines only).
    pub lot_id: Option<LotId>,
    /// Expiry date for the lot an inbound line creates.
    pub expiry_date: Option<NaiveDate>,
    pub note: Option<String>,
}

impl LineFields {
    pub fn validate(&self) -> StockResult<()> {
        if !self.qty.is_finite() || self.qty <= 0.0 {
            return Err(StockError::NegativeQuantity { qty: self.qty });
        }
        Ok(())
    }
}

/// A persisted line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub document_id: DocumentId,
    #[serde(flatten)]
    pub fields: LineFields,
}

/// One entry in a caller's desired line set.
///
/// A tagged union rather than an optional-id record: the reconciler's
/// three-way split is a total match, not a presence check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum IncomingLine {
    /// A line the caller wants created.
    New(LineFields),
    /// A line the caller asserts already exists on this document.
    Existing { id: LineItemId, fields: LineFields },
}

impl IncomingLine {
    pub fn fields(&self) -> &LineFields {
        match self {
            Self::New(fields) | Self::Existing { fields, .. } => fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_must_be_strictly_positive() {
        let fields = LineFields {
            product_id: ProductId::new(),
            qty: 0.0,
            lot_id: None,
            expiry_date: None,
            note: None,
        };
        assert!(matches!(
            fields.validate(),
            Err(StockError::NegativeQuantity { .. })
        ));
    }

    #[test]
    fn incoming_lines_are_tagged_on_the_wire() {
        let fields = LineFields {
            product_id: ProductId::new(),
            qty: 2.0,
            lot_id: None,
            expiry_date: None,
            note: None,
        };
        let new = serde_json::to_value(IncomingLine::New(fields.clone())).unwrap();
        assert_eq!(new["op"], "new");

        let id = LineItemId::new();
        let existing = serde_json::to_value(IncomingLine::Existing { id, fields }).unwrap();
        assert_eq!(existing["op"], "existing");
        assert_eq!(existing["id"], id.to_string());

        let parsed: IncomingLine = serde_json::from_value(existing).unwrap();
        assert!(matches!(parsed, IncomingLine::Existing { .. }));
    }
}
