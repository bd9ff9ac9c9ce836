//! Document headers.
//!
//! The surrounding CRUD layer owns document creation and workflow moves; this
//! core reads the header to scope line items and to refuse line edits once an
//! order has left its editable states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DepartmentId, DocumentId};

/// Direction of a supplier transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionDirection {
    In,
    Out,
}

/// Sales order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Draft,
    Confirmed,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Line items may only change while the order is still a draft.
    pub fn is_modifiable(self) -> bool {
        matches!(self, Self::Draft)
    }
}

/// What kind of document a set of line items belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DocumentKind {
    Transaction { direction: TransactionDirection },
    Order { status: OrderStatus },
}

impl DocumentKind {
    /// Whether the document currently accepts line edits.
    pub fn accepts_line_edits(self) -> bool {
        match self {
            Self::Transaction { .. } => true,
            Self::Order { status } => status.is_modifiable(),
        }
    }
}

/// Header of a transaction document or order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub id: DocumentId,
    /// Storage location the document's stock movements are scoped to.
    pub department_id: DepartmentId,
    pub kind: DocumentKind,
    pub created_at: DateTime<Utc>,
}
