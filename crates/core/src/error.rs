//! Stock domain error model.
//!
//! Keep this focused on deterministic, business/domain failures. Storage
//! concerns (connection loss, SQL failures) belong to the infra layer.
//!
//! Errors split into three categories (see [`ErrorKind`]):
//! - **Validation**: rejected before any store I/O; the caller can correct the
//!   input and resubmit.
//! - **Conflict**: the store state disagrees with the request (duplicate lot
//!   number, not enough stock, lot still referenced). Carries enough detail
//!   for the caller to pick a retry strategy; never silently downgraded.
//! - **Consistency**: an invariant guard tripped (stock would go negative).
//!   Always fatal to the operation and always rolled back.

use thiserror::Error;

use crate::id::{DocumentId, LotId};

/// Result type used across the domain layer.
pub type StockResult<T> = Result<T, StockError>;

/// Coarse error category, used by callers to pick a recovery strategy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; resubmit with corrected values.
    Validation,
    /// Store state conflicts with the request; caller decides whether to retry.
    Conflict,
    /// Invariant guard tripped; the whole unit of work was rolled back.
    Consistency,
}

/// Domain-level stock error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StockError {
    /// Conversion rate was zero, negative, or non-finite.
    #[error("invalid conversion rate: {rate}")]
    InvalidConversionRate { rate: f64 },

    /// Both (or neither of) a main-unit quantity and a pack-unit quantity
    /// were supplied; exactly one form is accepted.
    #[error("ambiguous quantity input: supply either a main-unit quantity or a pack quantity with a conversion rate")]
    AmbiguousQuantityInput,

    /// A pack-unit quantity arrived without a conversion rate.
    #[error("pack quantity supplied without a conversion rate")]
    MissingConversionRate,

    /// A quantity that must be non-negative (or strictly positive) was not.
    #[error("invalid quantity: {qty}")]
    NegativeQuantity { qty: f64 },

    /// A new lot's expiry date is not in the future.
    #[error("expiry date {expiry} is not in the future")]
    ExpiryInPast { expiry: chrono::NaiveDate },

    /// A value failed validation (e.g. malformed unit label or SKU).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The (lot_no, product, department) triple already exists.
    #[error("lot number '{lot_no}' already exists for this product and location")]
    DuplicateLotNo { lot_no: String },

    /// Outbound demand exceeds available stock. `lots_inspected` lists the
    /// lot numbers that were considered before giving up.
    #[error("insufficient stock: requested {requested}, short by {shortfall}")]
    InsufficientStock {
        requested: f64,
        shortfall: f64,
        lots_inspected: Vec<String>,
    },

    /// The lot is still referenced by at least one transaction line.
    #[error("lot {lot_id} is referenced by transaction lines")]
    LotInUse { lot_id: LotId },

    /// Line edits were requested against a document whose workflow state no
    /// longer allows them.
    #[error("document {document_id} can no longer be edited")]
    DocumentNotEditable { document_id: DocumentId },

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A quantity mutation would drive a lot below zero. This is the sole
    /// enforcement point of the non-negativity invariant.
    #[error("lot {lot_id} would end at {resulting} (< 0)")]
    NegativeResultingStock { lot_id: LotId, resulting: f64 },
}

impl StockError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn duplicate_lot(lot_no: impl Into<String>) -> Self {
        Self::DuplicateLotNo {
            lot_no: lot_no.into(),
        }
    }

    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConversionRate { .. }
            | Self::AmbiguousQuantityInput
            | Self::MissingConversionRate
            | Self::NegativeQuantity { .. }
            | Self::ExpiryInPast { .. }
            | Self::Validation(_) => ErrorKind::Validation,
            Self::DuplicateLotNo { .. }
            | Self::InsufficientStock { .. }
            | Self::LotInUse { .. }
            | Self::DocumentNotEditable { .. }
            | Self::NotFound => ErrorKind::Conflict,
            Self::NegativeResultingStock { .. } => ErrorKind::Consistency,
        }
    }
}
