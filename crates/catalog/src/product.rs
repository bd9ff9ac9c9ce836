//! Product model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{CategoryId, ProductId, StockError, StockResult};

/// Derived product status.
///
/// Owned by the stock health classifier: `Warning` and `Active` are computed
/// from the product's lots, `Disable` is forced by the admin lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Warning,
    Disable,
}

/// A catalog product.
///
/// The catalog CRUD layer owns creation and edits; this core only reads the
/// thresholds and writes back the derived `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    /// Unique, uppercase-normalized stock keeping unit code.
    pub sku: String,
    pub name: String,
    pub category_id: CategoryId,
    /// Bulk packaging unit label (e.g. "case").
    pub pack_unit: String,
    /// Atomic counting unit label (e.g. "bottle").
    pub main_unit: String,
    /// Low-stock threshold, in main units.
    pub low_stock_threshold: f64,
    /// Width of the near-expiry window, in days.
    pub near_expiry_days: u32,
    /// When set, the derived status is forced to `Disable`.
    pub admin_locked: bool,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Validate the fields this core depends on: non-empty SKU/name and
    /// well-formed unit labels.
    pub fn validate(&self) -> StockResult<()> {
        if self.sku.trim().is_empty() {
            return Err(StockError::validation("sku cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(StockError::validation("name cannot be empty"));
        }
        validate_unit_label("pack_unit", &self.pack_unit)?;
        validate_unit_label("main_unit", &self.main_unit)?;
        if !self.low_stock_threshold.is_finite() || self.low_stock_threshold < 0.0 {
            return Err(StockError::validation(
                "low_stock_threshold must be a non-negative number",
            ));
        }
        Ok(())
    }
}

/// Case-normalize a SKU: trimmed and uppercased.
pub fn normalize_sku(sku: &str) -> String {
    sku.trim().to_uppercase()
}

/// Unit labels must be non-empty and contain only Unicode letters, digits,
/// and spaces.
fn validate_unit_label(field: &str, label: &str) -> StockResult<()> {
    if label.trim().is_empty() {
        return Err(StockError::validation(format!("{field} cannot be empty")));
    }
    if !label
        .chars()
        .all(|c| c.is_alphanumeric() || c == ' ')
    {
        return Err(StockError::validation(format!(
            "{field} may only contain letters, digits, and spaces"
        )));
    }
    Ok(())
}
