//! Stock health classification.
//!
//! A pure function of a product's lots and its thresholds, run after any lot
//! mutation. Advisory metadata only: it never constrains allocation, and it
//! deliberately sees expired lots that the FEFO candidate read filters out,
//! so reporting can show dead stock.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use stockroom_inventory::Lot;

use crate::product::{Product, ProductStatus};

/// Derived stock health for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockHealth {
    pub status: ProductStatus,
    /// Total available quantity is at or below the low-stock threshold.
    pub low_stock: bool,
    /// At least one lot expires within the near-expiry window.
    pub near_expiry: bool,
    /// At least one lot has already expired.
    pub expired: bool,
    /// Sum of quantity on hand over non-expired lots, in main units.
    pub total_available: f64,
}

/// Classify a product's stock as of `today`.
pub fn classify(product: &Product, lots: &[Lot], today: NaiveDate) -> StockHealth {
    let near_cutoff = today + Days::new(u64::from(product.near_expiry_days));

    let mut total_available = 0.0;
    let mut near_expiry = false;
    let mut expired = false;

    for lot in lots {
        if lot.expiry_date < today {
            expired = true;
            continue;
        }
        total_available += lot.qty_on_hand;
        if lot.expiry_date <= near_cutoff {
            near_expiry = true;
        }
    }

    let low_stock = total_available <= product.low_stock_threshold;

    let status = if product.admin_locked {
        ProductStatus::Disable
    } else if low_stock || near_expiry || expired {
        ProductStatus::Warning
    } else {
        ProductStatus::Active
    };

    StockHealth {
        status,
        low_stock,
        near_expiry,
        expired,
        total_available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockroom_core::{CategoryId, DepartmentId, LotId, ProductId};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn product(threshold: f64, near_days: u32) -> Product {
        Product {
            id: ProductId::new(),
            sku: "SKU-001".to_string(),
            name: "Olive oil".to_string(),
            category_id: CategoryId::new(),
            pack_unit: "case".to_string(),
            main_unit: "bottle".to_string(),
            low_stock_threshold: threshold,
            near_expiry_days: near_days,
            admin_locked: false,
            status: ProductStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn lot(expiry: NaiveDate, qty: f64) -> Lot {
        Lot {
            id: LotId::new(),
            lot_no: "L".to_string(),
            product_id: ProductId::new(),
            department_id: DepartmentId::new(),
            qty_on_hand: qty,
            expiry_date: expiry,
            conversion_rate: 1.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn healthy_stock_is_active() {
        let today = day(2025, 1, 1);
        let health = classify(
            &product(10.0, 7),
            &[lot(day(2025, 3, 1), 50.0)],
            today,
        );
        assert_eq!(health.status, ProductStatus::Active);
        assert!(!health.low_stock && !health.near_expiry && !health.expired);
        assert_eq!(health.total_available, 50.0);
    }

    #[test]
    fn expired_lots_are_excluded_from_the_total_but_flagged() {
        let today = day(2025, 1, 1);
        let health = classify(
            &product(10.0, 7),
            &[lot(day(2024, 12, 1), 99.0), lot(day(2025, 3, 1), 50.0)],
            today,
        );
        assert_eq!(health.total_available, 50.0);
        assert!(health.expired);
        assert_eq!(health.status, ProductStatus::Warning);
    }

    #[test]
    fn near_expiry_window_is_inclusive_on_both_ends() {
        let today = day(2025, 1, 1);
        let p = product(0.0, 7);

        // Expiring today: near-expiry, not expired.
        let health = classify(&p, &[lot(today, 5.0)], today);
        assert!(health.near_expiry && !health.expired);

        // Exactly at the window edge.
        let health = classify(&p, &[lot(day(2025, 1, 8), 5.0)], today);
        assert!(health.near_expiry);

        // One day past the window.
        let health = classify(&p, &[lot(day(2025, 1, 9), 5.0)], today);
        assert!(!health.near_expiry);
    }

    #[test]
    fn low_stock_threshold_is_inclusive() {
        let today = day(2025, 1, 1);
        let health = classify(&product(50.0, 7), &[lot(day(2025, 6, 1), 50.0)], today);
        assert!(health.low_stock);
        assert_eq!(health.status, ProductStatus::Warning);
    }

    #[test]
    fn admin_lock_forces_disable() {
        let today = day(2025, 1, 1);
        let mut p = product(10.0, 7);
        p.admin_locked = true;
        let health = classify(&p, &[lot(day(2025, 6, 1), 500.0)], today);
        assert_eq!(health.status, ProductStatus::Disable);
        // Flags are still reported for the dashboard.
        assert!(!health.low_stock);
    }

    #[test]
    fn no_lots_means_low_stock_warning() {
        let today = day(2025, 1, 1);
        let health = classify(&product(10.0, 7), &[], today);
        assert!(health.low_stock);
        assert_eq!(health.total_available, 0.0);
        assert_eq!(health.status, ProductStatus::Warning);
    }
}
