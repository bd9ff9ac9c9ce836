//! Pack <-> main unit conversion.
//!
//! A product counts stock in its main unit; suppliers deliver in pack units.
//! Each lot carries its own pack->main conversion rate, so conversion is plain
//! arithmetic with strict input validation. Pure and side-effect free.

use serde::{Deserialize, Serialize};

use stockroom_core::{StockError, StockResult};

/// Convert a pack-unit quantity to main units.
pub fn to_main(qty_in_pack: f64, conversion_rate: f64) -> StockResult<f64> {
    if !conversion_rate.is_finite() || conversion_rate <= 0.0 {
        return Err(StockError::InvalidConversionRate {
            rate: conversion_rate,
        });
    }
    if !qty_in_pack.is_finite() {
        return Err(StockError::NegativeQuantity { qty: qty_in_pack });
    }
    Ok(qty_in_pack * conversion_rate)
}

/// A caller-supplied quantity, in exactly one of the two accepted forms.
///
/// Callers that accept loose optional fields should go through
/// [`QuantityInput::from_parts`], which enforces the exclusive-input rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityInput {
    /// Quantity already expressed in main units.
    Main(f64),
    /// Quantity in pack units, with the pack->main conversion rate.
    Pack { qty_in_pack: f64, rate: f64 },
}

impl QuantityInput {
    /// Build from optional fields: exactly one of `qty_in_main` or the
    /// `(qty_in_pack, rate)` pair must be present.
    pub fn from_parts(
        qty_in_main: Option<f64>,
        qty_in_pack: Option<f64>,
        rate: Option<f64>,
    ) -> StockResult<Self> {
        match (qty_in_main, qty_in_pack, rate) {
            (Some(main), None, None) => Ok(Self::Main(main)),
            (None, Some(pack), Some(rate)) => Ok(Self::Pack {
                qty_in_pack: pack,
                rate,
            }),
            (None, Some(_), None) => Err(StockError::MissingConversionRate),
            _ => Err(StockError::AmbiguousQuantityInput),
        }
    }

    /// Resolve to a main-unit quantity.
    pub fn resolve(self) -> StockResult<f64> {
        match self {
            Self::Main(qty) => {
                if !qty.is_finite() {
                    return Err(StockError::NegativeQuantity { qty });
                }
                Ok(qty)
            }
            Self::Pack { qty_in_pack, rate } => to_main(qty_in_pack, rate),
        }
    }
}
