//! Monetary value of withdrawn and on-hand stock
//!
//! A removal is valued by replaying FIFO up to the instant before it was
//! taken and pricing each slice at the price of the lot it came from.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::geometry::MassPerMeter;
use crate::history::StockHistory;
use crate::models::{Lot, PriceUnit, Removal};
use crate::types::mm_to_m;

/// The slice of a valuation that came from one lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuedPortion {
    pub lot_id: Uuid,
    pub used_mm: Decimal,
    pub amount: Decimal,
    /// False when the lot has no price, or is priced per kg while the
    /// material's mass per meter is unknown
    pub priced: bool,
}

/// Value of a length of material, broken down by lot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Valuation {
    pub amount: Decimal,
    /// Currency of the first consumed lot that records one
    pub currency: Option<String>,
    pub portions: Vec<ValuedPortion>,
    /// Length drawn from lots that could not be priced
    pub unpriced_mm: Decimal,
    /// Length not covered by any lot at the time of the removal
    pub unattributed_mm: Decimal,
}

impl Valuation {
    pub fn currency_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.currency.as_deref().unwrap_or(default)
    }

    /// Every millimeter was attributed to a lot and priced
    pub fn is_complete(&self) -> bool {
        self.unpriced_mm.is_zero() && self.unattributed_mm.is_zero()
    }

    fn add(&mut self, lot: &Lot, used_mm: Decimal, mass: MassPerMeter) {
        if self.currency.is_none() {
            self.currency = lot.currency.clone();
        }

        let priced = price_length(lot, used_mm, mass)
            .filter(|amount| self.amount.checked_add(*amount).is_some());
        if priced.is_none() {
            self.unpriced_mm += used_mm;
        }
        let amount = priced.unwrap_or(Decimal::ZERO);
        self.amount += amount;
        self.portions.push(ValuedPortion {
            lot_id: lot.id,
            used_mm,
            amount,
            priced: priced.is_some(),
        });
    }
}

/// Price `length_mm` taken from `lot`.
///
/// `None` when the lot carries no price, is priced per kg and the mass per
/// meter is unknown, or the amount is out of `Decimal` range.
pub fn price_length(lot: &Lot, length_mm: Decimal, mass: MassPerMeter) -> Option<Decimal> {
    let (unit_price, unit) = lot.pricing()?;
    let meters = mm_to_m(length_mm);
    match unit {
        PriceUnit::PerMeter => meters.checked_mul(unit_price),
        PriceUnit::PerKg => mass.weight_kg(length_mm)?.checked_mul(unit_price),
    }
}

/// Value of a removal, attributed to the lots FIFO says it drew from
pub fn value_of_removal(removal: &Removal, history: &StockHistory, mass: MassPerMeter) -> Valuation {
    let allocation = history.remaining_before(removal);
    let mut to_value = removal.total_length().max(Decimal::ZERO);
    let mut valuation = Valuation::default();

    for balance in allocation.available() {
        if to_value <= Decimal::ZERO {
            break;
        }
        let used = to_value.min(balance.remaining_mm);
        to_value -= used;
        valuation.add(balance.lot, used, mass);
    }

    if to_value > Decimal::ZERO {
        tracing::warn!(
            removal_id = %removal.id,
            unattributed_mm = %to_value,
            "Removal exceeds stock on hand at its timestamp"
        );
        valuation.unattributed_mm = to_value;
    }

    valuation
}

/// Value of a lot as purchased. No FIFO involved.
pub fn value_of_lot(lot: &Lot, mass: MassPerMeter) -> Valuation {
    let mut valuation = Valuation::default();
    valuation.add(lot, lot.total_length().max(Decimal::ZERO), mass);
    valuation
}

/// Value of everything still on hand, each lot at its own price
pub fn value_of_stock(history: &StockHistory, mass: MassPerMeter) -> Valuation {
    let allocation = history.remaining_now();
    let mut valuation = Valuation::default();
    for balance in allocation.available() {
        valuation.add(balance.lot, balance.remaining_mm, mass);
    }
    valuation
}
