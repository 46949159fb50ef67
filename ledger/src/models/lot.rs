//! Addition (lot) and removal events

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One purchase of stock. Immutable once recorded; only ever consumed by
/// later removals through FIFO replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lot {
    pub id: Uuid,
    pub material_id: Uuid,
    /// FIFO key
    pub created_at: DateTime<Utc>,
    pub length_per_piece_mm: Decimal,
    pub pieces: u32,
    pub unit_price: Option<Decimal>,
    pub price_unit: Option<PriceUnit>,
    /// Currency of the supplier invoice, resolved by the caller
    pub currency: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub location: Option<String>,
    #[serde(default)]
    pub note: String,
}

impl Lot {
    /// Length-per-piece times piece count. In range for any lot that passed
    /// `checked_total_length`.
    pub fn total_length(&self) -> Decimal {
        self.length_per_piece_mm * Decimal::from(self.pieces)
    }

    /// Price and unit, only when both were recorded
    pub fn pricing(&self) -> Option<(Decimal, PriceUnit)> {
        self.unit_price.zip(self.price_unit)
    }
}

/// Unit a lot's price refers to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceUnit {
    PerKg,
    PerMeter,
}

impl PriceUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceUnit::PerKg => "per_kg",
            PriceUnit::PerMeter => "per_meter",
        }
    }
}

impl std::str::FromStr for PriceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per_kg" => Ok(PriceUnit::PerKg),
            "per_meter" => Ok(PriceUnit::PerMeter),
            other => Err(format!("unknown price unit: {}", other)),
        }
    }
}

/// One withdrawal of stock. Which lots it drew from is never stored; it is
/// recomputed by FIFO replay on every read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Removal {
    pub id: Uuid,
    pub material_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub length_per_piece_mm: Decimal,
    pub pieces: u32,
    #[serde(default)]
    pub note: String,
}

impl Removal {
    pub fn total_length(&self) -> Decimal {
        self.length_per_piece_mm * Decimal::from(self.pieces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(length: i64, pieces: u32) -> Lot {
        Lot {
            id: Uuid::new_v4(),
            material_id: Uuid::new_v4(),
            created_at: Utc::now(),
            length_per_piece_mm: Decimal::from(length),
            pieces,
            unit_price: None,
            price_unit: None,
            currency: None,
            supplier_id: None,
            location: None,
            note: String::new(),
        }
    }

    #[test]
    fn test_lot_total_length() {
        assert_eq!(lot(6000, 3).total_length(), Decimal::from(18000));
        assert_eq!(lot(6000, 0).total_length(), Decimal::ZERO);
    }

    #[test]
    fn test_pricing_requires_price_and_unit() {
        let mut priced = lot(1000, 1);
        assert!(priced.pricing().is_none());

        priced.unit_price = Some(Decimal::from(10));
        assert!(priced.pricing().is_none());

        priced.price_unit = Some(PriceUnit::PerKg);
        assert_eq!(priced.pricing(), Some((Decimal::from(10), PriceUnit::PerKg)));
    }

    #[test]
    fn test_price_unit_serde() {
        assert_eq!(serde_json::to_string(&PriceUnit::PerKg).unwrap(), "\"per_kg\"");
        assert_eq!("per_meter".parse::<PriceUnit>(), Ok(PriceUnit::PerMeter));
        assert!("per_ton".parse::<PriceUnit>().is_err());
    }
}
