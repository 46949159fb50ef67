//! Material master data

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::Geometry;

/// A stock-keeping unit of continuous-length raw material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: Uuid,
    pub name: String,
    pub geometry: Geometry,
    /// Cached total remaining length in millimeters, derived from the lot
    /// and removal events. Never the source of truth.
    pub aggregate_quantity_mm: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Material {
    /// Stock that can still be withdrawn, never negative
    pub fn available_mm(&self) -> Decimal {
        self.aggregate_quantity_mm.max(Decimal::ZERO)
    }
}
