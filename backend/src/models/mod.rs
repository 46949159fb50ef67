//! Database rows and their conversion into ledger types

use chrono::{DateTime, Utc};
use ledger::{Dimensions, Geometry, Lot, Material, PriceUnit, ProfileHint, Removal, Shape};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{types::Json, FromRow};
use uuid::Uuid;

use crate::error::AppError;

/// Row of the `materials` table
#[derive(Debug, Clone, FromRow)]
pub struct MaterialRow {
    pub id: Uuid,
    pub name: String,
    pub shape: String,
    pub dimensions: Json<Dimensions>,
    pub material_grade: Option<String>,
    pub profile_id: Option<String>,
    pub kg_per_meter: Option<Decimal>,
    pub aggregate_quantity_mm: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<MaterialRow> for Material {
    fn from(row: MaterialRow) -> Self {
        let profile = if row.kg_per_meter.is_some() || row.profile_id.is_some() {
            Some(ProfileHint {
                kg_per_meter: row.kg_per_meter,
                profile_id: row.profile_id,
            })
        } else {
            None
        };

        Material {
            id: row.id,
            name: row.name,
            geometry: Geometry {
                shape: row.shape.parse().unwrap_or(Shape::Other),
                dimensions: row.dimensions.0,
                material_grade: row.material_grade,
                profile,
            },
            aggregate_quantity_mm: row.aggregate_quantity_mm,
            created_at: row.created_at,
        }
    }
}

/// Row of the `material_lots` table
#[derive(Debug, Clone, FromRow)]
pub struct LotRow {
    pub id: Uuid,
    pub material_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub length_per_piece_mm: Decimal,
    pub pieces: i32,
    pub unit_price: Option<Decimal>,
    pub price_unit: Option<String>,
    pub currency: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub location: Option<String>,
    pub note: Option<String>,
}

impl TryFrom<LotRow> for Lot {
    type Error = AppError;

    fn try_from(row: LotRow) -> Result<Self, Self::Error> {
        let price_unit = row
            .price_unit
            .as_deref()
            .map(str::parse::<PriceUnit>)
            .transpose()
            .map_err(|e| AppError::Internal(format!("lot {}: {}", row.id, e)))?;

        Ok(Lot {
            id: row.id,
            material_id: row.material_id,
            created_at: row.created_at,
            length_per_piece_mm: row.length_per_piece_mm,
            pieces: piece_count(row.id, row.pieces)?,
            unit_price: row.unit_price,
            price_unit,
            currency: row.currency,
            supplier_id: row.supplier_id,
            location: row.location,
            note: row.note.unwrap_or_default(),
        })
    }
}

/// Row of the `material_removals` table
#[derive(Debug, Clone, FromRow)]
pub struct RemovalRow {
    pub id: Uuid,
    pub material_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub length_per_piece_mm: Decimal,
    pub pieces: i32,
    pub note: Option<String>,
}

impl TryFrom<RemovalRow> for Removal {
    type Error = AppError;

    fn try_from(row: RemovalRow) -> Result<Self, Self::Error> {
        Ok(Removal {
            id: row.id,
            material_id: row.material_id,
            created_at: row.created_at,
            length_per_piece_mm: row.length_per_piece_mm,
            pieces: piece_count(row.id, row.pieces)?,
            note: row.note.unwrap_or_default(),
        })
    }
}

fn piece_count(id: Uuid, pieces: i32) -> Result<u32, AppError> {
    u32::try_from(pieces)
        .map_err(|_| AppError::Internal(format!("event {} has negative piece count", id)))
}

/// Reorder request raised when a material runs low
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReorderRequest {
    pub id: Uuid,
    pub material_id: Uuid,
    pub status: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}
