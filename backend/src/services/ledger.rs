//! Ledger service: the persistence side of the material stock ledger
//!
//! Reads load a material's event history and hand it to the `ledger` crate.
//! Writes lock the material row, validate against the locked history, append
//! one event and update the cached aggregate in a single transaction, so there
//! is exactly one writer per material at a time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ledger::{
    compute_mass_per_meter, validate_addition, validate_removal, value_of_lot, value_of_removal,
    value_of_stock, AdditionRequest, Geometry, IntegrityWarning, Lot, LotDraw, MassPerMeter,
    Material, PriceUnit, Reconciliation, Removal, RemovalRequest, StockHistory, Valuation,
    ValuedPortion,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{LotRow, MaterialRow, RemovalRow};
use crate::services::reorder::ReorderService;

const MATERIAL_COLUMNS: &str = "id, name, shape, dimensions, material_grade, profile_id, \
     kg_per_meter, aggregate_quantity_mm, created_at";

/// Ledger service for stock additions, removals and valuation
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
    default_currency: String,
}

/// Input for registering a material
#[derive(Debug, Deserialize, Validate)]
pub struct CreateMaterialInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub geometry: Geometry,
}

/// Input for recording a new lot
#[derive(Debug, Deserialize, Validate)]
pub struct RecordAdditionInput {
    pub length_per_piece_mm: Decimal,
    pub pieces: u32,
    pub unit_price: Option<Decimal>,
    pub price_unit: Option<PriceUnit>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    pub supplier_id: Option<Uuid>,
    #[validate(length(max = 100))]
    pub location: Option<String>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

/// Input for recording a withdrawal
#[derive(Debug, Deserialize, Validate)]
pub struct RecordRemovalInput {
    #[serde(flatten)]
    pub request: RemovalRequest,
    /// Number of equal pieces the withdrawn length was cut into
    #[serde(default = "default_pieces")]
    pub pieces: u32,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

fn default_pieces() -> u32 {
    1
}

/// Material with its cached aggregate and derived weight
#[derive(Debug, Clone, Serialize)]
pub struct MaterialOverview {
    #[serde(flatten)]
    pub material: Material,
    pub available_mm: Decimal,
    pub mass_per_meter: MassPerMeter,
    pub available_weight_kg: Option<Decimal>,
}

/// Weight of a given length of a material
#[derive(Debug, Clone, Serialize)]
pub struct WeightView {
    pub material_id: Uuid,
    pub length_mm: Decimal,
    pub kg_per_meter: Decimal,
    pub weight_kg: Decimal,
}

/// Remaining length of one lot
#[derive(Debug, Clone, Serialize)]
pub struct LotBalanceView {
    pub lot: Lot,
    pub remaining_mm: Decimal,
    pub consumed_mm: Decimal,
    pub remaining_weight_kg: Option<Decimal>,
}

/// Per-lot remaining lengths of a material, oldest lot first
#[derive(Debug, Clone, Serialize)]
pub struct LotBalances {
    pub material_id: Uuid,
    /// Cutoff the balances were computed at; `None` means after every event
    pub at: Option<DateTime<Utc>>,
    pub lots: Vec<LotBalanceView>,
    pub total_remaining_mm: Decimal,
    pub integrity: Option<IntegrityWarning>,
}

/// Monetary value of stock on hand or of one removal
#[derive(Debug, Clone, Serialize)]
pub struct ValuationView {
    pub material_id: Uuid,
    pub removal_id: Option<Uuid>,
    pub length_mm: Decimal,
    pub amount: Decimal,
    pub currency: String,
    pub complete: bool,
    pub unpriced_mm: Decimal,
    pub unattributed_mm: Decimal,
    pub portions: Vec<ValuedPortion>,
}

/// Result of a recorded addition
#[derive(Debug, Clone, Serialize)]
pub struct AdditionResult {
    pub lot: Lot,
    pub added_mm: Decimal,
    pub new_aggregate_mm: Decimal,
    pub purchase_value: ValuationView,
    pub closed_reorder_requests: u64,
}

/// Result of a recorded removal
#[derive(Debug, Clone, Serialize)]
pub struct RemovalResult {
    pub removal: Removal,
    pub total_mm: Decimal,
    pub new_aggregate_mm: Decimal,
    pub draws: Vec<LotDraw>,
    pub valuation: ValuationView,
}

/// Cached aggregate checked against the event log
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationView {
    pub material_id: Uuid,
    #[serde(flatten)]
    pub reconciliation: Reconciliation,
    pub consistent: bool,
    pub integrity: Option<IntegrityWarning>,
}

impl LedgerService {
    /// Create a new LedgerService instance
    pub fn new(db: PgPool, default_currency: impl Into<String>) -> Self {
        Self {
            db,
            default_currency: default_currency.into(),
        }
    }

    /// Register a material with an empty stock
    pub async fn create_material(&self, input: CreateMaterialInput) -> AppResult<MaterialOverview> {
        input.validate()?;

        let profile = input.geometry.profile.clone().unwrap_or_default();
        let row = sqlx::query_as::<_, MaterialRow>(&format!(
            r#"
            INSERT INTO materials (name, shape, dimensions, material_grade, profile_id, kg_per_meter)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {MATERIAL_COLUMNS}
            "#
        ))
        .bind(&input.name)
        .bind(input.geometry.shape.as_str())
        .bind(Json(&input.geometry.dimensions))
        .bind(&input.geometry.material_grade)
        .bind(&profile.profile_id)
        .bind(profile.kg_per_meter)
        .fetch_one(&self.db)
        .await?;

        let material = Material::from(row);
        tracing::info!(material_id = %material.id, name = %material.name, "Material registered");

        let mut conn = self.db.acquire().await?;
        let mass = mass_per_meter(&mut conn, &material).await?;
        Ok(overview(material, mass))
    }

    /// Get a material with its cached aggregate and mass per meter
    pub async fn get_material(&self, material_id: Uuid) -> AppResult<MaterialOverview> {
        let mut conn = self.db.acquire().await?;
        let material = fetch_material(&mut conn, material_id, false).await?;
        let mass = mass_per_meter(&mut conn, &material).await?;
        Ok(overview(material, mass))
    }

    /// Weight of `length_mm` of a material. Unlike the overview, an unknown
    /// mass per meter is an error here.
    pub async fn get_weight(&self, material_id: Uuid, length_mm: Decimal) -> AppResult<WeightView> {
        let mut conn = self.db.acquire().await?;
        let material = fetch_material(&mut conn, material_id, false).await?;
        let mass = mass_per_meter(&mut conn, &material).await?;
        weight_view(material_id, length_mm, mass)
    }

    /// Per-lot remaining lengths, after every event or at a cutoff
    pub async fn get_lot_balances(
        &self,
        material_id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> AppResult<LotBalances> {
        let mut conn = self.db.acquire().await?;
        let material = fetch_material(&mut conn, material_id, false).await?;
        let history = load_history(&mut conn, material_id).await?;
        let mass = mass_per_meter(&mut conn, &material).await?;

        let allocation = match at {
            Some(cutoff) => history.remaining_at(cutoff),
            None => history.remaining_now(),
        };

        let lots = allocation
            .balances
            .iter()
            .map(|balance| LotBalanceView {
                lot: balance.lot.clone(),
                remaining_mm: balance.remaining_mm,
                consumed_mm: balance.consumed_mm(),
                remaining_weight_kg: mass.weight_kg(balance.remaining_mm),
            })
            .collect();

        Ok(LotBalances {
            material_id,
            at,
            lots,
            total_remaining_mm: allocation.total_remaining_mm(),
            integrity: allocation.integrity,
        })
    }

    /// Value of everything currently on hand
    pub async fn get_stock_valuation(&self, material_id: Uuid) -> AppResult<ValuationView> {
        let mut conn = self.db.acquire().await?;
        let material = fetch_material(&mut conn, material_id, false).await?;
        let history = load_history(&mut conn, material_id).await?;
        let mass = mass_per_meter(&mut conn, &material).await?;

        let valuation = value_of_stock(&history, mass);
        let on_hand: Decimal = valuation.portions.iter().map(|p| p.used_mm).sum();
        Ok(self.valuation_view(material_id, None, on_hand, valuation))
    }

    /// Value of one recorded removal, attributed FIFO to its source lots
    pub async fn get_removal_valuation(
        &self,
        material_id: Uuid,
        removal_id: Uuid,
    ) -> AppResult<ValuationView> {
        let mut conn = self.db.acquire().await?;
        let material = fetch_material(&mut conn, material_id, false).await?;
        let history = load_history(&mut conn, material_id).await?;
        let mass = mass_per_meter(&mut conn, &material).await?;

        let removal = history
            .removal(removal_id)
            .ok_or_else(|| AppError::NotFound("Removal".to_string()))?;

        let valuation = value_of_removal(removal, &history, mass);
        Ok(self.valuation_view(
            material_id,
            Some(removal_id),
            removal.total_length(),
            valuation,
        ))
    }

    /// Record a new lot
    pub async fn record_addition(
        &self,
        material_id: Uuid,
        input: RecordAdditionInput,
    ) -> AppResult<AdditionResult> {
        input.validate()?;
        check_pricing(input.unit_price, input.price_unit)?;

        let mut tx = self.db.begin().await?;
        let material = fetch_material(&mut tx, material_id, true).await?;
        let history = load_history(&mut tx, material_id).await?;

        let plan = validate_addition(
            &material,
            &AdditionRequest {
                length_per_piece_mm: input.length_per_piece_mm,
                pieces: input.pieces,
            },
        )?;

        let row = sqlx::query_as::<_, LotRow>(
            r#"
            INSERT INTO material_lots (
                material_id, created_at, length_per_piece_mm, pieces, unit_price,
                price_unit, currency, supplier_id, location, note
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, material_id, created_at, length_per_piece_mm, pieces, unit_price,
                      price_unit, currency, supplier_id, location, note
            "#,
        )
        .bind(material_id)
        .bind(event_timestamp(&history))
        .bind(input.length_per_piece_mm)
        .bind(to_db_pieces(input.pieces)?)
        .bind(input.unit_price)
        .bind(input.price_unit.map(|unit| unit.as_str()))
        .bind(&input.currency)
        .bind(input.supplier_id)
        .bind(&input.location)
        .bind(&input.note)
        .fetch_one(&mut *tx)
        .await?;
        let lot = Lot::try_from(row)?;

        update_aggregate(&mut tx, material_id, plan.new_aggregate_mm).await?;
        let closed_reorder_requests = ReorderService::on_event(&mut tx, &plan.event).await?;
        let mass = mass_per_meter(&mut tx, &material).await?;

        tx.commit().await?;

        tracing::info!(
            material_id = %material_id,
            lot_id = %lot.id,
            added_mm = %plan.added_mm,
            new_aggregate_mm = %plan.new_aggregate_mm,
            "Lot recorded"
        );

        let purchase_value =
            self.valuation_view(material_id, None, plan.added_mm, value_of_lot(&lot, mass));

        Ok(AdditionResult {
            lot,
            added_mm: plan.added_mm,
            new_aggregate_mm: plan.new_aggregate_mm,
            purchase_value,
            closed_reorder_requests,
        })
    }

    /// Record a withdrawal in aggregate or per-lot mode
    pub async fn record_removal(
        &self,
        material_id: Uuid,
        input: RecordRemovalInput,
    ) -> AppResult<RemovalResult> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let material = fetch_material(&mut tx, material_id, true).await?;
        let history = load_history(&mut tx, material_id).await?;

        let plan = validate_removal(&material, &history, &input.request)?;
        let length_per_piece_mm = split_into_pieces(plan.total_mm, input.pieces)?;

        let row = sqlx::query_as::<_, RemovalRow>(
            r#"
            INSERT INTO material_removals (material_id, created_at, length_per_piece_mm, pieces, note)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, material_id, created_at, length_per_piece_mm, pieces, note
            "#,
        )
        .bind(material_id)
        .bind(event_timestamp(&history))
        .bind(length_per_piece_mm)
        .bind(to_db_pieces(input.pieces)?)
        .bind(&input.note)
        .fetch_one(&mut *tx)
        .await?;
        let removal = Removal::try_from(row)?;

        update_aggregate(&mut tx, material_id, plan.new_aggregate_mm).await?;
        let mass = mass_per_meter(&mut tx, &material).await?;

        tx.commit().await?;

        tracing::info!(
            material_id = %material_id,
            removal_id = %removal.id,
            total_mm = %plan.total_mm,
            new_aggregate_mm = %plan.new_aggregate_mm,
            "Removal recorded"
        );

        let mut removals = history.removals().to_vec();
        removals.push(removal.clone());
        let after = StockHistory::new(history.lots().to_vec(), removals);
        let valuation = self.valuation_view(
            material_id,
            Some(removal.id),
            plan.total_mm,
            value_of_removal(&removal, &after, mass),
        );

        Ok(RemovalResult {
            removal,
            total_mm: plan.total_mm,
            new_aggregate_mm: plan.new_aggregate_mm,
            draws: plan.draws,
            valuation,
        })
    }

    /// Compare the cached aggregate with the event log
    pub async fn reconcile(&self, material_id: Uuid) -> AppResult<ReconciliationView> {
        let mut conn = self.db.acquire().await?;
        let material = fetch_material(&mut conn, material_id, false).await?;
        let history = load_history(&mut conn, material_id).await?;

        let reconciliation = history.reconcile(&material);
        let integrity = history.remaining_now().integrity;

        Ok(ReconciliationView {
            material_id,
            consistent: reconciliation.is_consistent() && integrity.is_none(),
            reconciliation,
            integrity,
        })
    }

    fn valuation_view(
        &self,
        material_id: Uuid,
        removal_id: Option<Uuid>,
        length_mm: Decimal,
        valuation: Valuation,
    ) -> ValuationView {
        ValuationView {
            material_id,
            removal_id,
            length_mm,
            amount: valuation.amount,
            currency: valuation.currency_or(&self.default_currency).to_string(),
            complete: valuation.is_complete(),
            unpriced_mm: valuation.unpriced_mm,
            unattributed_mm: valuation.unattributed_mm,
            portions: valuation.portions,
        }
    }
}

fn overview(material: Material, mass: MassPerMeter) -> MaterialOverview {
    let available_mm = material.available_mm();
    MaterialOverview {
        available_weight_kg: mass.weight_kg(available_mm),
        available_mm,
        mass_per_meter: mass,
        material,
    }
}

fn weight_view(material_id: Uuid, length_mm: Decimal, mass: MassPerMeter) -> AppResult<WeightView> {
    if length_mm <= Decimal::ZERO {
        return Err(AppError::Validation {
            field: "length_mm".to_string(),
            message: "Length must be positive".to_string(),
        });
    }
    let kg_per_meter = mass.require()?;
    let weight_kg = mass.weight_kg(length_mm).ok_or_else(|| AppError::Validation {
        field: "length_mm".to_string(),
        message: "Length is out of range".to_string(),
    })?;

    Ok(WeightView {
        material_id,
        length_mm,
        kg_per_meter,
        weight_kg,
    })
}

async fn fetch_material(
    conn: &mut PgConnection,
    material_id: Uuid,
    for_update: bool,
) -> AppResult<Material> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let query = format!("SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = $1{lock}");

    let row = sqlx::query_as::<_, MaterialRow>(&query)
        .bind(material_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Material".to_string()))?;

    Ok(Material::from(row))
}

/// Lots and removals in FIFO order. Ties on `created_at` keep insertion order.
async fn load_history(conn: &mut PgConnection, material_id: Uuid) -> AppResult<StockHistory> {
    let lots = sqlx::query_as::<_, LotRow>(
        r#"
        SELECT id, material_id, created_at, length_per_piece_mm, pieces, unit_price,
               price_unit, currency, supplier_id, location, note
        FROM material_lots
        WHERE material_id = $1
        ORDER BY created_at, seq
        "#,
    )
    .bind(material_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(Lot::try_from)
    .collect::<AppResult<Vec<_>>>()?;

    let removals = sqlx::query_as::<_, RemovalRow>(
        r#"
        SELECT id, material_id, created_at, length_per_piece_mm, pieces, note
        FROM material_removals
        WHERE material_id = $1
        ORDER BY created_at, seq
        "#,
    )
    .bind(material_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(Removal::try_from)
    .collect::<AppResult<Vec<_>>>()?;

    StockHistory::checked(lots, removals)
        .map_err(|e| AppError::Internal(format!("material {} history: {}", material_id, e)))
}

/// Mass per meter, consulting the standardized profile table when the
/// material references one
async fn mass_per_meter(conn: &mut PgConnection, material: &Material) -> AppResult<MassPerMeter> {
    let mut profiles: HashMap<String, Decimal> = HashMap::new();

    let profile_id = material
        .geometry
        .profile
        .as_ref()
        .and_then(|hint| hint.profile_id.as_deref());
    if let Some(profile_id) = profile_id {
        let kg_per_meter = sqlx::query_scalar::<_, Decimal>(
            "SELECT kg_per_meter FROM standard_profiles WHERE id = $1",
        )
        .bind(profile_id)
        .fetch_optional(&mut *conn)
        .await?;

        match kg_per_meter {
            Some(kg) => {
                profiles.insert(profile_id.to_string(), kg);
            }
            None => tracing::warn!(
                material_id = %material.id,
                profile_id,
                "Material references an unknown standard profile"
            ),
        }
    }

    Ok(compute_mass_per_meter(&material.geometry, &profiles))
}

async fn update_aggregate(
    conn: &mut PgConnection,
    material_id: Uuid,
    aggregate_quantity_mm: Decimal,
) -> AppResult<()> {
    sqlx::query("UPDATE materials SET aggregate_quantity_mm = $2 WHERE id = $1")
        .bind(material_id)
        .bind(aggregate_quantity_mm)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Timestamp for a new event: now, but never earlier than the latest event
/// it was validated against
fn event_timestamp(history: &StockHistory) -> DateTime<Utc> {
    let now = Utc::now();
    history
        .latest_event_at()
        .map_or(now, |latest| latest.max(now))
}

fn check_pricing(unit_price: Option<Decimal>, price_unit: Option<PriceUnit>) -> AppResult<()> {
    match (unit_price, price_unit) {
        (Some(price), _) if price < Decimal::ZERO => Err(AppError::Validation {
            field: "unit_price".to_string(),
            message: "Unit price cannot be negative".to_string(),
        }),
        (Some(_), None) => Err(AppError::Validation {
            field: "price_unit".to_string(),
            message: "A unit price needs a price unit".to_string(),
        }),
        (None, Some(_)) => Err(AppError::Validation {
            field: "unit_price".to_string(),
            message: "A price unit needs a unit price".to_string(),
        }),
        _ => Ok(()),
    }
}

/// Length of each piece when `total_mm` is cut into `pieces` equal pieces
fn split_into_pieces(total_mm: Decimal, pieces: u32) -> AppResult<Decimal> {
    if pieces == 0 {
        return Err(AppError::Validation {
            field: "pieces".to_string(),
            message: "Piece count must be positive".to_string(),
        });
    }

    let count = Decimal::from(pieces);
    let per_piece = total_mm / count;
    if per_piece * count != total_mm {
        return Err(AppError::Validation {
            field: "pieces".to_string(),
            message: format!("{} mm cannot be cut into {} equal pieces", total_mm, pieces),
        });
    }
    Ok(per_piece)
}

fn to_db_pieces(pieces: u32) -> AppResult<i32> {
    i32::try_from(pieces).map_err(|_| AppError::Validation {
        field: "pieces".to_string(),
        message: "Piece count is too large".to_string(),
    })
}
