//! HTTP handlers for material stock endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::ledger::{
    AdditionResult, CreateMaterialInput, LedgerService, LotBalances, MaterialOverview,
    ReconciliationView, RecordAdditionInput, RecordRemovalInput, RemovalResult, ValuationView,
    WeightView,
};
use crate::AppState;

fn ledger_service(state: &AppState) -> LedgerService {
    LedgerService::new(state.db.clone(), state.config.ledger.default_currency.clone())
}

/// Query parameters for lot balances
#[derive(Debug, Deserialize)]
pub struct LotBalanceQuery {
    /// RFC 3339 cutoff; omitted means after every recorded event
    pub at: Option<DateTime<Utc>>,
}

/// Query parameters for a weight lookup
#[derive(Debug, Deserialize)]
pub struct WeightQuery {
    pub length_mm: Decimal,
}

/// Register a material
pub async fn create_material(
    State(state): State<AppState>,
    Json(input): Json<CreateMaterialInput>,
) -> AppResult<(StatusCode, Json<MaterialOverview>)> {
    let material = ledger_service(&state).create_material(input).await?;
    Ok((StatusCode::CREATED, Json(material)))
}

/// Get a material with its cached aggregate
pub async fn get_material(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
) -> AppResult<Json<MaterialOverview>> {
    let material = ledger_service(&state).get_material(material_id).await?;
    Ok(Json(material))
}

/// Get the weight of a length of material
pub async fn get_weight(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
    Query(query): Query<WeightQuery>,
) -> AppResult<Json<WeightView>> {
    let weight = ledger_service(&state)
        .get_weight(material_id, query.length_mm)
        .await?;
    Ok(Json(weight))
}

/// Get per-lot remaining lengths
pub async fn get_lot_balances(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
    Query(query): Query<LotBalanceQuery>,
) -> AppResult<Json<LotBalances>> {
    let balances = ledger_service(&state)
        .get_lot_balances(material_id, query.at)
        .await?;
    Ok(Json(balances))
}

/// Get the value of stock on hand
pub async fn get_stock_valuation(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
) -> AppResult<Json<ValuationView>> {
    let valuation = ledger_service(&state)
        .get_stock_valuation(material_id)
        .await?;
    Ok(Json(valuation))
}

/// Get the value of a recorded removal
pub async fn get_removal_valuation(
    State(state): State<AppState>,
    Path((material_id, removal_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ValuationView>> {
    let valuation = ledger_service(&state)
        .get_removal_valuation(material_id, removal_id)
        .await?;
    Ok(Json(valuation))
}

/// Record a new lot
pub async fn record_addition(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
    Json(input): Json<RecordAdditionInput>,
) -> AppResult<(StatusCode, Json<AdditionResult>)> {
    let result = ledger_service(&state)
        .record_addition(material_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// Record a withdrawal
pub async fn record_removal(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
    Json(input): Json<RecordRemovalInput>,
) -> AppResult<(StatusCode, Json<RemovalResult>)> {
    let result = ledger_service(&state)
        .record_removal(material_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// Check the cached aggregate against the event log
pub async fn reconcile_material(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
) -> AppResult<Json<ReconciliationView>> {
    let reconciliation = ledger_service(&state).reconcile(material_id).await?;
    Ok(Json(reconciliation))
}
