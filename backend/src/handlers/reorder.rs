//! HTTP handlers for reorder requests

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::ReorderRequest;
use crate::services::reorder::{CreateReorderInput, ReorderService};
use crate::AppState;

/// Raise a reorder request
pub async fn create_reorder_request(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
    Json(input): Json<CreateReorderInput>,
) -> AppResult<(StatusCode, Json<ReorderRequest>)> {
    let service = ReorderService::new(state.db);
    let request = service.create_request(material_id, input).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// List reorder requests for a material
pub async fn list_reorder_requests(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
) -> AppResult<Json<Vec<ReorderRequest>>> {
    let service = ReorderService::new(state.db);
    let requests = service.list_requests(material_id).await?;
    Ok(Json(requests))
}
