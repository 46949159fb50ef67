//! Route definitions for the stock ledger server

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/materials", material_routes())
}

/// Material stock routes
fn material_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_material))
        .route("/:material_id", get(handlers::get_material))
        .route("/:material_id/weight", get(handlers::get_weight))
        .route("/:material_id/lots", get(handlers::get_lot_balances))
        .route("/:material_id/valuation", get(handlers::get_stock_valuation))
        .route("/:material_id/additions", post(handlers::record_addition))
        .route("/:material_id/removals", post(handlers::record_removal))
        .route(
            "/:material_id/removals/:removal_id/valuation",
            get(handlers::get_removal_valuation),
        )
        .route("/:material_id/reconcile", get(handlers::reconcile_material))
        .route(
            "/:material_id/reorder-requests",
            get(handlers::list_reorder_requests).post(handlers::create_reorder_request),
        )
}
