//! Reorder requests for materials that are running low
//!
//! The ledger itself owns no reorder logic. It emits a `StockReplenished`
//! event with every recorded lot and this service closes whatever requests
//! were still open for that material.

use ledger::LedgerEvent;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::ReorderRequest;

/// Reorder service for raising and closing purchase requests
#[derive(Clone)]
pub struct ReorderService {
    db: PgPool,
}

/// Input for raising a reorder request
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateReorderInput {
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

impl ReorderService {
    /// Create a new ReorderService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Raise a reorder request for a material
    pub async fn create_request(
        &self,
        material_id: Uuid,
        input: CreateReorderInput,
    ) -> AppResult<ReorderRequest> {
        input.validate()?;

        let material_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM materials WHERE id = $1)")
                .bind(material_id)
                .fetch_one(&self.db)
                .await?;

        if !material_exists {
            return Err(AppError::NotFound("Material".to_string()));
        }

        let request = sqlx::query_as::<_, ReorderRequest>(
            r#"
            INSERT INTO reorder_requests (material_id, status, note)
            VALUES ($1, 'open', $2)
            RETURNING id, material_id, status, note, created_at, closed_at
            "#,
        )
        .bind(material_id)
        .bind(&input.note)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(material_id = %material_id, request_id = %request.id, "Reorder requested");
        Ok(request)
    }

    /// List reorder requests for a material, newest first
    pub async fn list_requests(&self, material_id: Uuid) -> AppResult<Vec<ReorderRequest>> {
        let requests = sqlx::query_as::<_, ReorderRequest>(
            r#"
            SELECT id, material_id, status, note, created_at, closed_at
            FROM reorder_requests
            WHERE material_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(material_id)
        .fetch_all(&self.db)
        .await?;

        Ok(requests)
    }

    /// Apply a ledger event. Runs inside the caller's transaction and returns
    /// the number of requests closed.
    pub async fn on_event(conn: &mut PgConnection, event: &LedgerEvent) -> AppResult<u64> {
        match event {
            LedgerEvent::StockReplenished {
                material_id,
                added_mm,
                ..
            } => {
                let closed = sqlx::query(
                    r#"
                    UPDATE reorder_requests
                    SET status = 'closed', closed_at = NOW()
                    WHERE material_id = $1 AND status = 'open'
                    "#,
                )
                .bind(material_id)
                .execute(&mut *conn)
                .await?
                .rows_affected();

                if closed > 0 {
                    tracing::info!(
                        material_id = %material_id,
                        added_mm = %added_mm,
                        closed,
                        "Stock replenished, reorder requests closed"
                    );
                }
                Ok(closed)
            }
        }
    }
}
