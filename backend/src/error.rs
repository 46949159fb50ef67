//! Error handling for the stock ledger server
//!
//! Every failure leaves the handler as a JSON body of the form
//! `{ "error": { "code", "message", "field"?, "available_mm"? } }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ledger::LedgerError;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Ledger rejections
    #[error("Insufficient balance: requested {requested_mm} mm, available {available_mm} mm")]
    InsufficientBalance {
        requested_mm: Decimal,
        available_mm: Decimal,
    },

    #[error("Lot {0} is depleted")]
    LotDepleted(Uuid),

    #[error("Lot {0} not found for this material")]
    LotNotFound(Uuid),

    #[error("Selection mismatch: expected {expected_mm} mm, selected {selected_mm} mm")]
    SelectionMismatch {
        expected_mm: Decimal,
        selected_mm: Decimal,
    },

    #[error("Unknown geometry")]
    UnknownGeometry,

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidInput { field, message } => AppError::Validation { field, message },
            LedgerError::InsufficientBalance {
                requested_mm,
                available_mm,
            } => AppError::InsufficientBalance {
                requested_mm,
                available_mm,
            },
            LedgerError::LotDepleted { lot_id } => AppError::LotDepleted(lot_id),
            LedgerError::LotNotFound { lot_id } => AppError::LotNotFound(lot_id),
            LedgerError::SelectionMismatch {
                expected_mm,
                selected_mm,
            } => AppError::SelectionMismatch {
                expected_mm,
                selected_mm,
            },
            LedgerError::UnknownGeometry => AppError::UnknownGeometry,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|field| field.to_string())
            .unwrap_or_default();
        AppError::Validation {
            field,
            message: errors.to_string(),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_mm: Option<Decimal>,
}

impl ErrorDetail {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
            available_mm: None,
        }
    }
}

impl AppError {
    /// Status code and body for this error
    pub fn to_parts(&self) -> (StatusCode, ErrorDetail) {
        match self {
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    field: Some(field.clone()),
                    ..ErrorDetail::new("VALIDATION_ERROR", message.clone())
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::InsufficientBalance { available_mm, .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    available_mm: Some(*available_mm),
                    ..ErrorDetail::new("INSUFFICIENT_BALANCE", self.to_string())
                },
            ),
            AppError::LotDepleted(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new("LOT_DEPLETED", self.to_string()),
            ),
            AppError::LotNotFound(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    field: Some("lot_id".to_string()),
                    ..ErrorDetail::new("LOT_NOT_FOUND", self.to_string())
                },
            ),
            AppError::SelectionMismatch { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    field: Some("expected_total_mm".to_string()),
                    ..ErrorDetail::new("SELECTION_MISMATCH", self.to_string())
                },
            ),
            AppError::UnknownGeometry => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "UNKNOWN_GEOMETRY",
                    "Mass per meter cannot be determined for this material",
                ),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone()),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = self.to_parts();

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
