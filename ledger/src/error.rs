//! Error taxonomy for ledger mutations

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Reasons a ledger request is rejected before anything is persisted
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerError {
    #[error("Invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("Insufficient balance: requested {requested_mm} mm, available {available_mm} mm")]
    InsufficientBalance {
        requested_mm: Decimal,
        available_mm: Decimal,
    },

    #[error("Lot {lot_id} has no remaining stock")]
    LotDepleted { lot_id: Uuid },

    #[error("Lot {lot_id} does not belong to this material")]
    LotNotFound { lot_id: Uuid },

    #[error("Selected lots add up to {selected_mm} mm but {expected_mm} mm was requested")]
    SelectionMismatch {
        expected_mm: Decimal,
        selected_mm: Decimal,
    },

    #[error("Mass per meter cannot be determined for this geometry")]
    UnknownGeometry,
}

impl LedgerError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        LedgerError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Result alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
