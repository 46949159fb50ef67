//! Events the ledger emits for workflows it does not own

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// New stock arrived for a material. Reorder workflows close any
    /// outstanding request on this event.
    StockReplenished {
        material_id: Uuid,
        added_mm: Decimal,
        new_aggregate_mm: Decimal,
    },
}
