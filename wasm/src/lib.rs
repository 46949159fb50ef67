//! WebAssembly module for the material stock ledger
//!
//! Lets a browser client preview ledger results offline:
//! - Mass per meter and weight from geometry
//! - Per-lot remaining lengths (FIFO)
//! - Valuation of a removal
//! - Guard checks before a removal is submitted
//!
//! Every binding takes and returns JSON in the same shapes the server uses.

use chrono::{DateTime, Utc};
use ledger::{
    compute_mass_per_meter, validate_removal, value_of_removal, Allocation, Geometry, Lot,
    MassPerMeter, Material, Removal, RemovalRequest, StockHistory,
};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use wasm_bindgen::prelude::*;

/// Remaining length of one lot, as returned to JavaScript
#[derive(Debug, Serialize)]
struct RemainingLot {
    lot_id: Uuid,
    remaining_mm: Decimal,
}

#[derive(Debug, Serialize)]
struct RemainingResponse {
    lots: Vec<RemainingLot>,
    total_remaining_mm: Decimal,
    excess_mm: Option<Decimal>,
}

fn parse<T: DeserializeOwned>(what: &str, json: &str) -> Result<T, String> {
    serde_json::from_str(json).map_err(|e| format!("Invalid {} JSON: {}", what, e))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("Serialization failed: {}", e))
}

fn warn(message: &str) {
    #[cfg(target_arch = "wasm32")]
    web_sys::console::warn_1(&JsValue::from_str(message));
    #[cfg(not(target_arch = "wasm32"))]
    let _ = message;
}

fn parse_history(lots_json: &str, removals_json: &str) -> Result<StockHistory, String> {
    let lots: Vec<Lot> = parse("lots", lots_json)?;
    let removals: Vec<Removal> = parse("removals", removals_json)?;
    StockHistory::checked(lots, removals).map_err(|e| e.to_string())
}

fn remaining_response(allocation: &Allocation<'_>) -> RemainingResponse {
    if let Some(integrity) = &allocation.integrity {
        warn(&integrity.to_string());
    }
    RemainingResponse {
        lots: allocation
            .balances
            .iter()
            .map(|b| RemainingLot {
                lot_id: b.lot_id(),
                remaining_mm: b.remaining_mm,
            })
            .collect(),
        total_remaining_mm: allocation.total_remaining_mm(),
        excess_mm: allocation.integrity.map(|i| i.excess_mm),
    }
}

fn mass_per_meter_json(geometry_json: &str, profiles_json: &str) -> Result<String, String> {
    let geometry: Geometry = parse("geometry", geometry_json)?;
    let profiles: HashMap<String, Decimal> = if profiles_json.trim().is_empty() {
        HashMap::new()
    } else {
        parse("profiles", profiles_json)?
    };
    to_json(&compute_mass_per_meter(&geometry, &profiles))
}

fn remaining_json(lots_json: &str, removals_json: &str, cutoff: &str) -> Result<String, String> {
    let history = parse_history(lots_json, removals_json)?;

    if cutoff.trim().is_empty() {
        return to_json(&remaining_response(&history.remaining_now()));
    }
    let cutoff: DateTime<Utc> = cutoff
        .parse()
        .map_err(|e| format!("Invalid cutoff timestamp: {}", e))?;
    to_json(&remaining_response(&history.remaining_at(cutoff)))
}

fn removal_value_json(
    removal_json: &str,
    lots_json: &str,
    removals_json: &str,
    mass_json: &str,
) -> Result<String, String> {
    let removal: Removal = parse("removal", removal_json)?;
    let history = parse_history(lots_json, removals_json)?;
    let mass: MassPerMeter = parse("mass per meter", mass_json)?;

    to_json(&value_of_removal(&removal, &history, mass))
}

fn removal_check_json(
    material_json: &str,
    lots_json: &str,
    removals_json: &str,
    request_json: &str,
) -> Result<String, String> {
    let material: Material = parse("material", material_json)?;
    let history = parse_history(lots_json, removals_json)?;
    let request: RemovalRequest = parse("removal request", request_json)?;

    match validate_removal(&material, &history, &request) {
        Ok(plan) => to_json(&serde_json::json!({ "ok": true, "plan": plan })),
        Err(err) => to_json(&serde_json::json!({
            "ok": false,
            "error": err,
            "message": err.to_string(),
        })),
    }
}

/// Mass per meter of a geometry. `profiles_json` maps standard profile ids
/// to kg/m and may be empty.
#[wasm_bindgen]
pub fn mass_per_meter(geometry_json: &str, profiles_json: &str) -> Result<String, JsValue> {
    mass_per_meter_json(geometry_json, profiles_json).map_err(|e| JsValue::from_str(&e))
}

/// Weight in kg of a length of material, or `undefined` when the geometry
/// cannot be resolved
#[wasm_bindgen]
pub fn weight_kg(kg_per_meter: f64, length_mm: f64) -> Option<f64> {
    if !kg_per_meter.is_finite() || kg_per_meter < 0.0 {
        return None;
    }
    let mass = MassPerMeter::Known(Decimal::from_f64(kg_per_meter)?);
    mass.weight_kg(Decimal::from_f64(length_mm)?)?.to_f64()
}

/// Per-lot remaining lengths. An empty cutoff means after every event.
#[wasm_bindgen]
pub fn compute_remaining(lots_json: &str, removals_json: &str, cutoff: &str) -> Result<String, JsValue> {
    remaining_json(lots_json, removals_json, cutoff).map_err(|e| JsValue::from_str(&e))
}

/// Valuation of one removal against the lots it drew from
#[wasm_bindgen]
pub fn value_removal(
    removal_json: &str,
    lots_json: &str,
    removals_json: &str,
    mass_json: &str,
) -> Result<String, JsValue> {
    removal_value_json(removal_json, lots_json, removals_json, mass_json)
        .map_err(|e| JsValue::from_str(&e))
}

/// Guard check of a removal request. Rejections are returned as data, not
/// thrown.
#[wasm_bindgen]
pub fn check_removal(
    material_json: &str,
    lots_json: &str,
    removals_json: &str,
    request_json: &str,
) -> Result<String, JsValue> {
    removal_check_json(material_json, lots_json, removals_json, request_json)
        .map_err(|e| JsValue::from_str(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    const LOTS: &str = r#"[
        {"id":"00000000-0000-0000-0000-000000000001","material_id":"00000000-0000-0000-0000-00000000000a",
         "created_at":"2024-03-01T08:00:00Z","length_per_piece_mm":"1000","pieces":1,
         "unit_price":"10","price_unit":"per_kg","currency":"EUR","supplier_id":null,"location":null},
        {"id":"00000000-0000-0000-0000-000000000002","material_id":"00000000-0000-0000-0000-00000000000a",
         "created_at":"2024-03-01T09:00:00Z","length_per_piece_mm":"500","pieces":1,
         "unit_price":"12","price_unit":"per_kg","currency":"EUR","supplier_id":null,"location":null}
    ]"#;

    const REMOVALS: &str = r#"[
        {"id":"00000000-0000-0000-0000-0000000000f1","material_id":"00000000-0000-0000-0000-00000000000a",
         "created_at":"2024-03-01T10:00:00Z","length_per_piece_mm":"700","pieces":1}
    ]"#;

    fn decimal(value: &Value) -> Decimal {
        value.as_str().unwrap().parse().unwrap()
    }

    #[test]
    fn test_mass_per_meter_square_bar() {
        let json = mass_per_meter_json(
            r#"{"shape":"square_bar","dimensions":{"side":"10"},"material_grade":null,"profile":null}"#,
            "",
        )
        .unwrap();
        let mass: MassPerMeter = serde_json::from_str(&json).unwrap();
        let kg = mass.kg_per_meter().unwrap();
        assert!((kg - Decimal::new(785, 3)).abs() < Decimal::new(1, 6));
    }

    #[test]
    fn test_mass_per_meter_from_profile_table() {
        let json = mass_per_meter_json(
            r#"{"shape":"profile","material_grade":null,"profile":{"kg_per_meter":null,"profile_id":"HEA100"}}"#,
            r#"{"HEA100":"16.7"}"#,
        )
        .unwrap();
        let mass: MassPerMeter = serde_json::from_str(&json).unwrap();
        assert_eq!(mass, MassPerMeter::Known(Decimal::new(167, 1)));
    }

    #[test]
    fn test_weight_kg() {
        let kg = weight_kg(2.0, 1500.0).unwrap();
        assert!((kg - 3.0).abs() < 1e-9);
        assert!(weight_kg(f64::NAN, 1500.0).is_none());
    }

    #[test]
    fn test_compute_remaining_now_and_at_cutoff() {
        let now: Value = serde_json::from_str(&remaining_json(LOTS, REMOVALS, "").unwrap()).unwrap();
        assert_eq!(decimal(&now["lots"][0]["remaining_mm"]), Decimal::from(300));
        assert_eq!(decimal(&now["lots"][1]["remaining_mm"]), Decimal::from(500));
        assert!(now["excess_mm"].is_null());

        let before: Value =
            serde_json::from_str(&remaining_json(LOTS, REMOVALS, "2024-03-01T08:30:00Z").unwrap())
                .unwrap();
        assert_eq!(before["lots"].as_array().unwrap().len(), 1);
        assert_eq!(decimal(&before["total_remaining_mm"]), Decimal::from(1000));
    }

    #[test]
    fn test_value_removal() {
        let removal = r#"{"id":"00000000-0000-0000-0000-0000000000f1","material_id":"00000000-0000-0000-0000-00000000000a",
            "created_at":"2024-03-01T10:00:00Z","length_per_piece_mm":"700","pieces":1}"#;
        let json = removal_value_json(
            removal,
            LOTS,
            REMOVALS,
            r#"{"status":"known","kg_per_meter":"2"}"#,
        )
        .unwrap();
        let valuation: Value = serde_json::from_str(&json).unwrap();

        // 0.7 m * 2 kg/m * 10
        assert_eq!(decimal(&valuation["amount"]), Decimal::from(14));
        assert_eq!(valuation["currency"], "EUR");
    }

    #[test]
    fn test_check_removal_reports_rejection() {
        let material = r#"{"id":"00000000-0000-0000-0000-00000000000a","name":"Rd 20",
            "geometry":{"shape":"round_bar","dimensions":{"diameter":"20"},"material_grade":null,"profile":null},
            "aggregate_quantity_mm":"800","created_at":"2024-03-01T07:00:00Z"}"#;

        let ok: Value = serde_json::from_str(
            &removal_check_json(material, LOTS, REMOVALS, r#"{"mode":"aggregate","requested_mm":"800"}"#)
                .unwrap(),
        )
        .unwrap();
        assert_eq!(ok["ok"], true);

        let rejected: Value = serde_json::from_str(
            &removal_check_json(material, LOTS, REMOVALS, r#"{"mode":"aggregate","requested_mm":"801"}"#)
                .unwrap(),
        )
        .unwrap();
        assert_eq!(rejected["ok"], false);
        assert_eq!(rejected["error"]["kind"], "insufficient_balance");
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(remaining_json("not json", "[]", "").is_err());
        assert!(remaining_json("[]", "[]", "yesterday").is_err());
    }

    #[test]
    fn test_out_of_range_lot_is_an_error() {
        let huge = LOTS.replacen(
            r#""length_per_piece_mm":"1000","pieces":1"#,
            r#""length_per_piece_mm":"79228162514264337593543950335","pieces":2"#,
            1,
        );
        assert_ne!(huge, LOTS);
        let err = remaining_json(&huge, REMOVALS, "").unwrap_err();
        assert!(err.contains("length_per_piece_mm"));
    }
}
