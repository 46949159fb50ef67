//! Validation of ledger mutations before they are persisted
//!
//! The guard never writes anything. On success it returns a plan the caller
//! persists (one new event plus the updated aggregate) in a single
//! transaction. Every rejection is all-or-nothing.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::history::StockHistory;
use crate::models::{LedgerEvent, Material};
use crate::types::MAX_LENGTH_PER_PIECE_MM;

/// Request to add a new lot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdditionRequest {
    pub length_per_piece_mm: Decimal,
    pub pieces: u32,
}

/// Validated addition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdditionPlan {
    pub added_mm: Decimal,
    pub new_aggregate_mm: Decimal,
    /// Emitted for reorder workflows once the lot is persisted
    pub event: LedgerEvent,
}

/// Explicit length to take from one chosen lot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotSelection {
    pub lot_id: Uuid,
    pub mm: Decimal,
}

/// Request to withdraw stock
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RemovalRequest {
    /// Only the total is given; lots are drawn FIFO
    Aggregate { requested_mm: Decimal },
    /// The caller picks lots and a length from each
    PerLot {
        selections: Vec<LotSelection>,
        /// When given, the selections must add up to exactly this
        #[serde(default)]
        expected_total_mm: Option<Decimal>,
    },
}

/// Length taken from one lot by a validated removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotDraw {
    pub lot_id: Uuid,
    pub mm: Decimal,
    /// Balance the lot is left with once the removal is recorded. Only set
    /// for aggregate removals: per-lot selections are checked against each
    /// lot but the stored removal is attributed FIFO, so a per-lot draw is
    /// an echo of the selection and not a balance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_after_mm: Option<Decimal>,
}

/// Validated removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalPlan {
    pub total_mm: Decimal,
    pub new_aggregate_mm: Decimal,
    pub draws: Vec<LotDraw>,
}

/// Total length of an event of `pieces` pieces, each `length_per_piece_mm`
/// long. Rejects non-positive values and pieces above
/// `MAX_LENGTH_PER_PIECE_MM`.
pub fn checked_total_length(length_per_piece_mm: Decimal, pieces: u32) -> LedgerResult<Decimal> {
    if length_per_piece_mm <= Decimal::ZERO {
        return Err(LedgerError::invalid(
            "length_per_piece_mm",
            "Length per piece must be positive",
        ));
    }
    if length_per_piece_mm > Decimal::from(MAX_LENGTH_PER_PIECE_MM) {
        return Err(LedgerError::invalid(
            "length_per_piece_mm",
            format!("Length per piece cannot exceed {} mm", MAX_LENGTH_PER_PIECE_MM),
        ));
    }
    if pieces == 0 {
        return Err(LedgerError::invalid("pieces", "Piece count must be positive"));
    }

    length_per_piece_mm
        .checked_mul(Decimal::from(pieces))
        .ok_or_else(|| LedgerError::invalid("pieces", "Total length is out of range"))
}

/// Check an addition request
pub fn validate_addition(material: &Material, request: &AdditionRequest) -> LedgerResult<AdditionPlan> {
    let added_mm = checked_total_length(request.length_per_piece_mm, request.pieces)?;
    let new_aggregate_mm = material
        .aggregate_quantity_mm
        .checked_add(added_mm)
        .ok_or_else(|| {
            LedgerError::invalid("length_per_piece_mm", "Stock quantity would be out of range")
        })?;

    Ok(AdditionPlan {
        added_mm,
        new_aggregate_mm,
        event: LedgerEvent::StockReplenished {
            material_id: material.id,
            added_mm,
            new_aggregate_mm,
        },
    })
}

/// Check a removal request against the material's current balances.
///
/// Per-lot balances come from replaying every event in `history`, which the
/// caller loads under the same lock it will append under.
pub fn validate_removal(
    material: &Material,
    history: &StockHistory,
    request: &RemovalRequest,
) -> LedgerResult<RemovalPlan> {
    let result = match request {
        RemovalRequest::Aggregate { requested_mm } => {
            validate_aggregate(material, history, *requested_mm)
        }
        RemovalRequest::PerLot {
            selections,
            expected_total_mm,
        } => validate_per_lot(material, history, selections, *expected_total_mm),
    };

    if let Err(err) = &result {
        tracing::debug!(material_id = %material.id, error = %err, "Removal rejected");
    }
    result
}

fn validate_aggregate(
    material: &Material,
    history: &StockHistory,
    requested_mm: Decimal,
) -> LedgerResult<RemovalPlan> {
    if requested_mm <= Decimal::ZERO {
        return Err(LedgerError::invalid(
            "requested_mm",
            "Removal length must be positive",
        ));
    }
    check_aggregate(material, requested_mm)?;

    // Preview of the lots FIFO will attribute this removal to
    let mut to_draw = requested_mm;
    let mut draws = Vec::new();
    for balance in history.remaining_now().available() {
        if to_draw <= Decimal::ZERO {
            break;
        }
        let mm = to_draw.min(balance.remaining_mm);
        to_draw -= mm;
        draws.push(LotDraw {
            lot_id: balance.lot.id,
            mm,
            remaining_after_mm: Some(balance.remaining_mm - mm),
        });
    }

    Ok(RemovalPlan {
        total_mm: requested_mm,
        new_aggregate_mm: material.aggregate_quantity_mm - requested_mm,
        draws,
    })
}

fn validate_per_lot(
    material: &Material,
    history: &StockHistory,
    selections: &[LotSelection],
    expected_total_mm: Option<Decimal>,
) -> LedgerResult<RemovalPlan> {
    if selections.is_empty() {
        return Err(LedgerError::invalid("selections", "Select at least one lot"));
    }

    let mut seen = HashSet::new();
    for selection in selections {
        if selection.mm <= Decimal::ZERO {
            return Err(LedgerError::invalid(
                "selections.mm",
                format!("Removal from lot {} must be positive", selection.lot_id),
            ));
        }
        if !seen.insert(selection.lot_id) {
            return Err(LedgerError::invalid(
                "selections.lot_id",
                format!("Lot {} selected more than once", selection.lot_id),
            ));
        }
    }

    let total_mm = selections
        .iter()
        .try_fold(Decimal::ZERO, |total, s| total.checked_add(s.mm))
        .ok_or_else(|| LedgerError::invalid("selections.mm", "Selected lengths are out of range"))?;
    if let Some(expected_mm) = expected_total_mm {
        if expected_mm != total_mm {
            return Err(LedgerError::SelectionMismatch {
                expected_mm,
                selected_mm: total_mm,
            });
        }
    }

    let allocation = history.remaining_now();
    let mut draws = Vec::with_capacity(selections.len());
    for selection in selections {
        let balance = allocation
            .balance_of(selection.lot_id)
            .ok_or(LedgerError::LotNotFound {
                lot_id: selection.lot_id,
            })?;
        if !balance.is_available() {
            return Err(LedgerError::LotDepleted {
                lot_id: selection.lot_id,
            });
        }
        if selection.mm > balance.remaining_mm {
            return Err(LedgerError::InsufficientBalance {
                requested_mm: selection.mm,
                available_mm: balance.remaining_mm,
            });
        }
        draws.push(LotDraw {
            lot_id: selection.lot_id,
            mm: selection.mm,
            remaining_after_mm: None,
        });
    }

    check_aggregate(material, total_mm)?;

    Ok(RemovalPlan {
        total_mm,
        new_aggregate_mm: material.aggregate_quantity_mm - total_mm,
        draws,
    })
}

fn check_aggregate(material: &Material, requested_mm: Decimal) -> LedgerResult<()> {
    let available_mm = material.available_mm();
    if requested_mm > available_mm {
        return Err(LedgerError::InsufficientBalance {
            requested_mm,
            available_mm,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::geometry::{Dimensions, Geometry, Shape};
    use crate::models::{Lot, Removal};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn lot(at: i64, length: i64) -> Lot {
        Lot {
            id: Uuid::new_v4(),
            material_id: Uuid::nil(),
            created_at: t(at),
            length_per_piece_mm: Decimal::from(length),
            pieces: 1,
            unit_price: None,
            price_unit: None,
            currency: None,
            supplier_id: None,
            location: None,
            note: String::new(),
        }
    }

    fn removal(at: i64, length: i64) -> Removal {
        Removal {
            id: Uuid::new_v4(),
            material_id: Uuid::nil(),
            created_at: t(at),
            length_per_piece_mm: Decimal::from(length),
            pieces: 1,
            note: String::new(),
        }
    }

    fn material(history: &StockHistory) -> Material {
        Material {
            id: Uuid::nil(),
            name: "Flat 40x10 S235".to_string(),
            geometry: Geometry {
                shape: Shape::RectangularBar,
                dimensions: Dimensions::default(),
                material_grade: None,
                profile: None,
            },
            aggregate_quantity_mm: history.derived_quantity_mm(),
            created_at: t(0),
        }
    }

    fn fixture() -> (StockHistory, Vec<Uuid>) {
        let lots = vec![lot(1, 1000), lot(2, 500), lot(3, 200)];
        let ids = lots.iter().map(|l| l.id).collect();
        (StockHistory::new(lots, vec![removal(4, 1000)]), ids)
    }

    #[test]
    fn test_validate_addition() {
        let (history, _) = fixture();
        let material = material(&history);

        let plan = validate_addition(
            &material,
            &AdditionRequest {
                length_per_piece_mm: Decimal::from(6000),
                pieces: 2,
            },
        )
        .unwrap();

        assert_eq!(plan.added_mm, Decimal::from(12000));
        assert_eq!(plan.new_aggregate_mm, Decimal::from(12700));
        assert_eq!(
            plan.event,
            LedgerEvent::StockReplenished {
                material_id: material.id,
                added_mm: Decimal::from(12000),
                new_aggregate_mm: Decimal::from(12700),
            }
        );
    }

    #[test]
    fn test_validate_addition_rejects_non_positive() {
        let (history, _) = fixture();
        let material = material(&history);

        let zero_length = AdditionRequest {
            length_per_piece_mm: Decimal::ZERO,
            pieces: 1,
        };
        assert!(matches!(
            validate_addition(&material, &zero_length),
            Err(LedgerError::InvalidInput { .. })
        ));

        let zero_pieces = AdditionRequest {
            length_per_piece_mm: Decimal::from(100),
            pieces: 0,
        };
        assert!(matches!(
            validate_addition(&material, &zero_pieces),
            Err(LedgerError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_validate_addition_rejects_out_of_range_length() {
        let (history, _) = fixture();
        let material = material(&history);

        let huge = AdditionRequest {
            length_per_piece_mm: Decimal::MAX,
            pieces: 2,
        };
        assert!(matches!(
            validate_addition(&material, &huge),
            Err(LedgerError::InvalidInput { ref field, .. }) if field == "length_per_piece_mm"
        ));

        let just_over = AdditionRequest {
            length_per_piece_mm: Decimal::from(MAX_LENGTH_PER_PIECE_MM) + Decimal::ONE,
            pieces: 1,
        };
        assert!(validate_addition(&material, &just_over).is_err());

        let longest = AdditionRequest {
            length_per_piece_mm: Decimal::from(MAX_LENGTH_PER_PIECE_MM),
            pieces: u32::MAX,
        };
        let plan = validate_addition(&material, &longest).unwrap();
        assert_eq!(
            plan.added_mm,
            Decimal::from(MAX_LENGTH_PER_PIECE_MM) * Decimal::from(u32::MAX)
        );
    }

    #[test]
    fn test_validate_addition_rejects_overflowing_aggregate() {
        let (history, _) = fixture();
        let mut material = material(&history);
        material.aggregate_quantity_mm = Decimal::MAX;

        let request = AdditionRequest {
            length_per_piece_mm: Decimal::from(6000),
            pieces: 1,
        };
        assert!(matches!(
            validate_addition(&material, &request),
            Err(LedgerError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_aggregate_removal_boundary() {
        let (history, _) = fixture();
        let material = material(&history);

        let exact = RemovalRequest::Aggregate {
            requested_mm: Decimal::from(700),
        };
        let plan = validate_removal(&material, &history, &exact).unwrap();
        assert_eq!(plan.new_aggregate_mm, Decimal::ZERO);

        let over = RemovalRequest::Aggregate {
            requested_mm: dec("700.001"),
        };
        assert_eq!(
            validate_removal(&material, &history, &over),
            Err(LedgerError::InsufficientBalance {
                requested_mm: dec("700.001"),
                available_mm: Decimal::from(700),
            })
        );
    }

    #[test]
    fn test_aggregate_removal_previews_fifo_draws() {
        let (history, ids) = fixture();
        let material = material(&history);

        let request = RemovalRequest::Aggregate {
            requested_mm: Decimal::from(600),
        };
        let plan = validate_removal(&material, &history, &request).unwrap();
        assert_eq!(
            plan.draws,
            vec![
                LotDraw {
                    lot_id: ids[1],
                    mm: Decimal::from(500),
                    remaining_after_mm: Some(Decimal::ZERO),
                },
                LotDraw {
                    lot_id: ids[2],
                    mm: Decimal::from(100),
                    remaining_after_mm: Some(Decimal::from(100)),
                },
            ]
        );
    }

    #[test]
    fn test_aggregate_removal_rejects_non_positive() {
        let (history, _) = fixture();
        let material = material(&history);

        let request = RemovalRequest::Aggregate {
            requested_mm: dec("-5"),
        };
        assert!(matches!(
            validate_removal(&material, &history, &request),
            Err(LedgerError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_per_lot_removal() {
        let (history, ids) = fixture();
        let material = material(&history);

        let request = RemovalRequest::PerLot {
            selections: vec![
                LotSelection {
                    lot_id: ids[2],
                    mm: Decimal::from(200),
                },
                LotSelection {
                    lot_id: ids[1],
                    mm: Decimal::from(100),
                },
            ],
            expected_total_mm: Some(Decimal::from(300)),
        };
        let plan = validate_removal(&material, &history, &request).unwrap();
        assert_eq!(plan.total_mm, Decimal::from(300));
        assert_eq!(plan.new_aggregate_mm, Decimal::from(400));
        assert_eq!(plan.draws[0].mm, Decimal::from(200));
        assert_eq!(plan.draws[1].mm, Decimal::from(100));
        assert!(plan.draws.iter().all(|d| d.remaining_after_mm.is_none()));

        let json = serde_json::to_value(&plan.draws[0]).unwrap();
        assert!(json.get("remaining_after_mm").is_none());
    }

    #[test]
    fn test_per_lot_rejects_depleted_lot() {
        let (history, ids) = fixture();
        let material = material(&history);

        let request = RemovalRequest::PerLot {
            selections: vec![LotSelection {
                lot_id: ids[0],
                mm: Decimal::from(1),
            }],
            expected_total_mm: None,
        };
        assert_eq!(
            validate_removal(&material, &history, &request),
            Err(LedgerError::LotDepleted { lot_id: ids[0] })
        );
    }

    #[test]
    fn test_per_lot_rejects_more_than_lot_holds() {
        let (history, ids) = fixture();
        let material = material(&history);

        let request = RemovalRequest::PerLot {
            selections: vec![LotSelection {
                lot_id: ids[2],
                mm: Decimal::from(201),
            }],
            expected_total_mm: None,
        };
        assert_eq!(
            validate_removal(&material, &history, &request),
            Err(LedgerError::InsufficientBalance {
                requested_mm: Decimal::from(201),
                available_mm: Decimal::from(200),
            })
        );
    }

    #[test]
    fn test_per_lot_rejects_overflowing_selection_total() {
        let (history, ids) = fixture();
        let material = material(&history);

        let request = RemovalRequest::PerLot {
            selections: vec![
                LotSelection {
                    lot_id: ids[1],
                    mm: Decimal::MAX,
                },
                LotSelection {
                    lot_id: ids[2],
                    mm: Decimal::MAX,
                },
            ],
            expected_total_mm: None,
        };
        assert!(matches!(
            validate_removal(&material, &history, &request),
            Err(LedgerError::InvalidInput { ref field, .. }) if field == "selections.mm"
        ));
    }

    #[test]
    fn test_per_lot_rejects_unknown_and_duplicate_lots() {
        let (history, ids) = fixture();
        let material = material(&history);

        let stranger = Uuid::new_v4();
        let unknown = RemovalRequest::PerLot {
            selections: vec![LotSelection {
                lot_id: stranger,
                mm: Decimal::from(10),
            }],
            expected_total_mm: None,
        };
        assert_eq!(
            validate_removal(&material, &history, &unknown),
            Err(LedgerError::LotNotFound { lot_id: stranger })
        );

        let twice = RemovalRequest::PerLot {
            selections: vec![
                LotSelection {
                    lot_id: ids[1],
                    mm: Decimal::from(10),
                },
                LotSelection {
                    lot_id: ids[1],
                    mm: Decimal::from(10),
                },
            ],
            expected_total_mm: None,
        };
        assert!(matches!(
            validate_removal(&material, &history, &twice),
            Err(LedgerError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_per_lot_total_must_match_expected() {
        let (history, ids) = fixture();
        let material = material(&history);

        let request = RemovalRequest::PerLot {
            selections: vec![LotSelection {
                lot_id: ids[1],
                mm: Decimal::from(100),
            }],
            expected_total_mm: Some(Decimal::from(150)),
        };
        assert_eq!(
            validate_removal(&material, &history, &request),
            Err(LedgerError::SelectionMismatch {
                expected_mm: Decimal::from(150),
                selected_mm: Decimal::from(100),
            })
        );
    }

    #[test]
    fn test_per_lot_checked_against_stale_aggregate() {
        let (history, ids) = fixture();
        let mut material = material(&history);
        material.aggregate_quantity_mm = Decimal::from(50);

        let request = RemovalRequest::PerLot {
            selections: vec![LotSelection {
                lot_id: ids[1],
                mm: Decimal::from(100),
            }],
            expected_total_mm: None,
        };
        assert_eq!(
            validate_removal(&material, &history, &request),
            Err(LedgerError::InsufficientBalance {
                requested_mm: Decimal::from(100),
                available_mm: Decimal::from(50),
            })
        );
    }

    #[test]
    fn test_request_serde_shape() {
        let request: RemovalRequest =
            serde_json::from_str(r#"{"mode":"aggregate","requested_mm":"250.5"}"#).unwrap();
        assert!(matches!(
            request,
            RemovalRequest::Aggregate { requested_mm } if requested_mm == dec("250.5")
        ));
    }
}
