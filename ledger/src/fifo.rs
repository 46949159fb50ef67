//! FIFO allocation of removals against lots
//!
//! Removals never record which lots they drew from. The link is recomputed
//! on every read: total removed length is consumed from the oldest lot
//! forward, and whatever is left over is each lot's remaining length.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Lot, Removal};

/// Remaining length of one lot at a cutoff
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotBalance<'a> {
    pub lot: &'a Lot,
    pub remaining_mm: Decimal,
}

impl LotBalance<'_> {
    pub fn lot_id(&self) -> Uuid {
        self.lot.id
    }

    /// Still holds stock that can be withdrawn
    pub fn is_available(&self) -> bool {
        self.remaining_mm > Decimal::ZERO
    }

    pub fn consumed_mm(&self) -> Decimal {
        self.lot.total_length().max(Decimal::ZERO) - self.remaining_mm
    }
}

/// More length was removed than was ever added. Remaining lengths are
/// clamped at zero and the excess is flagged for operator review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntegrityWarning {
    pub excess_mm: Decimal,
}

impl std::fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "removals exceed recorded lots by {} mm",
            self.excess_mm.normalize()
        )
    }
}

/// Per-lot remaining lengths, oldest lot first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation<'a> {
    pub balances: Vec<LotBalance<'a>>,
    pub integrity: Option<IntegrityWarning>,
}

impl<'a> Allocation<'a> {
    /// Lots with positive remaining length, oldest first
    pub fn available(&self) -> impl Iterator<Item = &LotBalance<'a>> {
        self.balances.iter().filter(|b| b.is_available())
    }

    pub fn total_remaining_mm(&self) -> Decimal {
        self.balances.iter().map(|b| b.remaining_mm).sum()
    }

    pub fn balance_of(&self, lot_id: Uuid) -> Option<&LotBalance<'a>> {
        self.balances.iter().find(|b| b.lot.id == lot_id)
    }

    pub fn is_consistent(&self) -> bool {
        self.integrity.is_none()
    }
}

/// Each lot's remaining length at `cutoff`.
///
/// Only lots created at or before the cutoff and removals strictly before it
/// take part, so a removal valued at its own timestamp never consumes itself.
pub fn compute_remaining<'a>(
    lots: &'a [Lot],
    removals: &[Removal],
    cutoff: DateTime<Utc>,
) -> Allocation<'a> {
    let consumed: Decimal = removals
        .iter()
        .filter(|r| r.created_at < cutoff)
        .map(Removal::total_length)
        .sum();

    allocate(lots.iter().filter(|l| l.created_at <= cutoff), consumed)
}

/// Consume `total_to_consume` from the given lots oldest first.
///
/// Ties on timestamp keep the order the lots were supplied in.
pub fn allocate<'a>(lots: impl IntoIterator<Item = &'a Lot>, total_to_consume: Decimal) -> Allocation<'a> {
    let mut ordered: Vec<&Lot> = lots.into_iter().collect();
    ordered.sort_by_key(|lot| lot.created_at);

    let mut to_consume = total_to_consume.max(Decimal::ZERO);
    let balances = ordered
        .into_iter()
        .map(|lot| {
            let original = lot.total_length().max(Decimal::ZERO);
            let consumed = to_consume.min(original);
            to_consume -= consumed;
            LotBalance {
                lot,
                remaining_mm: original - consumed,
            }
        })
        .collect();

    let integrity = if to_consume > Decimal::ZERO {
        tracing::warn!(
            excess_mm = %to_consume,
            "FIFO replay removed more than was ever added; clamping lots at zero"
        );
        Some(IntegrityWarning {
            excess_mm: to_consume,
        })
    } else {
        None
    };

    Allocation { balances, integrity }
}
