//! Read model over one material's event history

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::fifo::{self, Allocation};
use crate::guard::checked_total_length;
use crate::models::{Lot, Material, Removal};

/// Lots and removals of one material, each sorted by timestamp.
///
/// Sorting is stable, so events sharing a timestamp keep the order the
/// persistence layer supplied them in (insertion order).
#[derive(Debug, Clone, Default, Serialize)]
pub struct StockHistory {
    lots: Vec<Lot>,
    removals: Vec<Removal>,
}

/// Cached aggregate compared against the event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub cached_mm: Decimal,
    pub derived_mm: Decimal,
    pub drift_mm: Decimal,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.drift_mm.is_zero()
    }
}

impl StockHistory {
    pub fn new(mut lots: Vec<Lot>, mut removals: Vec<Removal>) -> Self {
        lots.sort_by_key(|lot| lot.created_at);
        removals.sort_by_key(|removal| removal.created_at);
        Self { lots, removals }
    }

    /// Like `new`, for events that did not come through the guard. Every
    /// lot and removal must have a positive, in-range length and piece count.
    pub fn checked(lots: Vec<Lot>, removals: Vec<Removal>) -> LedgerResult<Self> {
        let events = lots
            .iter()
            .map(|lot| (lot.id, lot.length_per_piece_mm, lot.pieces))
            .chain(
                removals
                    .iter()
                    .map(|removal| (removal.id, removal.length_per_piece_mm, removal.pieces)),
            );
        for (id, length_per_piece_mm, pieces) in events {
            checked_total_length(length_per_piece_mm, pieces).map_err(|err| match err {
                LedgerError::InvalidInput { field, message } => LedgerError::InvalidInput {
                    field,
                    message: format!("event {}: {}", id, message),
                },
                other => other,
            })?;
        }
        Ok(Self::new(lots, removals))
    }

    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    pub fn removals(&self) -> &[Removal] {
        &self.removals
    }

    pub fn removal(&self, id: Uuid) -> Option<&Removal> {
        self.removals.iter().find(|removal| removal.id == id)
    }

    pub fn total_added_mm(&self) -> Decimal {
        self.lots.iter().map(Lot::total_length).sum()
    }

    pub fn total_removed_mm(&self) -> Decimal {
        self.removals.iter().map(Removal::total_length).sum()
    }

    /// Timestamp of the most recent lot or removal
    pub fn latest_event_at(&self) -> Option<DateTime<Utc>> {
        let last_lot = self.lots.last().map(|lot| lot.created_at);
        let last_removal = self.removals.last().map(|removal| removal.created_at);
        last_lot.max(last_removal)
    }

    /// Added minus removed. Negative only for corrupted histories.
    pub fn derived_quantity_mm(&self) -> Decimal {
        self.total_added_mm() - self.total_removed_mm()
    }

    /// Per-lot remaining length at a cutoff
    pub fn remaining_at(&self, cutoff: DateTime<Utc>) -> Allocation<'_> {
        fifo::compute_remaining(&self.lots, &self.removals, cutoff)
    }

    /// Per-lot remaining length after every recorded event
    pub fn remaining_now(&self) -> Allocation<'_> {
        fifo::allocate(&self.lots, self.total_removed_mm())
    }

    /// Per-lot remaining length just before `removal` was taken.
    ///
    /// Lots up to and including the removal's timestamp are eligible. Prior
    /// consumption is every removal ordered before this one: earlier
    /// timestamps, plus same-timestamp removals inserted before it. A removal
    /// not in the history is treated as if appended now.
    pub fn remaining_before(&self, removal: &Removal) -> Allocation<'_> {
        let prior: Decimal = match self.removals.iter().position(|r| r.id == removal.id) {
            Some(index) => self.removals[..index].iter().map(Removal::total_length).sum(),
            None => self
                .removals
                .iter()
                .filter(|r| r.created_at <= removal.created_at)
                .map(Removal::total_length)
                .sum(),
        };

        fifo::allocate(
            self.lots.iter().filter(|lot| lot.created_at <= removal.created_at),
            prior,
        )
    }

    /// Compare a material's cached aggregate with what the events imply
    pub fn reconcile(&self, material: &Material) -> Reconciliation {
        let derived_mm = self.derived_quantity_mm();
        let reconciliation = Reconciliation {
            cached_mm: material.aggregate_quantity_mm,
            derived_mm,
            drift_mm: material.aggregate_quantity_mm - derived_mm,
        };
        if !reconciliation.is_consistent() {
            tracing::warn!(
                material_id = %material.id,
                cached_mm = %reconciliation.cached_mm,
                derived_mm = %reconciliation.derived_mm,
                "Cached aggregate quantity disagrees with the event log"
            );
        }
        reconciliation
    }
}
