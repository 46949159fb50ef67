//! Material stock ledger
//!
//! Tracks continuous-length raw material (bars, tubes, profiles) as purchased
//! lots, consumes them first-in-first-out on withdrawal, derives weight from
//! cross-section geometry and values any withdrawn length against the prices
//! of the lots it was drawn from.
//!
//! Everything in this crate is a pure function over a snapshot of the event
//! history supplied by the caller. Persistence lives in the embedding service.

pub mod error;
pub mod fifo;
pub mod geometry;
pub mod guard;
pub mod history;
pub mod models;
pub mod types;
pub mod valuation;

pub use error::*;
pub use fifo::*;
pub use geometry::*;
pub use guard::*;
pub use history::*;
pub use models::*;
pub use types::*;
pub use valuation::*;
