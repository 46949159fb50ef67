//! Ledger data model

mod event;
mod lot;
mod material;

pub use event::*;
pub use lot::*;
pub use material::*;
