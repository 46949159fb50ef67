//! HTTP request handlers

pub mod health;
pub mod ledger;
pub mod reorder;

pub use health::*;
pub use self::ledger::*;
pub use reorder::*;
