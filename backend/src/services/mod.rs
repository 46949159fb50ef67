//! Business logic services for the stock ledger server

pub mod ledger;
pub mod reorder;

pub use self::ledger::LedgerService;
pub use reorder::ReorderService;
