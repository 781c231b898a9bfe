//! Decision engines
//!
//! Pure functions over ledger state and cycle inputs: stage sizing,
//! sequential entry validation, and exit/risk decisions

pub mod entry;
pub mod exit;
pub mod sizing;

pub use entry::{required_drop, validate_sequential_entry, EntryGate};
pub use exit::{decide, decide_stage, ExitAction, StageDecision};
pub use sizing::{discount_rate, size_for_stage, StageGate};
