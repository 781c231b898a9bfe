//! Position ledger and durable store
//!
//! Staged entries, partial sells, re-entry cooldowns, and crash-safe
//! persistence with backup rotation

mod position;
mod store;
mod types;

pub use position::{CooldownState, InstrumentLedger, SellReason, SellRecord, StageEntry};
pub use store::LedgerStore;
pub use types::{LedgerError, StoreError, ValidationError};
