//! Ledger error types

use thiserror::Error;

/// Invariant violations inside a single instrument's ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Every stage slot is occupied by an open stage
    #[error("all {0} stage slots are open")]
    CapacityExceeded(usize),
    /// Requested sell quantity exceeds the stage's remaining quantity
    #[error("stage {number}: requested {requested} exceeds remaining {remaining}")]
    InsufficientQuantity {
        number: u8,
        requested: u64,
        remaining: u64,
    },
    /// No open stage with this number
    #[error("no open stage numbered {0}")]
    UnknownStage(u8),
    /// Zero quantity is never a valid trade
    #[error("quantity must be positive")]
    InvalidQuantity,
}

/// Structural problems found when validating a ledger document
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("stage {number}: remaining {remaining} exceeds entry quantity {entry}")]
    QuantityExceedsEntry {
        number: u8,
        remaining: u64,
        entry: u64,
    },
    #[error("stage {0}: open stage with zero remaining quantity")]
    OpenStageEmpty(u8),
    #[error("stage {0}: closed stage still holds quantity")]
    ClosedStageHoldsQuantity(u8),
    #[error("duplicate stage number {0}")]
    DuplicateStage(u8),
    #[error("stage number {number} outside 1..={max}")]
    StageOutOfRange { number: u8, max: usize },
    #[error("stage {0}: entry price must be positive")]
    NonPositivePrice(u8),
    #[error("cooldown recorded for stage number {number} outside 1..={max}")]
    CooldownOutOfRange { number: u8, max: usize },
}

/// Durable store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// A persisted document (and every backup of it) fails validation
    #[error("corrupt ledger document for {code}: {reason}")]
    CorruptState { code: String, reason: String },
    /// I/O failure on the write path; prior durable state is untouched
    #[error("i/o failure while persisting ledgers: {0}")]
    Io(#[from] std::io::Error),
    /// A freshly written temporary document failed re-parse or validation
    #[error("document for {code} failed revalidation before commit: {reason}")]
    Revalidation { code: String, reason: String },
}
