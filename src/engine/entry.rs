//! Sequential entry validation
//!
//! Stages beyond the first must not skip slots and must wait for the price
//! to fall from the previous stage's entry by a dynamic drop requirement.
//! The requirement starts from a per-stage base and is adjusted for the
//! market trend, clamped to a configured multiple of the base.

use crate::config::EntryConfig;
use crate::ledger::InstrumentLedger;
use crate::market::MarketTrend;
use rust_decimal::Decimal;

/// Fallback base drop for stages past the configured table
const DEFAULT_BASE_DROP: Decimal = Decimal::from_parts(6, 0, 0, false, 2); // 0.06

/// Outcome of the sequential entry gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryGate {
    /// Entry permitted; carries the drop requirement that was met
    Allowed { required_drop: Decimal },
    /// The previous stage slot is not open; stages are never skipped
    PreviousStageClosed,
    /// Price has not fallen far enough from the previous stage's entry
    DropShortfall {
        actual: Decimal,
        required: Decimal,
    },
}

impl EntryGate {
    pub fn is_allowed(&self) -> bool {
        matches!(self, EntryGate::Allowed { .. })
    }
}

/// Dynamic drop requirement for a stage under the given market trend
pub fn required_drop(stage_number: u8, trend: MarketTrend, config: &EntryConfig) -> Decimal {
    let base = base_drop(stage_number, config);
    let mut adjusted = base;
    if trend.is_downtrend() {
        adjusted += config.downtrend_bonus;
    } else if trend.is_uptrend() {
        adjusted += config.uptrend_penalty;
    }
    let floor = base * config.clamp_min_factor;
    let ceiling = base * config.clamp_max_factor;
    adjusted.clamp(floor, ceiling)
}

fn base_drop(stage_number: u8, config: &EntryConfig) -> Decimal {
    if stage_number < 2 {
        return Decimal::ZERO;
    }
    config
        .base_drops
        .get(stage_number as usize - 2)
        .copied()
        .unwrap_or(DEFAULT_BASE_DROP)
}

/// Sequential gate for opening `stage_number` at `current_price`
///
/// Stage 1 always passes. Later stages require the previous slot open and
/// the price down from its entry by at least the dynamic requirement.
pub fn validate_sequential_entry(
    ledger: &InstrumentLedger,
    stage_number: u8,
    current_price: Decimal,
    trend: MarketTrend,
    config: &EntryConfig,
) -> EntryGate {
    if stage_number <= 1 {
        return EntryGate::Allowed {
            required_drop: Decimal::ZERO,
        };
    }

    let Some(prev) = ledger.stage(stage_number - 1).filter(|s| s.is_open) else {
        return EntryGate::PreviousStageClosed;
    };

    let required = required_drop(stage_number, trend, config);
    let actual = if prev.entry_price.is_zero() {
        Decimal::ZERO
    } else {
        (prev.entry_price - current_price) / prev.entry_price
    };

    if actual < required {
        EntryGate::DropShortfall { actual, required }
    } else {
        EntryGate::Allowed {
            required_drop: required,
        }
    }
}
