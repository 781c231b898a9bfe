//! Exit and risk decisions
//!
//! Pure per-stage decision function. Open stages are evaluated from the
//! lowest entry price upward so the least-profitable exposure is reduced
//! first. Within a stage the first matching rule wins:
//! overvalued full sell, then stop loss, then profit-target partial sell.
//! Portfolio-wide circuit breakers live in the orchestrator, not here.

use crate::config::{ExitConfig, InstrumentConfig};
use crate::engine::sizing::discount_rate;
use crate::ledger::{InstrumentLedger, SellReason, StageEntry};
use crate::market::{MarketConditionSnapshot, MarketTrend};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// What to do with one stage this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction {
    Hold,
    PartialSell,
    StopLoss,
    FullSell,
}

/// Decision for a single open stage
#[derive(Debug, Clone, Copy)]
pub struct StageDecision {
    pub stage_number: u8,
    pub action: ExitAction,
    pub quantity: u64,
    pub reason: Option<SellReason>,
}

impl StageDecision {
    fn hold(stage_number: u8) -> Self {
        Self {
            stage_number,
            action: ExitAction::Hold,
            quantity: 0,
            reason: None,
        }
    }

    pub fn is_sell(&self) -> bool {
        self.action != ExitAction::Hold
    }
}

/// Decide every open stage, lowest entry price first
pub fn decide(
    ledger: &InstrumentLedger,
    current_price: Decimal,
    fair_value: Decimal,
    market: &MarketConditionSnapshot,
    instrument: &InstrumentConfig,
    config: &ExitConfig,
) -> Vec<StageDecision> {
    let mut stages: Vec<&StageEntry> = ledger.open_stages().collect();
    stages.sort_by(|a, b| a.entry_price.cmp(&b.entry_price));
    stages
        .iter()
        .map(|stage| decide_stage(stage, current_price, fair_value, market, instrument, config))
        .collect()
}

/// First-match-wins decision for one open stage
pub fn decide_stage(
    stage: &StageEntry,
    current_price: Decimal,
    fair_value: Decimal,
    market: &MarketConditionSnapshot,
    instrument: &InstrumentConfig,
    config: &ExitConfig,
) -> StageDecision {
    // 1. Price materially above fair value: clear out the whole stage
    let discount = discount_rate(fair_value, current_price);
    if fair_value > Decimal::ZERO && discount <= -config.overvalued_threshold {
        return StageDecision {
            stage_number: stage.number,
            action: ExitAction::FullSell,
            quantity: stage.remaining_quantity,
            reason: Some(SellReason::OvervaluedSell),
        };
    }

    // 2. Stop loss: never deferred, ignores cooldown state entirely
    let ret = stage.unrealized_return(current_price);
    if ret <= -config.stop_loss_threshold {
        return StageDecision {
            stage_number: stage.number,
            action: ExitAction::StopLoss,
            quantity: stage.remaining_quantity,
            reason: Some(SellReason::StopLoss),
        };
    }

    // 3. Profit target: partial sell, dampened in a strong uptrend so a
    //    trending winner is not exited prematurely
    if ret >= instrument.profit_target {
        let mut ratio = instrument.partial_sell_ratio;
        if market.trend == MarketTrend::StrongUptrend && instrument.high_profit_sell_reduction {
            ratio *= config.uptrend_dampening;
        }
        let quantity = partial_quantity(stage.remaining_quantity, ratio);
        return StageDecision {
            stage_number: stage.number,
            action: ExitAction::PartialSell,
            quantity,
            reason: Some(SellReason::ProfitTarget),
        };
    }

    StageDecision::hold(stage.number)
}

/// Whole-share sell quantity for a ratio, at least 1 and at most remaining
fn partial_quantity(remaining: u64, ratio: Decimal) -> u64 {
    let quantity = (Decimal::from(remaining) * ratio)
        .floor()
        .to_u64()
        .unwrap_or(0);
    quantity.clamp(1, remaining)
}
