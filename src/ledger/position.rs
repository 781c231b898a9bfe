//! Per-instrument position ledger
//!
//! Up to `max_stages` staged entries, each independently sized and
//! independently (partially) sold. The ledger is the in-memory authoritative
//! working copy during a cycle; the store persists it between cycles.

use super::types::{LedgerError, ValidationError};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why a stage (or part of one) was sold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellReason {
    /// Price materially above fair value
    OvervaluedSell,
    /// Loss threshold breached
    StopLoss,
    /// Profit target reached
    ProfitTarget,
}

/// One executed (partial) sell against a stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellRecord {
    pub at: DateTime<Utc>,
    pub quantity: u64,
    pub price: Decimal,
    pub realized_pnl: Decimal,
    /// Return against the stage entry price at the time of the sell
    pub return_pct: Decimal,
    pub reason: SellReason,
    /// High-water unrealized return the stage had reached before this sell
    #[serde(default)]
    pub max_profit_pct: Decimal,
}

/// One staged entry into a position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEntry {
    /// Stage slot number, 1-based
    pub number: u8,
    pub entry_price: Decimal,
    pub entry_quantity: u64,
    /// Quantity still held; partial sells reduce it
    pub remaining_quantity: u64,
    pub entry_time: DateTime<Utc>,
    pub is_open: bool,
    /// High-water unrealized return since entry
    #[serde(default)]
    pub max_profit_pct: Decimal,
    #[serde(default)]
    pub sell_history: Vec<SellRecord>,
}

impl StageEntry {
    fn new(number: u8, price: Decimal, quantity: u64, at: DateTime<Utc>) -> Self {
        Self {
            number,
            entry_price: price,
            entry_quantity: quantity,
            remaining_quantity: quantity,
            entry_time: at,
            is_open: true,
            max_profit_pct: Decimal::ZERO,
            sell_history: vec![],
        }
    }

    /// Fractional return of `current_price` against the entry price
    pub fn unrealized_return(&self, current_price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        (current_price - self.entry_price) / self.entry_price
    }

    /// Capital still tied up in this stage, at entry price
    pub fn exposure(&self) -> Decimal {
        self.entry_price * Decimal::from(self.remaining_quantity)
    }
}

/// Cooldown armed when a stage slot fully closes
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CooldownState {
    pub closed_at: DateTime<Utc>,
    pub close_price: Decimal,
}

/// Durable per-instrument ledger document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentLedger {
    pub code: String,
    pub name: String,
    pub sector: String,
    pub max_stages: usize,
    /// Stage entries ordered by number; a slot reused after a close gets a
    /// fresh entry, the previous run's sells live on in `realized_pnl`
    pub stages: Vec<StageEntry>,
    /// Re-entry cooldown per stage slot, keyed by stage number
    #[serde(default)]
    pub cooldowns: BTreeMap<u8, CooldownState>,
    /// Cumulative realized P&L across all stages and re-entries
    pub realized_pnl: Decimal,
    /// Last computed drop requirement per stage slot. Advisory only:
    /// recomputed every cycle from the same inputs, never authoritative.
    #[serde(default)]
    pub drop_requirements: BTreeMap<u8, Decimal>,
    pub updated_at: DateTime<Utc>,
}

impl InstrumentLedger {
    /// Fresh empty ledger for an instrument not yet on disk
    pub fn fresh(code: &str, name: &str, sector: &str, max_stages: usize) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            sector: sector.to_string(),
            max_stages,
            stages: vec![],
            cooldowns: BTreeMap::new(),
            realized_pnl: Decimal::ZERO,
            drop_requirements: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Stage entry by number, open or closed
    pub fn stage(&self, number: u8) -> Option<&StageEntry> {
        self.stages.iter().find(|s| s.number == number)
    }

    /// Open stages in slot order
    pub fn open_stages(&self) -> impl Iterator<Item = &StageEntry> {
        self.stages.iter().filter(|s| s.is_open)
    }

    pub fn open_stage_count(&self) -> usize {
        self.open_stages().count()
    }

    /// True when the numbered stage is open
    pub fn is_stage_open(&self, number: u8) -> bool {
        self.stage(number).is_some_and(|s| s.is_open)
    }

    /// Capital tied up across all open stages, at entry prices
    pub fn total_exposure(&self) -> Decimal {
        self.open_stages().map(StageEntry::exposure).sum()
    }

    /// Shares held across all open stages
    pub fn total_quantity(&self) -> u64 {
        self.open_stages().map(|s| s.remaining_quantity).sum()
    }

    /// Mark-to-market P&L across open stages
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        self.open_stages()
            .map(|s| (current_price - s.entry_price) * Decimal::from(s.remaining_quantity))
            .sum()
    }

    /// Open the lowest-numbered vacant stage slot
    ///
    /// Sequencing (stage N requires stage N-1 open) is the sizing engine's
    /// gate, not enforced here.
    pub fn open_stage(
        &mut self,
        price: Decimal,
        quantity: u64,
        at: DateTime<Utc>,
    ) -> Result<u8, LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::InvalidQuantity);
        }
        let number = (1..=self.max_stages as u8)
            .find(|n| !self.is_stage_open(*n))
            .ok_or(LedgerError::CapacityExceeded(self.max_stages))?;

        let entry = StageEntry::new(number, price, quantity, at);
        match self.stages.iter_mut().find(|s| s.number == number) {
            Some(slot) => *slot = entry,
            None => {
                self.stages.push(entry);
                self.stages.sort_by_key(|s| s.number);
            }
        }
        self.updated_at = at;
        Ok(number)
    }

    /// Sell part (or all) of an open stage
    ///
    /// Returns the realized P&L of this sell. Fees come from the external
    /// fee function and are charged against the proceeds. A stage whose
    /// remaining quantity reaches zero closes and arms its slot's cooldown.
    /// On any error the ledger is left unmutated.
    pub fn close_stage_partial(
        &mut self,
        number: u8,
        quantity: u64,
        price: Decimal,
        at: DateTime<Utc>,
        reason: SellReason,
        fees: Decimal,
    ) -> Result<Decimal, LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::InvalidQuantity);
        }
        let max_stages = self.max_stages;
        let stage = self
            .stages
            .iter_mut()
            .find(|s| s.number == number && s.is_open)
            .ok_or(LedgerError::UnknownStage(number))?;

        if quantity > stage.remaining_quantity {
            return Err(LedgerError::InsufficientQuantity {
                number,
                requested: quantity,
                remaining: stage.remaining_quantity,
            });
        }

        let realized = (price - stage.entry_price) * Decimal::from(quantity) - fees;
        let return_pct = if stage.entry_price.is_zero() {
            Decimal::ZERO
        } else {
            (price - stage.entry_price) / stage.entry_price
        };

        stage.remaining_quantity -= quantity;
        stage.sell_history.push(SellRecord {
            at,
            quantity,
            price,
            realized_pnl: realized,
            return_pct,
            reason,
            max_profit_pct: stage.max_profit_pct,
        });

        if stage.remaining_quantity == 0 {
            stage.is_open = false;
            stage.max_profit_pct = Decimal::ZERO;
            debug_assert!((number as usize) <= max_stages);
            self.cooldowns.insert(
                number,
                CooldownState {
                    closed_at: at,
                    close_price: price,
                },
            );
        }

        self.realized_pnl += realized;
        self.updated_at = at;
        Ok(realized)
    }

    /// May this stage slot re-enter?
    ///
    /// False while within the cooldown window since the slot's last close,
    /// or while price has not pulled back from the close price by at least
    /// `min_pullback`. A slot that never closed is always allowed.
    pub fn is_reentry_allowed(
        &self,
        number: u8,
        now: DateTime<Utc>,
        current_price: Decimal,
        cooldown: Duration,
        min_pullback: Decimal,
    ) -> bool {
        let Some(state) = self.cooldowns.get(&number) else {
            return true;
        };
        if now - state.closed_at < cooldown {
            return false;
        }
        if state.close_price.is_zero() {
            return true;
        }
        let pullback = (state.close_price - current_price) / state.close_price;
        pullback >= min_pullback
    }

    /// Advance per-stage high-water marks for the current price
    pub fn update_max_profit(&mut self, current_price: Decimal) {
        for stage in self.stages.iter_mut().filter(|s| s.is_open) {
            let ret = if stage.entry_price.is_zero() {
                Decimal::ZERO
            } else {
                (current_price - stage.entry_price) / stage.entry_price
            };
            if ret > stage.max_profit_pct {
                stage.max_profit_pct = ret;
            }
        }
    }

    /// Cache the cycle's computed drop requirement for a stage slot
    pub fn set_drop_requirement(&mut self, number: u8, requirement: Decimal) {
        self.drop_requirements.insert(number, requirement);
    }

    /// Structural invariants checked on every load and pre-commit reparse
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = std::collections::BTreeSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.number) {
                return Err(ValidationError::DuplicateStage(stage.number));
            }
            if stage.number == 0 || stage.number as usize > self.max_stages {
                return Err(ValidationError::StageOutOfRange {
                    number: stage.number,
                    max: self.max_stages,
                });
            }
            if stage.entry_price <= Decimal::ZERO {
                return Err(ValidationError::NonPositivePrice(stage.number));
            }
            if stage.remaining_quantity > stage.entry_quantity {
                return Err(ValidationError::QuantityExceedsEntry {
                    number: stage.number,
                    remaining: stage.remaining_quantity,
                    entry: stage.entry_quantity,
                });
            }
            if stage.is_open && stage.remaining_quantity == 0 {
                return Err(ValidationError::OpenStageEmpty(stage.number));
            }
            if !stage.is_open && stage.remaining_quantity != 0 {
                return Err(ValidationError::ClosedStageHoldsQuantity(stage.number));
            }
        }
        for number in self.cooldowns.keys() {
            if *number == 0 || *number as usize > self.max_stages {
                return Err(ValidationError::CooldownOutOfRange {
                    number: *number,
                    max: self.max_stages,
                });
            }
        }
        Ok(())
    }
}
