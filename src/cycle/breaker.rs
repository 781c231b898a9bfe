//! Portfolio-wide circuit breakers
//!
//! A tripped breaker suppresses new entries for the cycle; exits and
//! persistence continue normally. This is a recoverable mode switch, not a
//! shutdown.

use crate::config::CycleConfig;
use crate::market::MarketConditionSnapshot;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why new entries are suppressed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HaltReason {
    /// Broad market decline beyond the configured threshold
    MarketDecline(Decimal),
    /// Too many consecutive losing sessions
    ConsecutiveLossDays(u32),
}

/// Tracks realized P&L across session boundaries to detect loss streaks
pub struct LossStreakMonitor {
    session_date: Option<NaiveDate>,
    session_start_pnl: Decimal,
    /// Consecutive sessions that ended with negative realized P&L
    pub consecutive_loss_days: u32,
}

impl LossStreakMonitor {
    pub fn new() -> Self {
        Self {
            session_date: None,
            session_start_pnl: Decimal::ZERO,
            consecutive_loss_days: 0,
        }
    }

    /// Observe the running realized P&L at the start of a cycle
    ///
    /// On the first cycle of a new session the previous session's result is
    /// scored: a net loss extends the streak, anything else resets it.
    pub fn roll_session(&mut self, today: NaiveDate, realized_pnl: Decimal) {
        match self.session_date {
            None => {
                self.session_date = Some(today);
                self.session_start_pnl = realized_pnl;
            }
            Some(current) if current != today => {
                if realized_pnl < self.session_start_pnl {
                    self.consecutive_loss_days += 1;
                } else {
                    self.consecutive_loss_days = 0;
                }
                self.session_date = Some(today);
                self.session_start_pnl = realized_pnl;
            }
            Some(_) => {}
        }
    }

    /// Check whether new entries should be suppressed this cycle
    pub fn should_halt(
        &self,
        market: &MarketConditionSnapshot,
        config: &CycleConfig,
    ) -> Option<HaltReason> {
        if market.index_change <= -config.market_decline_threshold {
            return Some(HaltReason::MarketDecline(market.index_change));
        }
        if self.consecutive_loss_days >= config.max_consecutive_loss_days {
            return Some(HaltReason::ConsecutiveLossDays(self.consecutive_loss_days));
        }
        None
    }
}

impl Default for LossStreakMonitor {
    fn default() -> Self {
        Self::new()
    }
}
