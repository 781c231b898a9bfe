//! Budget controller
//!
//! Tracks available capital, rescales it from trailing performance through
//! a banded step function, and enforces the portfolio exposure cap and
//! minimum cash reserve. Sole mutator of budget state; the sizing engine
//! only reads the numbers produced here.

use crate::config::{BudgetConfig, PerformanceBand};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Trailing equity observations over a configurable horizon
#[derive(Debug, Clone)]
pub struct PerformanceWindow {
    horizon: Duration,
    samples: VecDeque<(DateTime<Utc>, Decimal)>,
}

impl PerformanceWindow {
    pub fn new(horizon_days: u32) -> Self {
        Self {
            horizon: Duration::days(horizon_days as i64),
            samples: VecDeque::new(),
        }
    }

    /// Record an equity observation and drop samples past the horizon
    pub fn observe(&mut self, at: DateTime<Utc>, equity: Decimal) {
        self.samples.push_back((at, equity));
        while let Some((oldest, _)) = self.samples.front() {
            // Keep one sample beyond the horizon as the return baseline
            if self.samples.len() > 1
                && self
                    .samples
                    .get(1)
                    .is_some_and(|(next, _)| at - *next >= self.horizon)
                && at - *oldest >= self.horizon
            {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Trailing fractional return over the window, zero until enough history
    pub fn trailing_return(&self) -> Decimal {
        let (Some((_, first)), Some((_, last))) = (self.samples.front(), self.samples.back())
        else {
            return Decimal::ZERO;
        };
        if first.is_zero() || self.samples.len() < 2 {
            return Decimal::ZERO;
        }
        (last - first) / first
    }
}

/// Effective budget for a trailing return, via the banded step function
///
/// Bands are validated monotone at config load; the first matching band
/// wins, and performance below every band gets the floor multiplier.
pub fn rescale(
    initial_budget: Decimal,
    trailing_return: Decimal,
    bands: &[PerformanceBand],
    floor_multiplier: Decimal,
) -> Decimal {
    let multiplier = bands
        .iter()
        .find(|band| trailing_return >= band.min_return)
        .map(|band| band.multiplier)
        .unwrap_or(floor_multiplier);
    initial_budget * multiplier
}

/// Allocation headroom under the exposure cap and cash reserve
///
/// Aggregate exposure must stay under `max_exposure` of effective budget,
/// and allocations must never eat into the minimum cash fraction.
pub fn enforce_exposure_cap(
    effective_budget: Decimal,
    current_exposure: Decimal,
    max_exposure: Decimal,
    min_cash_reserve: Decimal,
) -> Decimal {
    let exposure_headroom = effective_budget * max_exposure - current_exposure;
    let cash_headroom = effective_budget * (Decimal::ONE - min_cash_reserve) - current_exposure;
    exposure_headroom.min(cash_headroom).max(Decimal::ZERO)
}

/// Process-wide budget state, mutated only here
pub struct BudgetController {
    config: BudgetConfig,
    window: PerformanceWindow,
    /// Cumulative realized P&L across the session
    pub realized_pnl: Decimal,
}

impl BudgetController {
    pub fn new(config: BudgetConfig) -> Self {
        let window = PerformanceWindow::new(config.performance_window_days);
        Self {
            config,
            window,
            realized_pnl: Decimal::ZERO,
        }
    }

    /// Fold a cycle's realized P&L into the session total
    pub fn add_realized_pnl(&mut self, pnl: Decimal) {
        self.realized_pnl += pnl;
    }

    /// Record the current equity for the trailing window
    pub fn observe_equity(&mut self, at: DateTime<Utc>, equity: Decimal) {
        self.window.observe(at, equity);
    }

    /// Budget after performance rescaling
    pub fn effective_budget(&self) -> Decimal {
        rescale(
            self.config.initial_budget,
            self.window.trailing_return(),
            &self.config.performance_bands,
            self.config.floor_multiplier,
        )
    }

    /// Cap on new allocation given aggregate exposure across instruments
    pub fn allowed_new_allocation(&self, current_exposure: Decimal) -> Decimal {
        enforce_exposure_cap(
            self.effective_budget(),
            current_exposure,
            self.config.max_exposure,
            self.config.min_cash_reserve,
        )
    }
}
