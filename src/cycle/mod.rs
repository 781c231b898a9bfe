//! Trading cycle orchestrator
//!
//! Runs the evaluate/execute/persist loop on a fixed cadence. Each cycle
//! reads fresh prices and signals, computes every instrument's decisions
//! up front, then applies fills to the in-memory ledgers and persists the
//! whole set once. A failure in one instrument never aborts the others;
//! an order timeout abandons that instrument's remaining mutations for
//! the cycle so the ledger never records an unconfirmed fill.

mod breaker;

pub use breaker::{HaltReason, LossStreakMonitor};

use crate::broker::{
    FeeSchedule, MarketConditionSource, MarketData, NotificationSink, OrderExecutor, TradeEvent,
    Valuation,
};
use crate::budget::BudgetController;
use crate::config::Config;
use crate::engine::{
    discount_rate, size_for_stage, validate_sequential_entry, EntryGate, StageDecision, StageGate,
};
use crate::ledger::{InstrumentLedger, LedgerStore, SellReason, StoreError};
use crate::market::MarketConditionSnapshot;
use crate::telemetry::{self, CounterMetric, GaugeMetric};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// External collaborators wired into the loop
#[derive(Clone)]
pub struct Collaborators {
    pub market_data: Arc<dyn MarketData>,
    pub valuation: Arc<dyn Valuation>,
    pub conditions: Arc<dyn MarketConditionSource>,
    pub executor: Arc<dyn OrderExecutor>,
    pub notifier: Arc<dyn NotificationSink>,
}

/// What one cycle did
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub evaluated: usize,
    pub buys: usize,
    pub sells: usize,
    pub skipped: usize,
    /// Set when a circuit breaker suppressed new entries
    pub halted: Option<HaltReason>,
    /// False when the save failed; state is retried next cycle
    pub persisted: bool,
}

/// Planned buy for one instrument, sized and gated during evaluation
struct PlannedBuy {
    stage_number: u8,
    quantity: u64,
}

/// Everything decided for one instrument before any order goes out
struct InstrumentPlan {
    code: String,
    price: Decimal,
    sells: Vec<StageDecision>,
    drop_requirement: Option<(u8, Decimal)>,
    buy: Option<PlannedBuy>,
}

pub struct Orchestrator {
    config: Config,
    store: LedgerStore,
    ledgers: HashMap<String, InstrumentLedger>,
    budget: BudgetController,
    streak: LossStreakMonitor,
    fees: FeeSchedule,
    deps: Collaborators,
}

impl Orchestrator {
    /// Load persisted ledgers and assemble the loop state
    pub fn new(config: Config, deps: Collaborators) -> Result<Self, StoreError> {
        let store = LedgerStore::new(&config.ledger);
        let ledgers = store.load(&config.instruments)?;
        let budget = BudgetController::new(config.budget.clone());
        let fees = FeeSchedule::from_config(&config.fees);
        Ok(Self {
            config,
            store,
            ledgers,
            budget,
            streak: LossStreakMonitor::new(),
            fees,
            deps,
        })
    }

    pub fn ledger(&self, code: &str) -> Option<&InstrumentLedger> {
        self.ledgers.get(code)
    }

    pub fn budget(&self) -> &BudgetController {
        &self.budget
    }

    /// Capital tied up across every instrument, at entry prices
    fn total_exposure(&self) -> Decimal {
        self.ledgers.values().map(InstrumentLedger::total_exposure).sum()
    }

    fn total_open_stages(&self) -> usize {
        self.ledgers.values().map(InstrumentLedger::open_stage_count).sum()
    }

    /// Run the loop until the process is stopped
    ///
    /// Cycles never overlap; a slow save simply delays the next tick.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.cycle.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match self.run_cycle(Utc::now()).await {
                Ok(report) => tracing::info!(?report, "cycle complete"),
                Err(err) => tracing::error!(%err, "cycle failed"),
            }
        }
    }

    /// One full evaluate/execute/persist pass
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> anyhow::Result<CycleReport> {
        let mut report = CycleReport::default();

        match self.deps.market_data.is_market_open().await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("market closed, skipping cycle");
                return Ok(report);
            }
            Err(err) => {
                tracing::warn!(%err, "session check failed, treating market as closed");
                return Ok(report);
            }
        }

        let market = match self.deps.conditions.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(%err, "market condition unavailable, assuming neutral");
                MarketConditionSnapshot::neutral(now)
            }
        };

        self.budget.observe_equity(
            now,
            self.config.budget.initial_budget + self.budget.realized_pnl,
        );
        self.streak.roll_session(now.date_naive(), self.budget.realized_pnl);

        report.halted = self.streak.should_halt(&market, &self.config.cycle);
        if let Some(reason) = &report.halted {
            tracing::warn!(?reason, "circuit breaker tripped, entries suppressed");
            self.deps.notifier.notify(&TradeEvent::EntriesSuppressed {
                reason: format!("{reason:?}"),
            });
        }

        let plans = self.evaluate_instruments(now, &market, &mut report).await;
        self.execute_plans(plans, now, &mut report).await;

        match self.store.save(&self.ledgers) {
            Ok(()) => report.persisted = true,
            Err(err) => {
                tracing::error!(%err, "ledger save failed, retrying next cycle");
            }
        }

        telemetry::increment(CounterMetric::Cycles);
        telemetry::set_gauge(
            GaugeMetric::RealizedPnl,
            self.budget.realized_pnl.to_f64().unwrap_or(0.0),
        );
        telemetry::set_gauge(
            GaugeMetric::TotalExposure,
            self.total_exposure().to_f64().unwrap_or(0.0),
        );
        telemetry::set_gauge(GaugeMetric::OpenStages, self.total_open_stages() as f64);
        telemetry::set_gauge(
            GaugeMetric::EffectiveBudget,
            self.budget.effective_budget().to_f64().unwrap_or(0.0),
        );

        self.deps.notifier.notify(&TradeEvent::CycleCompleted {
            evaluated: report.evaluated,
            buys: report.buys,
            sells: report.sells,
            skipped: report.skipped,
        });
        Ok(report)
    }

    /// Compute every instrument's decisions against one consistent snapshot
    ///
    /// No ledger is mutated here. Planned buys reserve allocation headroom
    /// so instruments evaluated later cannot overspend the cap.
    async fn evaluate_instruments(
        &self,
        now: DateTime<Utc>,
        market: &MarketConditionSnapshot,
        report: &mut CycleReport,
    ) -> Vec<InstrumentPlan> {
        let mut allowance = self.budget.allowed_new_allocation(self.total_exposure());
        let mut plans = Vec::with_capacity(self.config.instruments.len());

        for inst in &self.config.instruments {
            report.evaluated += 1;
            let Some(ledger) = self.ledgers.get(&inst.code) else {
                continue;
            };

            let price = match self.deps.market_data.current_price(&inst.code).await {
                Ok(price) => price,
                Err(err) => {
                    tracing::warn!(code = %inst.code, %err, "no price, skipping instrument");
                    self.skip(&inst.code, &err.to_string(), report);
                    continue;
                }
            };
            if price <= Decimal::ZERO {
                tracing::warn!(code = %inst.code, %price, "non-positive price, skipping instrument");
                self.skip(&inst.code, "non-positive price", report);
                continue;
            }
            let signal = match self.deps.valuation.fair_value_signal(&inst.code).await {
                Ok(signal) => signal,
                Err(err) => {
                    tracing::warn!(code = %inst.code, %err, "no signal, skipping instrument");
                    self.skip(&inst.code, &err.to_string(), report);
                    continue;
                }
            };

            let sells: Vec<StageDecision> =
                crate::engine::decide(ledger, price, signal.fair_value, market, inst, &self.config.exit)
                    .into_iter()
                    .filter(StageDecision::is_sell)
                    .collect();

            let mut plan = InstrumentPlan {
                code: inst.code.clone(),
                price,
                sells,
                drop_requirement: None,
                buy: None,
            };

            if report.halted.is_none() {
                let max = self.config.ledger.max_stages as u8;
                if let Some(next) = (1..=max).find(|n| !ledger.is_stage_open(*n)) {
                    let gate = validate_sequential_entry(
                        ledger,
                        next,
                        price,
                        market.trend,
                        &self.config.entry,
                    );
                    match gate {
                        EntryGate::Allowed { required_drop } => {
                            plan.drop_requirement = Some((next, required_drop));
                            let stage_gate = StageGate {
                                stage_number: next,
                                reentry_allowed: ledger.is_reentry_allowed(
                                    next,
                                    now,
                                    price,
                                    chrono::Duration::hours(self.config.entry.cooldown_hours),
                                    self.config.entry.min_pullback,
                                ),
                                previous_stage_open: next == 1 || ledger.is_stage_open(next - 1),
                            };
                            let discount = discount_rate(signal.fair_value, price);
                            let amount = size_for_stage(
                                &self.config.sizing.bands,
                                discount,
                                allowance,
                                &stage_gate,
                            );
                            let quantity =
                                (amount / price).floor().to_u64().unwrap_or(0);
                            if quantity >= 1 {
                                allowance -= price * Decimal::from(quantity);
                                plan.buy = Some(PlannedBuy {
                                    stage_number: next,
                                    quantity,
                                });
                            }
                        }
                        EntryGate::DropShortfall { required, .. } => {
                            plan.drop_requirement = Some((next, required));
                        }
                        EntryGate::PreviousStageClosed => {}
                    }
                }
            }

            plans.push(plan);
        }
        plans
    }

    /// Place orders and apply confirmed fills to the in-memory ledgers
    async fn execute_plans(
        &mut self,
        plans: Vec<InstrumentPlan>,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        let timeout = Duration::from_secs(self.config.cycle.order_timeout_secs);

        'instruments: for plan in plans {
            let Some(ledger) = self.ledgers.get_mut(&plan.code) else {
                continue;
            };
            ledger.update_max_profit(plan.price);
            if let Some((number, requirement)) = plan.drop_requirement {
                ledger.set_drop_requirement(number, requirement);
            }

            let mut sold = false;
            for decision in &plan.sells {
                let order = tokio::time::timeout(
                    timeout,
                    self.deps
                        .executor
                        .place_sell(&plan.code, plan.price, decision.quantity),
                )
                .await;
                match order {
                    Ok(Ok(order_id)) => {
                        let entry_price = ledger
                            .stage(decision.stage_number)
                            .map(|s| s.entry_price)
                            .unwrap_or_default();
                        // Commission on both sides plus the sell tax, all
                        // charged against this sell's proceeds
                        let fees = self.fees.fees(entry_price, decision.quantity, true)
                            + self.fees.fees(plan.price, decision.quantity, false);
                        let reason = decision.reason.unwrap_or(SellReason::ProfitTarget);
                        match ledger.close_stage_partial(
                            decision.stage_number,
                            decision.quantity,
                            plan.price,
                            now,
                            reason,
                            fees,
                        ) {
                            Ok(realized) => {
                                sold = true;
                                self.budget.add_realized_pnl(realized);
                                report.sells += 1;
                                telemetry::increment(CounterMetric::StagesSold);
                                tracing::info!(
                                    code = %plan.code,
                                    %order_id,
                                    stage = decision.stage_number,
                                    quantity = decision.quantity,
                                    %realized,
                                    "stage sold"
                                );
                                self.deps.notifier.notify(&TradeEvent::StageSold {
                                    code: plan.code.clone(),
                                    stage_number: decision.stage_number,
                                    price: plan.price,
                                    quantity: decision.quantity,
                                    realized_pnl: realized,
                                    reason,
                                });
                            }
                            Err(err) => {
                                tracing::error!(code = %plan.code, %err, "fill contradicts ledger, isolating instrument");
                                self.skip(&plan.code, &err.to_string(), report);
                                continue 'instruments;
                            }
                        }
                    }
                    Ok(Err(err)) => {
                        // Order-level failure: this stage stays untouched,
                        // the instrument's other orders still run
                        tracing::warn!(code = %plan.code, %err, "sell order failed, ledger unchanged");
                    }
                    Err(_) => {
                        tracing::warn!(code = %plan.code, "sell order timed out, abandoning instrument this cycle");
                        self.skip(&plan.code, "order timeout", report);
                        continue 'instruments;
                    }
                }
            }

            if sold {
                // The entry was sized against pre-sell state; its slot and
                // premise are stale now, so it waits for the next cycle
                if plan.buy.is_some() {
                    tracing::debug!(code = %plan.code, "entry dropped after same-cycle sell");
                }
                continue;
            }

            if let Some(buy) = &plan.buy {
                let order = tokio::time::timeout(
                    timeout,
                    self.deps
                        .executor
                        .place_buy(&plan.code, plan.price, buy.quantity),
                )
                .await;
                match order {
                    Ok(Ok(order_id)) => match ledger.open_stage(plan.price, buy.quantity, now) {
                        Ok(stage_number) => {
                            // Without a prior sell this cycle the ledger is
                            // unchanged since planning, so the slot matches
                            debug_assert_eq!(stage_number, buy.stage_number);
                            report.buys += 1;
                            telemetry::increment(CounterMetric::StagesOpened);
                            tracing::info!(
                                code = %plan.code,
                                %order_id,
                                stage = stage_number,
                                quantity = buy.quantity,
                                price = %plan.price,
                                "stage opened"
                            );
                            self.deps.notifier.notify(&TradeEvent::StageOpened {
                                code: plan.code.clone(),
                                stage_number,
                                price: plan.price,
                                quantity: buy.quantity,
                            });
                        }
                        Err(err) => {
                            tracing::error!(code = %plan.code, %err, "fill contradicts ledger, isolating instrument");
                            self.skip(&plan.code, &err.to_string(), report);
                        }
                    },
                    Ok(Err(err)) => {
                        tracing::warn!(code = %plan.code, %err, "buy order failed, ledger unchanged");
                    }
                    Err(_) => {
                        tracing::warn!(code = %plan.code, "buy order timed out, ledger unchanged");
                        self.skip(&plan.code, "order timeout", report);
                    }
                }
            }
        }
    }

    fn skip(&self, code: &str, reason: &str, report: &mut CycleReport) {
        report.skipped += 1;
        telemetry::increment(CounterMetric::InstrumentsSkipped);
        self.deps.notifier.notify(&TradeEvent::InstrumentSkipped {
            code: code.to_string(),
            reason: reason.to_string(),
        });
    }
}
