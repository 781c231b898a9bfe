//! External collaborator interfaces
//!
//! Narrow contracts for price data, valuation signals, order execution, and
//! notifications. The core treats every implementation as point-in-time
//! truth for the cycle and never fabricates a price or signal on failure.

mod fees;
mod paper;

pub use fees::FeeSchedule;
pub use paper::PaperBroker;

use crate::ledger::SellReason;
use crate::market::MarketConditionSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Order identifier
pub type OrderId = Uuid;

/// Collaborator failures
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Data source cannot answer right now
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// Operation exceeded its deadline
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// Order was rejected by the venue
    #[error("order rejected: {0}")]
    OrderRejected(String),
}

/// Externally computed fair value for an instrument
#[derive(Debug, Clone, Copy)]
pub struct FairValueSignal {
    pub fair_value: Decimal,
    /// Signal confidence in [0, 1]
    pub confidence: Decimal,
    /// Upstream computation time, trusted as-is when present
    pub as_of: Option<DateTime<Utc>>,
}

/// Price, balance, and session state
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn current_price(&self, code: &str) -> Result<Decimal, BrokerError>;
    async fn owned_quantity(&self, code: &str) -> Result<u64, BrokerError>;
    async fn is_market_open(&self) -> Result<bool, BrokerError>;
}

/// Valuation signal source
#[async_trait]
pub trait Valuation: Send + Sync {
    async fn fair_value_signal(&self, code: &str) -> Result<FairValueSignal, BrokerError>;
}

/// Per-cycle market condition snapshot source
#[async_trait]
pub trait MarketConditionSource: Send + Sync {
    async fn snapshot(&self) -> Result<MarketConditionSnapshot, BrokerError>;
}

/// Order placement
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn place_buy(
        &self,
        code: &str,
        price: Decimal,
        quantity: u64,
    ) -> Result<OrderId, BrokerError>;

    async fn place_sell(
        &self,
        code: &str,
        price: Decimal,
        quantity: u64,
    ) -> Result<OrderId, BrokerError>;
}

/// Events pushed to the notification sink; rendering is the sink's problem
#[derive(Debug, Clone)]
pub enum TradeEvent {
    StageOpened {
        code: String,
        stage_number: u8,
        price: Decimal,
        quantity: u64,
    },
    StageSold {
        code: String,
        stage_number: u8,
        price: Decimal,
        quantity: u64,
        realized_pnl: Decimal,
        reason: SellReason,
    },
    EntriesSuppressed {
        reason: String,
    },
    InstrumentSkipped {
        code: String,
        reason: String,
    },
    CycleCompleted {
        evaluated: usize,
        buys: usize,
        sells: usize,
        skipped: usize,
    },
}

/// Fire-and-forget notification delivery; failures never block the loop
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &TradeEvent);
}

/// Sink that only logs, for headless runs
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, event: &TradeEvent) {
        tracing::info!(?event, "trade event");
    }
}
