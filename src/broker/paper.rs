//! Paper broker
//!
//! In-memory implementation of every collaborator trait, used for paper
//! trading mode and tests. Prices, signals, and the market condition are
//! set by the caller; orders fill immediately unless told otherwise.

use super::{
    BrokerError, FairValueSignal, MarketConditionSource, MarketData, OrderExecutor, OrderId,
    Valuation,
};
use crate::market::{MarketConditionSnapshot, MarketTrend};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A recorded paper order
#[derive(Debug, Clone)]
pub struct PaperOrder {
    pub id: OrderId,
    pub code: String,
    pub price: Decimal,
    pub quantity: u64,
    pub is_buy: bool,
}

#[derive(Default)]
struct PaperState {
    prices: HashMap<String, Decimal>,
    fair_values: HashMap<String, FairValueSignal>,
    owned: HashMap<String, u64>,
    market_open: bool,
    trend: Option<MarketTrend>,
    index_change: Decimal,
    orders: Vec<PaperOrder>,
    reject_codes: HashSet<String>,
    stall_codes: HashSet<String>,
}

/// Simulated brokerage backed by caller-provided state
#[derive(Clone)]
pub struct PaperBroker {
    state: Arc<RwLock<PaperState>>,
}

impl PaperBroker {
    pub fn new() -> Self {
        let state = PaperState {
            market_open: true,
            ..Default::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub async fn set_price(&self, code: &str, price: Decimal) {
        self.state.write().await.prices.insert(code.to_string(), price);
    }

    pub async fn set_fair_value(&self, code: &str, fair_value: Decimal) {
        self.state.write().await.fair_values.insert(
            code.to_string(),
            FairValueSignal {
                fair_value,
                confidence: Decimal::ONE,
                as_of: Some(Utc::now()),
            },
        );
    }

    pub async fn set_owned(&self, code: &str, quantity: u64) {
        self.state.write().await.owned.insert(code.to_string(), quantity);
    }

    pub async fn set_market_open(&self, open: bool) {
        self.state.write().await.market_open = open;
    }

    pub async fn set_trend(&self, trend: MarketTrend, index_change: Decimal) {
        let mut state = self.state.write().await;
        state.trend = Some(trend);
        state.index_change = index_change;
    }

    /// Make order placement for a code fail with `OrderRejected`
    pub async fn reject_orders_for(&self, code: &str) {
        self.state.write().await.reject_codes.insert(code.to_string());
    }

    /// Make order placement for a code hang until cancelled, to exercise
    /// the orchestrator's timeout path
    pub async fn stall_orders_for(&self, code: &str) {
        self.state.write().await.stall_codes.insert(code.to_string());
    }

    /// Orders placed so far
    pub async fn orders(&self) -> Vec<PaperOrder> {
        self.state.read().await.orders.clone()
    }

    async fn place(&self, code: &str, price: Decimal, quantity: u64, is_buy: bool) -> Result<OrderId, BrokerError> {
        {
            let state = self.state.read().await;
            if state.stall_codes.contains(code) {
                // Caller is expected to race this against a timeout
                std::future::pending::<()>().await;
            }
            if state.reject_codes.contains(code) {
                return Err(BrokerError::OrderRejected(format!(
                    "paper rejection for {code}"
                )));
            }
        }

        let id = OrderId::new_v4();
        let order = PaperOrder {
            id,
            code: code.to_string(),
            price,
            quantity,
            is_buy,
        };
        let mut state = self.state.write().await;
        match state.owned.entry(code.to_string()) {
            std::collections::hash_map::Entry::Occupied(mut held) => {
                let held = held.get_mut();
                if is_buy {
                    *held += quantity;
                } else {
                    *held = held.saturating_sub(quantity);
                }
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                if is_buy {
                    slot.insert(quantity);
                }
            }
        }
        state.orders.push(order);
        tracing::info!(%id, code, %price, quantity, is_buy, "paper order filled");
        Ok(id)
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketData for PaperBroker {
    async fn current_price(&self, code: &str) -> Result<Decimal, BrokerError> {
        self.state
            .read()
            .await
            .prices
            .get(code)
            .copied()
            .ok_or_else(|| BrokerError::Unavailable(format!("no price for {code}")))
    }

    async fn owned_quantity(&self, code: &str) -> Result<u64, BrokerError> {
        Ok(self.state.read().await.owned.get(code).copied().unwrap_or(0))
    }

    async fn is_market_open(&self) -> Result<bool, BrokerError> {
        Ok(self.state.read().await.market_open)
    }
}

#[async_trait]
impl Valuation for PaperBroker {
    async fn fair_value_signal(&self, code: &str) -> Result<FairValueSignal, BrokerError> {
        self.state
            .read()
            .await
            .fair_values
            .get(code)
            .copied()
            .ok_or_else(|| BrokerError::Unavailable(format!("no fair value for {code}")))
    }
}

#[async_trait]
impl MarketConditionSource for PaperBroker {
    async fn snapshot(&self) -> Result<MarketConditionSnapshot, BrokerError> {
        let state = self.state.read().await;
        let trend = state
            .trend
            .ok_or_else(|| BrokerError::Unavailable("no market condition set".to_string()))?;
        Ok(MarketConditionSnapshot {
            trend,
            index_change: state.index_change,
            as_of: Utc::now(),
        })
    }
}

#[async_trait]
impl OrderExecutor for PaperBroker {
    async fn place_buy(
        &self,
        code: &str,
        price: Decimal,
        quantity: u64,
    ) -> Result<OrderId, BrokerError> {
        self.place(code, price, quantity, true).await
    }

    async fn place_sell(
        &self,
        code: &str,
        price: Decimal,
        quantity: u64,
    ) -> Result<OrderId, BrokerError> {
        self.place(code, price, quantity, false).await
    }
}
