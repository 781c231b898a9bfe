//! Market condition snapshot
//!
//! Produced fresh each cycle by an external collaborator and consumed
//! read-only by the sizing and exit engines. Never persisted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Broad market trend, derived upstream from index moving averages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketTrend {
    StrongUptrend,
    Uptrend,
    Neutral,
    Downtrend,
    StrongDowntrend,
}

impl MarketTrend {
    /// True for uptrend or strong uptrend
    pub fn is_uptrend(&self) -> bool {
        matches!(self, MarketTrend::Uptrend | MarketTrend::StrongUptrend)
    }

    /// True for downtrend or strong downtrend
    pub fn is_downtrend(&self) -> bool {
        matches!(self, MarketTrend::Downtrend | MarketTrend::StrongDowntrend)
    }
}

/// Point-in-time market state for one evaluation cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketConditionSnapshot {
    pub trend: MarketTrend,
    /// Index change over the session, as a fraction (-0.03 = down 3%)
    pub index_change: Decimal,
    pub as_of: DateTime<Utc>,
}

impl MarketConditionSnapshot {
    /// Neutral snapshot, used when the condition source is unavailable
    pub fn neutral(as_of: DateTime<Utc>) -> Self {
        Self {
            trend: MarketTrend::Neutral,
            index_change: Decimal::ZERO,
            as_of,
        }
    }
}
