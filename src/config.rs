//! Configuration types for split-trader

use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Band table is empty
    #[error("{section}: band table must not be empty")]
    EmptyBands { section: &'static str },
    /// Band thresholds are not strictly decreasing
    #[error("{section}: band thresholds must be strictly decreasing")]
    UnorderedBands { section: &'static str },
    /// Band values break monotonicity
    #[error("{section}: band values must be monotone with their thresholds")]
    NonMonotoneBands { section: &'static str },
    /// A rate that must lie in [0, 1] does not
    #[error("{field} must be within [0, 1], got {value}")]
    RateOutOfRange { field: &'static str, value: Decimal },
    /// A multiplier that must be non-negative is not
    #[error("{field} must be non-negative, got {value}")]
    NegativeValue { field: &'static str, value: Decimal },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub instruments: Vec<InstrumentConfig>,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub entry: EntryConfig,
    #[serde(default)]
    pub exit: ExitConfig,
    pub budget: BudgetConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    pub telemetry: TelemetryConfig,
}

/// One tracked instrument
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentConfig {
    /// Instrument code (ledger document key)
    pub code: String,
    pub name: String,
    pub sector: String,

    /// Unrealized return that arms a partial sell (e.g. 0.06 = 6%)
    #[serde(default = "default_profit_target")]
    pub profit_target: Decimal,

    /// Fraction of remaining quantity sold on a profit-target hit
    #[serde(default = "default_partial_sell_ratio")]
    pub partial_sell_ratio: Decimal,

    /// Dampen the partial-sell ratio in a strong uptrend
    #[serde(default = "default_true")]
    pub high_profit_sell_reduction: bool,
}

fn default_profit_target() -> Decimal {
    Decimal::new(6, 2) // 0.06 = 6%
}
fn default_partial_sell_ratio() -> Decimal {
    Decimal::new(40, 2) // 0.40
}
fn default_true() -> bool {
    true
}

/// Ledger store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Directory holding one JSON document per instrument
    pub data_dir: PathBuf,

    /// Maximum stage slots per instrument
    #[serde(default = "default_max_stages")]
    pub max_stages: usize,

    /// Backups kept per instrument after a successful save
    #[serde(default = "default_backup_retention")]
    pub backup_retention: usize,
}

fn default_max_stages() -> usize {
    5
}
fn default_backup_retention() -> usize {
    5
}

/// One sizing band: at or above `min_discount`, allocate `budget_fraction`
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct SizingBand {
    pub min_discount: Decimal,
    pub budget_fraction: Decimal,
}

/// Sizing engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SizingConfig {
    /// Discount-rate bands, most favorable first. Allocation is 0 at or
    /// below 0% discount regardless of the table.
    #[serde(default = "default_sizing_bands")]
    pub bands: Vec<SizingBand>,
}

fn default_sizing_bands() -> Vec<SizingBand> {
    vec![
        SizingBand {
            min_discount: Decimal::new(50, 2),
            budget_fraction: Decimal::new(40, 2),
        },
        SizingBand {
            min_discount: Decimal::new(30, 2),
            budget_fraction: Decimal::new(25, 2),
        },
        SizingBand {
            min_discount: Decimal::new(10, 2),
            budget_fraction: Decimal::new(15, 2),
        },
        SizingBand {
            min_discount: Decimal::ZERO,
            budget_fraction: Decimal::new(5, 2),
        },
    ]
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            bands: default_sizing_bands(),
        }
    }
}

/// Entry gating configuration: re-entry cooldown and drop requirements
#[derive(Debug, Clone, Deserialize)]
pub struct EntryConfig {
    /// Base price-drop requirement from the previous stage's entry price,
    /// indexed by stage number minus two (stage 1 has no requirement)
    #[serde(default = "default_base_drops")]
    pub base_drops: Vec<Decimal>,

    /// Added to the base drop in a downtrend (negative loosens the gate)
    #[serde(default = "default_downtrend_bonus")]
    pub downtrend_bonus: Decimal,

    /// Added to the base drop in an uptrend
    #[serde(default = "default_uptrend_penalty")]
    pub uptrend_penalty: Decimal,

    /// Adjusted drop is clamped to [clamp_min_factor, clamp_max_factor] x base
    #[serde(default = "default_clamp_min_factor")]
    pub clamp_min_factor: Decimal,
    #[serde(default = "default_clamp_max_factor")]
    pub clamp_max_factor: Decimal,

    /// Minimum wait after closing a stage slot before it may re-enter
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: i64,

    /// Required pullback from the slot's last close price before re-entry
    #[serde(default = "default_min_pullback")]
    pub min_pullback: Decimal,
}

fn default_base_drops() -> Vec<Decimal> {
    vec![
        Decimal::new(3, 2), // stage 2: -3%
        Decimal::new(5, 2), // stage 3: -5%
        Decimal::new(6, 2), // stage 4: -6%
        Decimal::new(8, 2), // stage 5: -8%
    ]
}
fn default_downtrend_bonus() -> Decimal {
    Decimal::new(-15, 3) // -1.5%p
}
fn default_uptrend_penalty() -> Decimal {
    Decimal::new(10, 3) // +1.0%p
}
fn default_clamp_min_factor() -> Decimal {
    Decimal::new(3, 1) // 0.3x base
}
fn default_clamp_max_factor() -> Decimal {
    Decimal::new(20, 1) // 2.0x base
}
fn default_cooldown_hours() -> i64 {
    24
}
fn default_min_pullback() -> Decimal {
    Decimal::new(2, 2) // 2%
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            base_drops: default_base_drops(),
            downtrend_bonus: default_downtrend_bonus(),
            uptrend_penalty: default_uptrend_penalty(),
            clamp_min_factor: default_clamp_min_factor(),
            clamp_max_factor: default_clamp_max_factor(),
            cooldown_hours: default_cooldown_hours(),
            min_pullback: default_min_pullback(),
        }
    }
}

/// Exit engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExitConfig {
    /// Full sell when discount rate <= -overvalued_threshold
    #[serde(default = "default_overvalued_threshold")]
    pub overvalued_threshold: Decimal,

    /// Stop loss when return <= -stop_loss_threshold
    #[serde(default = "default_stop_loss_threshold")]
    pub stop_loss_threshold: Decimal,

    /// Multiplier applied to the partial-sell ratio in a strong uptrend
    #[serde(default = "default_uptrend_dampening")]
    pub uptrend_dampening: Decimal,
}

fn default_overvalued_threshold() -> Decimal {
    Decimal::new(10, 2) // 0.10
}
fn default_stop_loss_threshold() -> Decimal {
    Decimal::new(20, 2) // 0.20
}
fn default_uptrend_dampening() -> Decimal {
    Decimal::new(50, 2) // 0.50
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            overvalued_threshold: default_overvalued_threshold(),
            stop_loss_threshold: default_stop_loss_threshold(),
            uptrend_dampening: default_uptrend_dampening(),
        }
    }
}

/// One budget band: at or above `min_return`, scale budget by `multiplier`
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct PerformanceBand {
    pub min_return: Decimal,
    pub multiplier: Decimal,
}

/// Budget controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    /// Budget before performance scaling
    pub initial_budget: Decimal,

    /// Trailing-return bands, best performance first. The first band's
    /// multiplier is the ceiling.
    #[serde(default = "default_performance_bands")]
    pub performance_bands: Vec<PerformanceBand>,

    /// Multiplier applied below the worst band
    #[serde(default = "default_floor_multiplier")]
    pub floor_multiplier: Decimal,

    /// Aggregate exposure cap as a fraction of effective budget
    #[serde(default = "default_max_exposure")]
    pub max_exposure: Decimal,

    /// Cash fraction the sizing engine must never allocate below
    #[serde(default = "default_min_cash_reserve")]
    pub min_cash_reserve: Decimal,

    /// Trailing horizon for the performance window
    #[serde(default = "default_performance_window_days")]
    pub performance_window_days: u32,
}

fn default_performance_bands() -> Vec<PerformanceBand> {
    vec![
        PerformanceBand {
            min_return: Decimal::new(30, 2),
            multiplier: Decimal::new(140, 2),
        },
        PerformanceBand {
            min_return: Decimal::new(20, 2),
            multiplier: Decimal::new(130, 2),
        },
        PerformanceBand {
            min_return: Decimal::new(15, 2),
            multiplier: Decimal::new(125, 2),
        },
        PerformanceBand {
            min_return: Decimal::new(10, 2),
            multiplier: Decimal::new(120, 2),
        },
        PerformanceBand {
            min_return: Decimal::new(5, 2),
            multiplier: Decimal::new(110, 2),
        },
        PerformanceBand {
            min_return: Decimal::new(-5, 2),
            multiplier: Decimal::ONE,
        },
        PerformanceBand {
            min_return: Decimal::new(-10, 2),
            multiplier: Decimal::new(95, 2),
        },
        PerformanceBand {
            min_return: Decimal::new(-15, 2),
            multiplier: Decimal::new(90, 2),
        },
        PerformanceBand {
            min_return: Decimal::new(-20, 2),
            multiplier: Decimal::new(85, 2),
        },
    ]
}
fn default_floor_multiplier() -> Decimal {
    Decimal::new(70, 2) // 0.70
}
fn default_max_exposure() -> Decimal {
    Decimal::new(90, 2) // 0.90
}
fn default_min_cash_reserve() -> Decimal {
    Decimal::new(10, 2) // 0.10
}
fn default_performance_window_days() -> u32 {
    30
}

/// Trading cycle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CycleConfig {
    /// Cadence of the evaluation loop
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Per-instrument order placement timeout
    #[serde(default = "default_order_timeout_secs")]
    pub order_timeout_secs: u64,

    /// Index decline that trips the market circuit breaker
    #[serde(default = "default_market_decline_threshold")]
    pub market_decline_threshold: Decimal,

    /// Consecutive losing days that trip the loss-streak breaker
    #[serde(default = "default_max_consecutive_loss_days")]
    pub max_consecutive_loss_days: u32,
}

fn default_interval_secs() -> u64 {
    300
}
fn default_order_timeout_secs() -> u64 {
    60
}
fn default_market_decline_threshold() -> Decimal {
    Decimal::new(3, 2) // 3% index decline
}
fn default_max_consecutive_loss_days() -> u32 {
    3
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            order_timeout_secs: default_order_timeout_secs(),
            market_decline_threshold: default_market_decline_threshold(),
            max_consecutive_loss_days: default_max_consecutive_loss_days(),
        }
    }
}

/// Commission and tax rates for the fee function
#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    /// Commission rate applied to both sides
    #[serde(default = "default_commission_rate")]
    pub commission_rate: Decimal,

    /// Transaction tax applied to sells only
    #[serde(default = "default_sell_tax_rate")]
    pub sell_tax_rate: Decimal,
}

fn default_commission_rate() -> Decimal {
    Decimal::new(15, 5) // 0.015%
}
fn default_sell_tax_rate() -> Decimal {
    Decimal::new(23, 4) // 0.23%
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            commission_rate: default_commission_rate(),
            sell_tax_rate: default_sell_tax_rate(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    pub metrics_port: u16,
    pub log_level: String,
}

impl Config {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation beyond what serde can express
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_sizing_bands(&self.sizing.bands)?;
        validate_performance_bands(&self.budget.performance_bands, self.budget.floor_multiplier)?;

        for (field, value) in [
            ("budget.max_exposure", self.budget.max_exposure),
            ("budget.min_cash_reserve", self.budget.min_cash_reserve),
            ("entry.min_pullback", self.entry.min_pullback),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(ConfigError::RateOutOfRange { field, value });
            }
        }

        Ok(())
    }
}

/// Sizing bands must be ordered by descending discount threshold with
/// non-increasing fractions as the discount shrinks, every fraction in
/// [0, 1] so an allocation can never be negative or exceed the budget
pub fn validate_sizing_bands(bands: &[SizingBand]) -> Result<(), ConfigError> {
    const SECTION: &str = "sizing.bands";
    if bands.is_empty() {
        return Err(ConfigError::EmptyBands { section: SECTION });
    }
    for band in bands {
        if band.budget_fraction < Decimal::ZERO || band.budget_fraction > Decimal::ONE {
            return Err(ConfigError::RateOutOfRange {
                field: "sizing.bands.budget_fraction",
                value: band.budget_fraction,
            });
        }
    }
    for pair in bands.windows(2) {
        if pair[1].min_discount >= pair[0].min_discount {
            return Err(ConfigError::UnorderedBands { section: SECTION });
        }
        if pair[1].budget_fraction > pair[0].budget_fraction {
            return Err(ConfigError::NonMonotoneBands { section: SECTION });
        }
    }
    Ok(())
}

/// Performance bands must be ordered by descending trailing return with
/// non-increasing, non-negative multipliers, bounded below by the floor
/// multiplier
pub fn validate_performance_bands(
    bands: &[PerformanceBand],
    floor: Decimal,
) -> Result<(), ConfigError> {
    const SECTION: &str = "budget.performance_bands";
    if bands.is_empty() {
        return Err(ConfigError::EmptyBands { section: SECTION });
    }
    if floor < Decimal::ZERO {
        return Err(ConfigError::NegativeValue {
            field: "budget.floor_multiplier",
            value: floor,
        });
    }
    for band in bands {
        if band.multiplier < Decimal::ZERO {
            return Err(ConfigError::NegativeValue {
                field: "budget.performance_bands.multiplier",
                value: band.multiplier,
            });
        }
    }
    for pair in bands.windows(2) {
        if pair[1].min_return >= pair[0].min_return {
            return Err(ConfigError::UnorderedBands { section: SECTION });
        }
        if pair[1].multiplier > pair[0].multiplier {
            return Err(ConfigError::NonMonotoneBands { section: SECTION });
        }
    }
    if let Some(last) = bands.last() {
        if floor > last.multiplier {
            return Err(ConfigError::NonMonotoneBands { section: SECTION });
        }
    }
    Ok(())
}
