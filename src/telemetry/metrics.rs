//! Prometheus metrics

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Cumulative realized P&L
    RealizedPnl,
    /// Capital tied up across open stages, at entry prices
    TotalExposure,
    /// Open stage count across all instruments
    OpenStages,
    /// Budget after performance rescaling
    EffectiveBudget,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Completed trading cycles
    Cycles,
    /// Stages opened
    StagesOpened,
    /// Sell fills applied to the ledger
    StagesSold,
    /// Instruments skipped by error isolation
    InstrumentsSkipped,
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let name = match metric {
        GaugeMetric::RealizedPnl => "split_trader_realized_pnl",
        GaugeMetric::TotalExposure => "split_trader_total_exposure",
        GaugeMetric::OpenStages => "split_trader_open_stages",
        GaugeMetric::EffectiveBudget => "split_trader_effective_budget",
    };
    metrics::gauge!(name).set(value);
}

/// Increment a counter
pub fn increment(metric: CounterMetric) {
    let name = match metric {
        CounterMetric::Cycles => "split_trader_cycles_total",
        CounterMetric::StagesOpened => "split_trader_stages_opened_total",
        CounterMetric::StagesSold => "split_trader_stages_sold_total",
        CounterMetric::InstrumentsSkipped => "split_trader_instruments_skipped_total",
    };
    metrics::counter!(name).increment(1);
}
