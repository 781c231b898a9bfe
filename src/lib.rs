//! split-trader: Multi-stage split trading bot with a crash-safe position ledger
//!
//! This library provides the core components for:
//! - Per-instrument position ledgers with staged entries and partial sells
//! - Atomic JSON persistence with backup rotation and recovery
//! - Valuation-discount sizing and sequential entry validation
//! - Exit rules: overvalued full sell, stop loss, profit-target partial sell
//! - Performance-scaled budget with exposure cap and cash reserve
//! - Portfolio circuit breakers for market declines and loss streaks
//! - A fixed-cadence trading cycle with per-instrument error isolation

pub mod broker;
pub mod budget;
pub mod cli;
pub mod config;
pub mod cycle;
pub mod engine;
pub mod ledger;
pub mod market;
pub mod telemetry;
