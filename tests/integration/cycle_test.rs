//! End-to-end trading cycle tests
//!
//! Drives the orchestrator against the paper broker across several cycles
//! and a simulated restart, checking that staged entries, exits, and the
//! persisted ledger all line up.

use chrono::Utc;
use rust_decimal_macros::dec;
use split_trader::broker::{LogSink, PaperBroker};
use split_trader::config::Config;
use split_trader::cycle::{Collaborators, Orchestrator};
use split_trader::market::MarketTrend;
use std::sync::Arc;
use tempfile::TempDir;

fn test_config(data_dir: &std::path::Path) -> Config {
    let mut config: Config = toml::from_str(
        r#"
        [[instruments]]
        code = "005930"
        name = "Samsung Electronics"
        sector = "semiconductor"

        [ledger]
        data_dir = "unused"

        [budget]
        initial_budget = 10000000

        [telemetry]
        metrics_port = 9000
        log_level = "info"
    "#,
    )
    .unwrap();
    config.ledger.data_dir = data_dir.to_path_buf();
    config.validate().unwrap();
    config
}

fn collaborators(broker: &PaperBroker) -> Collaborators {
    Collaborators {
        market_data: Arc::new(broker.clone()),
        valuation: Arc::new(broker.clone()),
        conditions: Arc::new(broker.clone()),
        executor: Arc::new(broker.clone()),
        notifier: Arc::new(LogSink),
    }
}

#[tokio::test]
async fn test_staged_accumulation_and_restart() {
    let dir = TempDir::new().unwrap();
    let broker = PaperBroker::new();
    broker.set_fair_value("005930", dec!(82000)).await;
    broker.set_trend(MarketTrend::Neutral, dec!(0)).await;

    let mut orch = Orchestrator::new(test_config(dir.path()), collaborators(&broker)).unwrap();

    // Cycle 1: undervalued, no position yet -> stage 1 opens
    broker.set_price("005930", dec!(75000)).await;
    let report = orch.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.buys, 1);

    // Cycle 2: price down 4% from the stage-1 entry clears the 3% drop
    // requirement -> stage 2 opens
    broker.set_price("005930", dec!(72000)).await;
    let report = orch.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.buys, 1);
    assert!(orch.ledger("005930").unwrap().is_stage_open(2));

    // Cycle 3: +8% on stage 1 -> profit-target partial sell
    broker.set_price("005930", dec!(81000)).await;
    let report = orch.run_cycle(Utc::now()).await.unwrap();
    assert!(report.sells >= 1);
    let realized = orch.ledger("005930").unwrap().realized_pnl;
    assert!(realized > dec!(0));

    // Restart: a fresh orchestrator on the same data dir sees the same state
    let stages_before = orch.ledger("005930").unwrap().open_stage_count();
    drop(orch);
    let orch = Orchestrator::new(test_config(dir.path()), collaborators(&broker)).unwrap();
    let ledger = orch.ledger("005930").unwrap();
    assert_eq!(ledger.open_stage_count(), stages_before);
    assert_eq!(ledger.realized_pnl, realized);
}

#[tokio::test]
async fn test_stop_loss_closes_and_cooldown_blocks_reentry() {
    let dir = TempDir::new().unwrap();
    let broker = PaperBroker::new();
    broker.set_fair_value("005930", dec!(82000)).await;
    broker.set_trend(MarketTrend::Neutral, dec!(0)).await;

    let mut orch = Orchestrator::new(test_config(dir.path()), collaborators(&broker)).unwrap();

    broker.set_price("005930", dec!(75000)).await;
    orch.run_cycle(Utc::now()).await.unwrap();
    assert!(orch.ledger("005930").unwrap().is_stage_open(1));

    // Price collapses 21.3%: the stop fires and closes the whole stage.
    // The entry that was sized the same cycle is dropped after the sell.
    broker.set_price("005930", dec!(59000)).await;
    let report = orch.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.sells, 1);
    assert_eq!(report.buys, 0);
    let ledger = orch.ledger("005930").unwrap();
    assert_eq!(ledger.open_stage_count(), 0);
    assert!(ledger.realized_pnl < dec!(0));
    assert!(ledger.cooldowns.contains_key(&1));

    // Deeply undervalued now, but the slot-1 cooldown has not elapsed
    let report = orch.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.buys, 0);
    assert_eq!(orch.ledger("005930").unwrap().open_stage_count(), 0);
}

#[tokio::test]
async fn test_save_failure_is_retried_next_cycle() {
    let dir = TempDir::new().unwrap();
    let broker = PaperBroker::new();
    broker.set_price("005930", dec!(75000)).await;
    broker.set_fair_value("005930", dec!(82000)).await;
    broker.set_trend(MarketTrend::Neutral, dec!(0)).await;

    let mut orch = Orchestrator::new(test_config(dir.path()), collaborators(&broker)).unwrap();

    // Make the data dir unwritable by replacing it with a file
    drop(std::fs::remove_dir_all(dir.path()));
    std::fs::write(dir.path(), b"").unwrap();

    let report = orch.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.buys, 1);
    assert!(!report.persisted);
    // In-memory state is intact and saved once the directory is back
    assert!(orch.ledger("005930").unwrap().is_stage_open(1));

    std::fs::remove_file(dir.path()).unwrap();
    std::fs::create_dir_all(dir.path()).unwrap();
    // No new trades at an unchanged price, but the save succeeds now
    let report = orch.run_cycle(Utc::now()).await.unwrap();
    assert!(report.persisted);

    let reloaded = Orchestrator::new(test_config(dir.path()), collaborators(&broker)).unwrap();
    assert!(reloaded.ledger("005930").unwrap().is_stage_open(1));
}
