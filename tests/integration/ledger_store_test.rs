//! Ledger persistence integration tests
//!
//! Exercises the full save/load path against a real directory: atomic
//! replacement, backup rotation, and recovery from a corrupted document.

use chrono::Utc;
use rust_decimal_macros::dec;
use split_trader::config::{InstrumentConfig, LedgerConfig};
use split_trader::ledger::{InstrumentLedger, LedgerStore, SellReason, StoreError};
use std::collections::HashMap;
use tempfile::TempDir;

fn ledger_config(dir: &TempDir) -> LedgerConfig {
    toml::from_str(&format!("data_dir = {:?}", dir.path().to_str().unwrap())).unwrap()
}

fn instruments() -> Vec<InstrumentConfig> {
    vec![toml::from_str(
        r#"
        code = "005930"
        name = "Samsung Electronics"
        sector = "semiconductor"
    "#,
    )
    .unwrap()]
}

fn save(store: &LedgerStore, ledger: InstrumentLedger) {
    let mut ledgers = HashMap::new();
    ledgers.insert(ledger.code.clone(), ledger);
    store.save(&ledgers).unwrap();
}

#[test]
fn test_lifecycle_survives_restart() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::new(&ledger_config(&dir));
    let now = Utc::now();

    let mut ledgers = store.load(&instruments()).unwrap();
    let ledger = ledgers.get_mut("005930").unwrap();
    ledger.open_stage(dec!(75000), 6, now).unwrap();
    ledger.open_stage(dec!(72000), 10, now).unwrap();
    ledger
        .close_stage_partial(1, 2, dec!(80000), now, SellReason::ProfitTarget, dec!(150))
        .unwrap();
    store.save(&ledgers).unwrap();

    // A new store on the same directory is a process restart
    let reloaded_store = LedgerStore::new(&ledger_config(&dir));
    let reloaded = reloaded_store.load(&instruments()).unwrap();
    let ledger = &reloaded["005930"];
    assert_eq!(ledger.open_stage_count(), 2);
    assert_eq!(ledger.stage(1).unwrap().remaining_quantity, 4);
    assert_eq!(ledger.stage(2).unwrap().remaining_quantity, 10);
    assert_eq!(ledger.stage(1).unwrap().sell_history.len(), 1);
    assert_eq!(ledger.realized_pnl, dec!(9850)); // (80000-75000)*2 - 150
}

#[test]
fn test_corrupt_document_recovers_from_backup() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::new(&ledger_config(&dir));
    let now = Utc::now();

    let mut ledger = InstrumentLedger::fresh("005930", "Samsung Electronics", "semiconductor", 5);
    ledger.open_stage(dec!(75000), 6, now).unwrap();
    save(&store, ledger.clone());
    // Second save rotates the first document into backups/
    save(&store, ledger);

    let path = dir.path().join("005930.json");
    std::fs::write(&path, "{ truncated").unwrap();

    let recovered = store.load(&instruments()).unwrap();
    assert_eq!(recovered["005930"].open_stage_count(), 1);
    assert_eq!(recovered["005930"].stage(1).unwrap().entry_price, dec!(75000));
}

#[test]
fn test_corrupt_document_without_backup_is_fatal() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::new(&ledger_config(&dir));

    std::fs::write(dir.path().join("005930.json"), "not json at all").unwrap();

    let err = store.load(&instruments()).unwrap_err();
    assert!(matches!(err, StoreError::CorruptState { .. }));
}

#[test]
fn test_interrupted_save_leaves_previous_state_loadable() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::new(&ledger_config(&dir));
    let now = Utc::now();

    let mut ledger = InstrumentLedger::fresh("005930", "Samsung Electronics", "semiconductor", 5);
    ledger.open_stage(dec!(75000), 6, now).unwrap();
    save(&store, ledger);

    // A crash between staging and rename leaves a stray temp file behind
    std::fs::write(dir.path().join("005930.json.tmp"), "partial write").unwrap();

    let reloaded = store.load(&instruments()).unwrap();
    assert_eq!(reloaded["005930"].stage(1).unwrap().entry_price, dec!(75000));
}
