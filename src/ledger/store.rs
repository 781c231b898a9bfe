//! Durable ledger store
//!
//! One JSON document per instrument under the data directory. Saves are
//! crash-safe: every document is written to a temporary file, re-parsed and
//! validated, and only then swapped in with an atomic rename, after the
//! previous document has been copied to a timestamped backup. Backup pruning
//! runs only after a fully successful save and never fails the save.

use super::position::InstrumentLedger;
use super::types::StoreError;
use crate::config::{InstrumentConfig, LedgerConfig};
use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const BACKUP_DIR: &str = "backups";
const TMP_SUFFIX: &str = ".tmp";

/// Owns the durable bytes on disk; the sole writer of ledger documents
pub struct LedgerStore {
    data_dir: PathBuf,
    max_stages: usize,
    backup_retention: usize,
}

impl LedgerStore {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            max_stages: config.max_stages,
            backup_retention: config.backup_retention,
        }
    }

    fn document_path(&self, code: &str) -> PathBuf {
        self.data_dir.join(format!("{code}.json"))
    }

    fn backup_dir(&self) -> PathBuf {
        self.data_dir.join(BACKUP_DIR)
    }

    /// Load ledgers for the tracked instrument set
    ///
    /// A missing document yields a fresh empty ledger. A structurally
    /// invalid document falls back to the most recent valid backup; if no
    /// backup parses either, the whole load fails with `CorruptState`.
    pub fn load(
        &self,
        instruments: &[InstrumentConfig],
    ) -> Result<HashMap<String, InstrumentLedger>, StoreError> {
        let mut ledgers = HashMap::with_capacity(instruments.len());
        for inst in instruments {
            let ledger = self.load_one(inst)?;
            ledgers.insert(inst.code.clone(), ledger);
        }
        Ok(ledgers)
    }

    fn load_one(&self, inst: &InstrumentConfig) -> Result<InstrumentLedger, StoreError> {
        let path = self.document_path(&inst.code);
        if !path.exists() {
            tracing::info!(code = %inst.code, "no ledger document, starting fresh");
            return Ok(InstrumentLedger::fresh(
                &inst.code,
                &inst.name,
                &inst.sector,
                self.max_stages,
            ));
        }

        match Self::parse_document(&path) {
            Ok(ledger) => Ok(ledger),
            Err(reason) => {
                tracing::warn!(code = %inst.code, %reason, "ledger document invalid, trying backups");
                self.recover_from_backup(&inst.code, reason)
            }
        }
    }

    fn parse_document(path: &Path) -> Result<InstrumentLedger, String> {
        let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
        let ledger: InstrumentLedger =
            serde_json::from_str(&content).map_err(|e| e.to_string())?;
        ledger.validate().map_err(|e| e.to_string())?;
        Ok(ledger)
    }

    fn recover_from_backup(
        &self,
        code: &str,
        original_reason: String,
    ) -> Result<InstrumentLedger, StoreError> {
        for backup in self.backups_newest_first(code) {
            match Self::parse_document(&backup) {
                Ok(ledger) => {
                    tracing::warn!(code, backup = %backup.display(), "recovered ledger from backup");
                    return Ok(ledger);
                }
                Err(reason) => {
                    tracing::warn!(code, backup = %backup.display(), %reason, "backup also invalid");
                }
            }
        }
        Err(StoreError::CorruptState {
            code: code.to_string(),
            reason: original_reason,
        })
    }

    /// Persist the full ledger set
    ///
    /// Two phases: first every document is written to a temporary path and
    /// revalidated by reparse; only when all of them pass does the commit
    /// phase back up and atomically replace the previous documents. A
    /// failure in the first phase discards the temporaries and leaves the
    /// prior durable state authoritative.
    pub fn save(&self, ledgers: &HashMap<String, InstrumentLedger>) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(self.backup_dir())?;

        let mut staged: Vec<(String, PathBuf)> = Vec::with_capacity(ledgers.len());
        for (code, ledger) in ledgers {
            let tmp = self
                .data_dir
                .join(format!("{code}.json{TMP_SUFFIX}"));
            if let Err(err) = Self::stage_document(&tmp, ledger) {
                Self::discard(&staged, &tmp);
                return Err(err);
            }
            staged.push((code.clone(), tmp));
        }

        // Replacement is atomic per document, not across the set: a failure
        // mid-loop leaves earlier instruments on the new revision and later
        // ones on the old. Every committed document is individually valid,
        // and the next successful save re-converges the set.
        for (code, tmp) in &staged {
            let path = self.document_path(code);
            if path.exists() {
                self.backup_document(code, &path)?;
            }
            fs::rename(tmp, &path)?;
        }

        self.prune_backups(ledgers.keys());
        Ok(())
    }

    fn stage_document(tmp: &Path, ledger: &InstrumentLedger) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(ledger).map_err(|e| StoreError::Revalidation {
            code: ledger.code.clone(),
            reason: e.to_string(),
        })?;
        let mut file = fs::File::create(tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;

        // Validate-by-reparse before any document is swapped in
        Self::parse_document(tmp).map_err(|reason| StoreError::Revalidation {
            code: ledger.code.clone(),
            reason,
        })?;
        Ok(())
    }

    fn discard(staged: &[(String, PathBuf)], current: &Path) {
        for (_, tmp) in staged {
            let _ = fs::remove_file(tmp);
        }
        let _ = fs::remove_file(current);
    }

    fn backup_document(&self, code: &str, path: &Path) -> Result<(), StoreError> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
        let backup = self.backup_dir().join(format!("{code}.{stamp}.json"));
        fs::copy(path, backup)?;
        Ok(())
    }

    /// Backup file paths for an instrument, newest first
    fn backups_newest_first(&self, code: &str) -> Vec<PathBuf> {
        let prefix = format!("{code}.");
        let Ok(entries) = fs::read_dir(self.backup_dir()) else {
            return vec![];
        };
        let mut backups: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".json"))
            })
            .collect();
        // Timestamp format sorts lexicographically
        backups.sort();
        backups.reverse();
        backups
    }

    /// Best-effort retention pruning; failures are logged, never raised
    fn prune_backups<'a>(&self, codes: impl Iterator<Item = &'a String>) {
        for code in codes {
            let backups = self.backups_newest_first(code);
            for stale in backups.iter().skip(self.backup_retention) {
                if let Err(err) = fs::remove_file(stale) {
                    tracing::warn!(code, backup = %stale.display(), %err, "failed to prune backup");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::position::SellReason;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn test_store(dir: &TempDir) -> LedgerStore {
        LedgerStore::new(&LedgerConfig {
            data_dir: dir.path().to_path_buf(),
            max_stages: 5,
            backup_retention: 2,
        })
    }

    fn test_instrument() -> InstrumentConfig {
        toml::from_str(
            r#"
            code = "005930"
            name = "Samsung Electronics"
            sector = "semiconductor"
        "#,
        )
        .unwrap()
    }

    fn populated_ledger() -> InstrumentLedger {
        let mut ledger = InstrumentLedger::fresh("005930", "Samsung Electronics", "semiconductor", 5);
        let now = Utc::now();
        ledger.open_stage(dec!(70000), 10, now).unwrap();
        ledger.open_stage(dec!(67000), 12, now).unwrap();
        ledger
            .close_stage_partial(2, 12, dec!(71000), now, SellReason::ProfitTarget, dec!(150))
            .unwrap();
        ledger
    }

    #[test]
    fn test_load_missing_returns_fresh() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        let ledgers = store.load(&[test_instrument()]).unwrap();
        let ledger = &ledgers["005930"];
        assert_eq!(ledger.open_stage_count(), 0);
        assert_eq!(ledger.max_stages, 5);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        let mut ledgers = HashMap::new();
        ledgers.insert("005930".to_string(), populated_ledger());
        store.save(&ledgers).unwrap();

        let restored = store.load(&[test_instrument()]).unwrap();
        let ledger = &restored["005930"];
        assert_eq!(ledger.stages.len(), 2);
        assert_eq!(ledger.realized_pnl, dec!(47850)); // (71000-67000)*12 - 150
        assert!(ledger.cooldowns.contains_key(&2));
    }

    #[test]
    fn test_round_trip_at_capacity_with_mixed_stages() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        let now = Utc::now();

        // All 5 slots used: 1/3/5 untouched, 2 partially sold, 4 fully
        // closed with its cooldown armed
        let mut ledger =
            InstrumentLedger::fresh("005930", "Samsung Electronics", "semiconductor", 5);
        for price in [
            dec!(70000),
            dec!(67000),
            dec!(64000),
            dec!(61000),
            dec!(58000),
        ] {
            ledger.open_stage(price, 12, now).unwrap();
        }
        ledger.update_max_profit(dec!(72000));
        ledger
            .close_stage_partial(2, 5, dec!(71000), now, SellReason::ProfitTarget, dec!(120))
            .unwrap();
        ledger
            .close_stage_partial(4, 12, dec!(66000), now, SellReason::OvervaluedSell, dec!(260))
            .unwrap();
        ledger.set_drop_requirement(2, dec!(0.03));
        ledger.set_drop_requirement(5, dec!(0.08));
        ledger.validate().unwrap();

        let mut ledgers = HashMap::new();
        ledgers.insert("005930".to_string(), ledger);
        store.save(&ledgers).unwrap();

        let restored = store.load(&[test_instrument()]).unwrap();
        assert_eq!(
            serde_json::to_value(&restored["005930"]).unwrap(),
            serde_json::to_value(&ledgers["005930"]).unwrap(),
        );
        assert_eq!(restored["005930"].open_stage_count(), 4);
        assert!(!restored["005930"].is_stage_open(4));
        assert_eq!(restored["005930"].stage(2).unwrap().remaining_quantity, 7);
        assert!(restored["005930"].cooldowns.contains_key(&4));
        assert_eq!(restored["005930"].stage(2).unwrap().sell_history.len(), 1);
    }

    #[test]
    fn test_save_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        let mut ledgers = HashMap::new();
        ledgers.insert("005930".to_string(), populated_ledger());
        store.save(&ledgers).unwrap();
        let first = fs::read_to_string(dir.path().join("005930.json")).unwrap();
        store.save(&ledgers).unwrap();
        let second = fs::read_to_string(dir.path().join("005930.json")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_interrupted_save_leaves_prior_state() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        let mut ledgers = HashMap::new();
        ledgers.insert("005930".to_string(), populated_ledger());
        store.save(&ledgers).unwrap();

        // Simulate a crash after writing temporary data but before rename
        fs::write(dir.path().join("005930.json.tmp"), "{\"partial\":").unwrap();

        let restored = store.load(&[test_instrument()]).unwrap();
        assert_eq!(restored["005930"].stages.len(), 2);
    }

    #[test]
    fn test_corrupt_document_recovers_from_backup() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        let mut ledgers = HashMap::new();
        ledgers.insert("005930".to_string(), populated_ledger());
        store.save(&ledgers).unwrap();
        // Second save creates a backup of the first document
        store.save(&ledgers).unwrap();

        fs::write(dir.path().join("005930.json"), "not json at all").unwrap();

        let restored = store.load(&[test_instrument()]).unwrap();
        assert_eq!(restored["005930"].stages.len(), 2);
        assert_eq!(restored["005930"].realized_pnl, dec!(47850));
    }

    #[test]
    fn test_corrupt_document_without_backup_fails() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join("005930.json"), "garbage").unwrap();

        let err = store.load(&[test_instrument()]).unwrap_err();
        assert!(matches!(err, StoreError::CorruptState { .. }));
    }

    #[test]
    fn test_invalid_ledger_rejected_before_commit() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        let mut ledgers = HashMap::new();
        ledgers.insert("005930".to_string(), populated_ledger());
        store.save(&ledgers).unwrap();

        // Break an invariant in memory; save must refuse and keep old state
        let mut broken = populated_ledger();
        broken.stages[0].remaining_quantity = broken.stages[0].entry_quantity + 1;
        let mut bad = HashMap::new();
        bad.insert("005930".to_string(), broken);

        let err = store.save(&bad).unwrap_err();
        assert!(matches!(err, StoreError::Revalidation { .. }));

        // No temporary leftovers, prior state intact
        assert!(!dir.path().join("005930.json.tmp").exists());
        let restored = store.load(&[test_instrument()]).unwrap();
        assert_eq!(restored["005930"].stages.len(), 2);
    }

    #[test]
    fn test_backup_retention_pruning() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        let mut ledgers = HashMap::new();
        ledgers.insert("005930".to_string(), populated_ledger());
        // Each save after the first produces a backup; retention is 2
        for _ in 0..5 {
            store.save(&ledgers).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let backups = store.backups_newest_first("005930");
        assert!(backups.len() <= 2, "expected pruning to cap backups, got {}", backups.len());
    }
}
