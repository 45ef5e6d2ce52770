//! Append-only spam log kept under a single key of the shared container.
//!
//! The whole list is stored as one JSON array, so an append is a
//! read-modify-write. In `BestEffort` mode that sequence is unsynchronized:
//! two processes appending at the same moment can both read the same list
//! and the later write drops the earlier record. `Serialized` mode runs the
//! sequence inside a `BEGIN IMMEDIATE` transaction, which SQLite serializes
//! across processes.

use std::path::{Path, PathBuf};

use rusqlite::{Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use sieve_core::now_display;

use crate::container::{SharedContainer, get_on, set_on};
use crate::error::{Result, StoreError};

/// Fixed key the host application reads the spam list from.
pub const SPAM_LOG_KEY: &str = "spamMessages";

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 250;

/// One observed spam message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpamRecord {
    pub sender: String,
    pub message: String,
    /// Human-readable UTC observation time, `YYYY-MM-DD HH:MM:SS +0000`.
    pub date: String,
}

impl SpamRecord {
    pub fn new(sender: &str, message: &str, date: &str) -> Self {
        Self {
            sender: sender.to_string(),
            message: message.to_string(),
            date: date.to_string(),
        }
    }

    /// Record stamped with the current time. An absent sender is stored as "".
    pub fn observed_now(sender: Option<&str>, message: &str) -> Self {
        Self::new(sender.unwrap_or(""), message, &now_display())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendMode {
    /// Unlocked read-modify-write. Concurrent appends may lose records.
    #[default]
    BestEffort,
    /// Read-modify-write inside an immediate transaction.
    Serialized,
}

/// Handle on the spam list in a container directory.
///
/// Holds only the location; every operation opens its own connection so a
/// `SpamLog` can be shared between threads and an unavailable container
/// surfaces as an error on the call that needed it.
#[derive(Clone, Debug)]
pub struct SpamLog {
    dir: PathBuf,
    mode: AppendMode,
    busy_timeout_ms: u64,
}

impl SpamLog {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            mode: AppendMode::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    pub fn with_mode(mut self, mode: AppendMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_busy_timeout(mut self, ms: u64) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn mode(&self) -> AppendMode {
        self.mode
    }

    fn open(&self) -> Result<SharedContainer> {
        SharedContainer::open(&self.dir, self.busy_timeout_ms)
    }

    /// Full list, oldest first. A missing key is an empty list.
    pub fn load(&self) -> Result<Vec<SpamRecord>> {
        let container = self.open()?;
        read_records(container.get(SPAM_LOG_KEY)?)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Append one record and return the new list length.
    ///
    /// A stored value that does not parse as a record list is left untouched
    /// and the append fails with `InvalidData`.
    pub fn append(&self, record: SpamRecord) -> Result<usize> {
        let container = self.open()?;
        match self.mode {
            AppendMode::BestEffort => {
                let mut records = read_records(container.get(SPAM_LOG_KEY)?)?;
                records.push(record);
                container.set(SPAM_LOG_KEY, &serde_json::to_string(&records)?)?;
                Ok(records.len())
            }
            AppendMode::Serialized => {
                let tx = Transaction::new_unchecked(container.conn(), TransactionBehavior::Immediate)?;
                let mut records = read_records(get_on(&tx, SPAM_LOG_KEY)?)?;
                records.push(record);
                set_on(&tx, SPAM_LOG_KEY, &serde_json::to_string(&records)?)?;
                tx.commit()?;
                Ok(records.len())
            }
        }
    }
}

fn read_records(raw: Option<String>) -> Result<Vec<SpamRecord>> {
    match raw {
        None => Ok(Vec::new()),
        Some(json) => serde_json::from_str(&json).map_err(|e| {
            StoreError::InvalidData(format!("stored {SPAM_LOG_KEY} is not a record list: {e}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(i: usize) -> SpamRecord {
        SpamRecord::new(
            &format!("+1555010{i}"),
            &format!("win prize #{i}"),
            "2026-02-21 00:00:00 +0000",
        )
    }

    #[test]
    fn test_empty_log() {
        let dir = TempDir::new().unwrap();
        let log = SpamLog::new(dir.path());
        assert!(log.load().unwrap().is_empty());
        assert!(log.is_empty().unwrap());
    }

    #[test]
    fn test_append_grows_by_one_and_preserves_order() {
        let dir = TempDir::new().unwrap();
        let log = SpamLog::new(dir.path());

        for i in 0..5 {
            let before = log.load().unwrap();
            let len = log.append(record(i)).unwrap();
            assert_eq!(len, before.len() + 1);

            let after = log.load().unwrap();
            assert_eq!(&after[..before.len()], &before[..]);
            assert_eq!(after.last(), Some(&record(i)));
        }
        assert_eq!(log.len().unwrap(), 5);
    }

    #[test]
    fn test_serialized_append_behaves_the_same_sequentially() {
        let dir = TempDir::new().unwrap();
        let log = SpamLog::new(dir.path()).with_mode(AppendMode::Serialized);
        log.append(record(1)).unwrap();
        log.append(record(2)).unwrap();
        assert_eq!(log.load().unwrap(), vec![record(1), record(2)]);
    }

    #[test]
    fn test_wire_format_is_list_of_string_keyed_records() {
        let dir = TempDir::new().unwrap();
        let log = SpamLog::new(dir.path());
        log.append(record(7)).unwrap();

        let container = SharedContainer::open(dir.path(), 100).unwrap();
        let raw = container.get(SPAM_LOG_KEY).unwrap().unwrap();
        let wire: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(wire.is_array());
        assert_eq!(wire[0]["sender"], "+15550107");
        assert_eq!(wire[0]["message"], "win prize #7");
        assert_eq!(wire[0]["date"], "2026-02-21 00:00:00 +0000");
    }

    #[test]
    fn test_reads_list_written_by_host() {
        let dir = TempDir::new().unwrap();
        let container = SharedContainer::open(dir.path(), 100).unwrap();
        container
            .set(
                SPAM_LOG_KEY,
                r#"[{"sender":"host","message":"seeded","date":"2026-01-01 00:00:00 +0000"}]"#,
            )
            .unwrap();

        let log = SpamLog::new(dir.path());
        log.append(record(1)).unwrap();
        let records = log.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sender, "host");
    }

    #[test]
    fn test_corrupt_value_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let container = SharedContainer::open(dir.path(), 100).unwrap();
        container.set(SPAM_LOG_KEY, "{not a list").unwrap();

        let log = SpamLog::new(dir.path());
        assert!(matches!(log.append(record(1)), Err(StoreError::InvalidData(_))));
        assert_eq!(container.get(SPAM_LOG_KEY).unwrap().unwrap(), "{not a list");
    }

    #[test]
    fn test_unavailable_container_errors() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("blocked");
        std::fs::write(&file, "x").unwrap();

        let log = SpamLog::new(&file);
        assert!(log.append(record(1)).is_err());
        assert!(log.load().is_err());
    }

    #[test]
    fn test_observed_now_defaults_sender() {
        let r = SpamRecord::observed_now(None, "free prize");
        assert_eq!(r.sender, "");
        assert_eq!(r.message, "free prize");
        assert!(r.date.ends_with("+0000"));
    }

    #[test]
    fn test_serialized_mode_loses_nothing_under_contention() {
        let dir = TempDir::new().unwrap();
        // Create the schema before the writers race.
        SharedContainer::open(dir.path(), 100).unwrap();

        let log = Arc::new(
            SpamLog::new(dir.path())
                .with_mode(AppendMode::Serialized)
                .with_busy_timeout(10_000),
        );
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        log.append(record(t * 100 + i)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(log.len().unwrap(), 100);
    }

    #[test]
    fn test_best_effort_mode_never_exceeds_attempts() {
        let dir = TempDir::new().unwrap();
        SharedContainer::open(dir.path(), 100).unwrap();

        let log = Arc::new(SpamLog::new(dir.path()).with_busy_timeout(10_000));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let _ = log.append(record(t * 100 + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Lost updates are allowed here, duplicates and corruption are not.
        let records = log.load().unwrap();
        assert!(!records.is_empty() && records.len() <= 100);
        let mut seen = std::collections::HashSet::new();
        assert!(records.iter().all(|r| seen.insert(r.message.clone())));
    }
}
