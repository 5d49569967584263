//! JSON file store
//!
//! Layout under the data directory:
//! - `trades.jsonl`: one [`TradeLogEntry`] per line, append-only
//! - `blacklist.json`: current blacklist entries
//! - `positions.json`: open positions for crash recovery
//!
//! Snapshots are written to a temp file and renamed into place so a crash
//! mid-write leaves the previous snapshot intact.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::{BlacklistEntry, Position};
use crate::ports::{Persistence, PersistenceError, TradeLogEntry};

pub const TRADE_LOG_FILE: &str = "trades.jsonl";
pub const BLACKLIST_FILE: &str = "blacklist.json";
pub const POSITIONS_FILE: &str = "positions.json";

#[derive(Debug)]
pub struct JsonStore {
    dir: PathBuf,
    /// Serialises appends and snapshot writes from concurrent tasks
    write_lock: Mutex<()>,
}

impl JsonStore {
    /// Open a store, creating the directory if needed
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, PersistenceError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn write_snapshot<T: Serialize>(&self, name: &str, value: &T) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let target = self.path(name);
        let tmp = self.path(&format!("{}.tmp", name));
        let content = serde_json::to_string_pretty(value)?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    /// A missing file is an empty snapshot
    fn read_snapshot<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, PersistenceError> {
        let path = self.path(name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }
}

impl Persistence for JsonStore {
    fn append_trade_log(&self, entry: &TradeLogEntry) -> Result<(), PersistenceError> {
        let line = serde_json::to_string(entry)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(TRADE_LOG_FILE))?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }

    fn recent_trades(&self, limit: usize) -> Result<Vec<TradeLogEntry>, PersistenceError> {
        let path = self.path(TRADE_LOG_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&path)?);
        let mut entries = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TradeLogEntry>(&line) {
                Ok(entry) => entries.push(entry),
                // A torn last line after a crash should not hide the rest
                Err(e) => tracing::warn!("Skipping unreadable trade log line {}: {}", n + 1, e),
            }
        }
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.split_off(skip))
    }

    fn load_blacklist(&self) -> Result<Vec<BlacklistEntry>, PersistenceError> {
        self.read_snapshot(BLACKLIST_FILE)
    }

    fn save_blacklist(&self, entries: &[BlacklistEntry]) -> Result<(), PersistenceError> {
        self.write_snapshot(BLACKLIST_FILE, &entries)
    }

    fn load_positions(&self) -> Result<Vec<Position>, PersistenceError> {
        self.read_snapshot(POSITIONS_FILE)
    }

    fn save_positions(&self, positions: &[Position]) -> Result<(), PersistenceError> {
        self.write_snapshot(POSITIONS_FILE, &positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExitParams, OrderResult, OrderStatus, Side};
    use tempfile::TempDir;

    fn entry(asset: &str, timestamp: u64) -> TradeLogEntry {
        TradeLogEntry {
            result: OrderResult {
                side: Side::Buy,
                asset_id: asset.to_string(),
                status: OrderStatus::Confirmed,
                requested_amount: 0.1,
                executed_price: Some(0.00001),
                executed_amount: Some(10_000.0),
                base_amount: Some(0.1),
                tx_ref: Some("sig".into()),
                retries: 0,
                latency_ms: 850,
                error: None,
                demo: true,
                timestamp,
            },
            context: "entry".into(),
            confidence: Some(0.9),
        }
    }

    #[test]
    fn test_trade_log_appends_and_returns_tail() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();

        for ts in 1..=5 {
            store.append_trade_log(&entry("MintA", ts)).unwrap();
        }

        let recent = store.recent_trades(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].result.timestamp, 4);
        assert_eq!(recent[1].result.timestamp, 5);

        let content = fs::read_to_string(dir.path().join(TRADE_LOG_FILE)).unwrap();
        assert_eq!(content.lines().count(), 5);
    }

    #[test]
    fn test_torn_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        store.append_trade_log(&entry("MintA", 1)).unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join(TRADE_LOG_FILE))
            .unwrap();
        write!(file, "{{\"side\":\"BU").unwrap();

        assert_eq!(store.recent_trades(10).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_files_load_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path().join("nested/data")).unwrap();

        assert!(store.recent_trades(10).unwrap().is_empty());
        assert!(store.load_blacklist().unwrap().is_empty());
        assert!(store.load_positions().unwrap().is_empty());
    }

    #[test]
    fn test_snapshots_replace_previous_contents() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        let first = BlacklistEntry {
            asset_id: "MintA".into(),
            reason: "rug".into(),
            added_at: 10,
            expires_at: None,
        };
        let second = BlacklistEntry {
            asset_id: "MintB".into(),
            reason: "low score".into(),
            added_at: 20,
            expires_at: Some(100),
        };

        store.save_blacklist(&[first.clone(), second.clone()]).unwrap();
        store.save_blacklist(&[second.clone()]).unwrap();

        assert_eq!(store.load_blacklist().unwrap(), vec![second]);
        assert!(!dir.path().join("blacklist.json.tmp").exists());
    }

    #[test]
    fn test_positions_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let position = Position::open("MintA", 0.00001, 10_000.0, 0.1, 1_000, Some("sig".into()), ExitParams::default()).unwrap();
        JsonStore::open(dir.path()).unwrap().save_positions(&[position.clone()]).unwrap();

        let reopened = JsonStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load_positions().unwrap(), vec![position]);
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(POSITIONS_FILE), "[{").unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        assert!(matches!(store.load_positions(), Err(PersistenceError::Serde(_))));
    }
}
