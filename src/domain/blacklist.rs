//! Asset Blacklist
//!
//! Assets the agent must never buy. Entries may expire; expired entries are
//! treated as absent and dropped on the next purge.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default blacklist duration (24 hours)
pub const DEFAULT_BLACKLIST_SECS: u64 = 24 * 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub asset_id: String,
    pub reason: String,
    /// Unix seconds
    pub added_at: u64,
    /// `None` = permanent
    pub expires_at: Option<u64>,
}

impl BlacklistEntry {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.map_or(false, |t| now >= t)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    entries: HashMap<String, BlacklistEntry>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries, skipping the ones already expired
    pub fn from_entries(entries: Vec<BlacklistEntry>, now: u64) -> Self {
        let entries = entries
            .into_iter()
            .filter(|e| !e.is_expired(now))
            .map(|e| (e.asset_id.clone(), e))
            .collect();
        Self { entries }
    }

    /// Add or refresh an entry. `ttl_secs = None` blacklists permanently.
    pub fn add(&mut self, asset_id: &str, reason: &str, now: u64, ttl_secs: Option<u64>) {
        let entry = BlacklistEntry {
            asset_id: asset_id.to_string(),
            reason: reason.to_string(),
            added_at: now,
            expires_at: ttl_secs.map(|ttl| now.saturating_add(ttl)),
        };
        self.entries.insert(asset_id.to_string(), entry);
    }

    /// Returns true if an entry was removed
    pub fn remove(&mut self, asset_id: &str) -> bool {
        self.entries.remove(asset_id).is_some()
    }

    pub fn contains(&self, asset_id: &str, now: u64) -> bool {
        self.entries
            .get(asset_id)
            .map_or(false, |e| !e.is_expired(now))
    }

    pub fn get(&self, asset_id: &str) -> Option<&BlacklistEntry> {
        self.entries.get(asset_id)
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        before - self.entries.len()
    }

    /// Snapshot sorted by asset id for stable persistence
    pub fn entries(&self) -> Vec<BlacklistEntry> {
        let mut all: Vec<BlacklistEntry> = self.entries.values().cloned().collect();
        all.sort_by(|a, b| a.asset_id.cmp(&b.asset_id));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_contains() {
        let mut list = Blacklist::new();
        list.add("MintA", "rug", 100, Some(60));

        assert!(list.contains("MintA", 100));
        assert!(list.contains("MintA", 159));
        assert!(!list.contains("MintA", 160));
        assert!(!list.contains("MintB", 100));
    }

    #[test]
    fn test_permanent_entry() {
        let mut list = Blacklist::new();
        list.add("MintA", "manual", 100, None);
        assert!(list.contains("MintA", u64::MAX));
    }

    #[test]
    fn test_remove() {
        let mut list = Blacklist::new();
        list.add("MintA", "manual", 0, None);
        assert!(list.remove("MintA"));
        assert!(!list.remove("MintA"));
        assert!(list.is_empty());
    }

    #[test]
    fn test_purge_and_restore() {
        let mut list = Blacklist::new();
        list.add("Old", "low score", 0, Some(10));
        list.add("New", "low score", 0, Some(1_000));
        assert_eq!(list.purge_expired(50), 1);
        assert_eq!(list.len(), 1);

        let restored = Blacklist::from_entries(list.entries(), 2_000);
        assert!(restored.is_empty());
    }

    #[test]
    fn test_refresh_extends_expiry() {
        let mut list = Blacklist::new();
        list.add("MintA", "first", 0, Some(10));
        list.add("MintA", "second", 5, Some(10));
        assert!(list.contains("MintA", 12));
        assert_eq!(list.get("MintA").unwrap().reason, "second");
    }
}
