//! Per-asset trade locks
//!
//! At most one order may be in flight per asset. Buys and sells share the
//! same registry, so a buy and a sell for one asset never overlap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Registry = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Held for the duration of an order. Dropping it releases the asset and
/// forgets the entry once no other task holds or waits on it.
#[derive(Debug)]
pub struct AssetGuard {
    guard: Option<OwnedMutexGuard<()>>,
    asset_id: String,
    locks: Registry,
}

impl Drop for AssetGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // the map's own reference is the last one
        if locks.get(&self.asset_id).map_or(false, |lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.asset_id);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetLocks {
    locks: Registry,
}

impl AssetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, asset_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(asset_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn guard(&self, asset_id: &str, guard: OwnedMutexGuard<()>) -> AssetGuard {
        AssetGuard {
            guard: Some(guard),
            asset_id: asset_id.to_string(),
            locks: self.locks.clone(),
        }
    }

    /// Lock the asset without waiting. `None` if an order is already in flight.
    pub fn try_acquire(&self, asset_id: &str) -> Option<AssetGuard> {
        let lock = self.entry(asset_id);
        match lock.try_lock_owned() {
            Ok(guard) => Some(self.guard(asset_id, guard)),
            Err(_) => None,
        }
    }

    /// Wait for the asset lock
    pub async fn acquire(&self, asset_id: &str) -> AssetGuard {
        let guard = self.entry(asset_id).lock_owned().await;
        self.guard(asset_id, guard)
    }

    pub fn is_locked(&self, asset_id: &str) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .get(asset_id)
            .map_or(false, |lock| lock.try_lock().is_err())
    }

    /// Assets with a live entry (held or awaited)
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_acquire_is_exclusive() {
        let locks = AssetLocks::new();
        let guard = locks.try_acquire("MintA");
        assert!(guard.is_some());
        assert!(locks.try_acquire("MintA").is_none());
        assert!(locks.is_locked("MintA"));

        // other assets are independent
        assert!(locks.try_acquire("MintB").is_some());

        drop(guard);
        assert!(!locks.is_locked("MintA"));
        assert!(locks.try_acquire("MintA").is_some());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let locks = AssetLocks::new();
        let guard = locks.acquire("MintA").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire("MintA").await;
            })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[test]
    fn test_released_assets_are_forgotten() {
        let locks = AssetLocks::new();
        for i in 0..100 {
            let asset = format!("Mint{}", i);
            let guard = locks.try_acquire(&asset).unwrap();
            assert_eq!(locks.len(), 1);
            drop(guard);
        }
        assert_eq!(locks.len(), 0);

        // a failed try_acquire leaves the held entry in place
        let held = locks.try_acquire("MintA").unwrap();
        assert!(locks.try_acquire("MintA").is_none());
        assert_eq!(locks.len(), 1);
        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_kept_while_a_waiter_is_queued() {
        let locks = AssetLocks::new();
        let guard = locks.acquire("MintA").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let g = locks.acquire("MintA").await;
                // still registered while this task holds it
                assert_eq!(locks.len(), 1);
                drop(g);
            })
        };
        tokio::task::yield_now().await;

        drop(guard);
        assert_eq!(locks.len(), 1, "the waiter still references the entry");
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
