//! Per-key async mutual exclusion
//!
//! A map of key → async mutex. Locking a key waits for the previous holder of
//! the same key to finish; different keys never contend. Entries are removed
//! once nobody holds or waits for them.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

pub struct KeyedLocks<K> {
    locks: LockMap<K>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait until `key` is free and hold it until the guard drops
    pub async fn lock(&self, key: K) -> KeyGuard<K> {
        let mutex = {
            let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(key.clone()).or_default())
        };

        let guard = mutex.lock_owned().await;

        KeyGuard {
            key,
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// True while some caller holds `key`
    pub fn in_flight(&self, key: &K) -> bool {
        let map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(key).map_or(false, |m| m.try_lock().is_err())
    }

    /// Number of keys currently held or awaited
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds one key of a `KeyedLocks`
pub struct KeyGuard<K: Eq + Hash> {
    key: K,
    locks: LockMap<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> Drop for KeyGuard<K> {
    fn drop(&mut self) {
        // New lockers clone the mutex under the map lock, so the count
        // cannot grow while we hold it.
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(self.guard.take());
        if map.get(&self.key).map_or(false, |m| Arc::strong_count(m) == 1) {
            map.remove(&self.key);
        }
    }
}
