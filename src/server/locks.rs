//! Keyed async locks
//!
//! One mutex per key, created on demand. The map itself sits behind its own
//! lock and entries are dropped once nobody holds or waits on them.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

/// Held for as long as the keyed section runs.
pub struct KeyedGuard<K: Eq + Hash + Clone> {
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    owner: Arc<KeyedLocks<K>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn entry(&self, key: &K) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(self: &Arc<Self>, key: K) -> KeyedGuard<K> {
        let mutex = self.entry(&key);
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            key,
            guard: Some(guard),
            owner: Arc::clone(self),
        }
    }

    /// Exclusive access to `key` if nobody else holds it.
    #[cfg(test)]
    pub fn try_lock(self: &Arc<Self>, key: K) -> Option<KeyedGuard<K>> {
        let mutex = self.entry(&key);
        match mutex.try_lock_owned() {
            Ok(guard) => Some(KeyedGuard {
                key,
                guard: Some(guard),
                owner: Arc::clone(self),
            }),
            Err(_) => {
                self.prune(&key);
                None
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    // Only the map itself references an unused entry.
    fn prune(&self, key: &K) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.get(key).is_some_and(|m| Arc::strong_count(m) == 1) {
            locks.remove(key);
        }
    }
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        // Release the mutex (and its Arc) before checking whether the entry is still needed.
        self.guard.take();
        self.owner.prune(&self.key);
    }
}
