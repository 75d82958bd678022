//! Per-key async mutual exclusion.
//!
//! Callers holding different keys never wait on each other. Entries are
//! dropped from the table once the last holder or waiter releases them, so
//! the table only grows with the number of keys in flight.
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tokio::time::error::Elapsed;

type Slot = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Slot>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for exclusive access to `key`.
    pub async fn acquire(&self, key: K, timeout: Duration) -> Result<KeyedGuard<'_, K>, Elapsed> {
        let slot = self.slots().entry(key.clone()).or_default().clone();
        let locked = tokio::time::timeout(timeout, slot.lock_owned()).await;
        match locked {
            Ok(guard) => Ok(KeyedGuard {
                locks: self,
                key,
                guard: Some(guard),
            }),
            Err(elapsed) => {
                self.release(&key);
                Err(elapsed)
            }
        }
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<K, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, key: &K) {
        let mut slots = self.slots();
        if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(key);
        }
    }
}

/// Exclusive access to one key, released on drop.
#[derive(Debug)]
pub struct KeyedGuard<'a, K: Eq + Hash + Clone> {
    locks: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        // The owned guard keeps a reference to the slot; drop it first.
        self.guard.take();
        self.locks.release(&self.key);
    }
}
