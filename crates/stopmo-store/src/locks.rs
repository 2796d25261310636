// ABOUTME: Per-key lock registry so work on one session never waits on another.
// ABOUTME: Generic over the lock type: blocking mutexes for ledger I/O, async ones for builds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Registry size above which idle locks are pruned.
const PRUNE_THRESHOLD: usize = 256;

/// Hands out one shared lock per key, creating it on first use.
pub struct KeyedLocks<L> {
    locks: Mutex<HashMap<String, Arc<L>>>,
}

impl<L> Default for KeyedLocks<L> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<L: Default> KeyedLocks<L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the lock for `key`. Callers holding the same key always get the
    /// same lock for as long as any of them keeps it alive.
    pub fn get(&self, key: &str) -> Arc<L> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.len() > PRUNE_THRESHOLD {
            // Only the registry holds these, so nobody can be waiting on them.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
