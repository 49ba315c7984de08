//! Concurrent counter store using DashMap for atomic per-key increments

use dashmap::DashMap;
use std::sync::Arc;
use vote_events::{OptionId, PollId};

/// Counter key for a poll's running total
pub fn total_key(poll_id: &PollId) -> String {
    format!("poll:{}:total", poll_id)
}

/// Counter key for one option of a poll
pub fn option_key(poll_id: &PollId, option_id: &OptionId) -> String {
    format!("poll:{}:option:{}", poll_id, option_id)
}

/// Thread-safe counter store
///
/// Increments take the key's shard write lock for the duration of the
/// read-modify-write, so callers never race each other on a key. Counters
/// spring into existence at zero on first increment.
#[derive(Clone)]
pub struct CounterStore {
    counters: Arc<DashMap<String, u64>>,
}

impl CounterStore {
    /// Create a new empty counter store
    pub fn new() -> Self {
        Self {
            counters: Arc::new(DashMap::new()),
        }
    }

    /// Atomically increment a counter, returning the new value
    pub fn increment(&self, key: &str) -> u64 {
        let mut entry = self.counters.entry(key.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Current value of a counter (0 if it was never incremented)
    pub fn get(&self, key: &str) -> u64 {
        self.counters.get(key).map(|v| *v).unwrap_or(0)
    }

    /// Number of distinct counters
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// All counters for one poll as (key, value) pairs
    pub fn poll_counters(&self, poll_id: &PollId) -> Vec<(String, u64)> {
        let prefix = format!("poll:{}:", poll_id);
        self.counters
            .iter()
            .filter(|r| r.key().starts_with(&prefix))
            .map(|r| (r.key().clone(), *r.value()))
            .collect()
    }
}

impl Default for CounterStore {
    fn default() -> Self {
        Self::new()
    }
}
