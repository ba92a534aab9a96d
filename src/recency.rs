// src/recency.rs
//! Bounded "recently touched" tracking.
//!
//! Collaborators exempt objects the player just interacted with from
//! culling for a short window. The tracker is an explicit bounded map
//! keyed by a stable handle with its own TTL and an explicit expiry
//! sweep; nothing about its lifetime depends on garbage collection or
//! weak references.

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

const DEFAULT_TTL: Duration = Duration::from_secs(10);
const DEFAULT_CAPACITY: usize = 512;

/// TTL map of recently touched handles.
pub struct RecencyTracker<K: Eq + Hash + Clone> {
    entries: DashMap<K, Instant>,
    ttl: Duration,
    capacity: usize,
}

impl<K: Eq + Hash + Clone> Default for RecencyTracker<K> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

impl<K: Eq + Hash + Clone> RecencyTracker<K> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Mark the handle as touched now.
    pub fn touch(&self, key: K) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.sweep();
        }
        self.entries.insert(key, Instant::now());
    }

    /// True while the handle's last touch is younger than the TTL.
    pub fn is_recent(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .map(|stamp| stamp.elapsed() < self.ttl)
            .unwrap_or(false)
    }

    /// Drop expired entries; if the map is still over capacity, drop the
    /// oldest entries until it fits.
    pub fn sweep(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, stamp| stamp.elapsed() < ttl);

        if self.entries.len() > self.capacity {
            let mut stamped: Vec<(K, Instant)> = self
                .entries
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect();
            stamped.sort_by_key(|(_, stamp)| *stamp);

            let excess = stamped.len() - self.capacity;
            for (key, _) in stamped.into_iter().take(excess) {
                self.entries.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
