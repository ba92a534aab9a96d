// src/visibility_cache.rs
//! Mid-term per-cell visibility cache.
//!
//! Capacity-bounded LRU of the last computed verdict per cell. Entries
//! carry their own timestamp; expiry is enforced by an explicit
//! `sweep_expired` invoked periodically by the orchestrator, never
//! automatically on access.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::grid::CellPos;

/// Last known visibility verdict for one cell.
#[derive(Debug, Clone, Copy)]
pub struct VisibilityRecord {
    pub visible: bool,
    pub stamp: Instant,
}

impl VisibilityRecord {
    pub fn new(visible: bool) -> Self {
        Self {
            visible,
            stamp: Instant::now(),
        }
    }

    #[inline]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.stamp.elapsed() > ttl
    }
}

/// Concurrent LRU of per-cell visibility verdicts.
///
/// At most one record per cell; the configured capacity is never exceeded.
/// Safe for unsynchronized get/put from worker threads across overlapping
/// frames.
pub struct VisibilityCache {
    inner: Mutex<LruCache<CellPos, VisibilityRecord>>,
    ttl: Duration,
}

impl VisibilityCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Look up a cell's record, bumping its recency. Expiry is the
    /// caller's concern; see [`VisibilityRecord::is_expired`].
    pub fn get(&self, cell: CellPos) -> Option<VisibilityRecord> {
        self.inner.lock().get(&cell).copied()
    }

    /// Store a fresh record, evicting the least-recently-used entry when
    /// at capacity.
    pub fn put(&self, cell: CellPos, record: VisibilityRecord) {
        self.inner.lock().push(cell, record);
    }

    /// Drop every record older than the configured TTL.
    pub fn sweep_expired(&self) {
        let mut cache = self.inner.lock();
        let expired: Vec<CellPos> = cache
            .iter()
            .filter(|(_, rec)| rec.is_expired(self.ttl))
            .map(|(cell, _)| *cell)
            .collect();
        for cell in expired {
            cache.pop(&cell);
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn round_trip_before_ttl() {
        let cache = VisibilityCache::new(16, Duration::from_millis(1000));
        let cell = CellPos::new(3, -4);
        cache.put(cell, VisibilityRecord::new(false));

        let rec = cache.get(cell).expect("record present");
        assert!(!rec.visible);
        assert!(!rec.is_expired(cache.ttl()));
    }

    #[test]
    fn sweep_removes_expired_entries_only() {
        let cache = VisibilityCache::new(16, Duration::from_millis(20));
        let old = CellPos::new(0, 0);
        cache.put(old, VisibilityRecord::new(true));

        thread::sleep(Duration::from_millis(40));
        let fresh = CellPos::new(1, 0);
        cache.put(fresh, VisibilityRecord::new(true));

        cache.sweep_expired();
        assert!(cache.get(old).is_none());
        assert!(cache.get(fresh).is_some());
    }

    #[test]
    fn sweep_is_explicit_not_automatic() {
        let cache = VisibilityCache::new(16, Duration::from_millis(10));
        let cell = CellPos::new(5, 5);
        cache.put(cell, VisibilityRecord::new(true));

        thread::sleep(Duration::from_millis(25));
        // Still retrievable until someone sweeps; the record just reports
        // itself expired.
        let rec = cache.get(cell).expect("not swept yet");
        assert!(rec.is_expired(cache.ttl()));

        cache.sweep_expired();
        assert!(cache.get(cell).is_none());
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let cache = VisibilityCache::new(4, Duration::from_millis(1000));
        for i in 0..32 {
            cache.put(CellPos::new(i, 0), VisibilityRecord::new(true));
            assert!(cache.len() <= 4);
        }
        assert_eq!(cache.len(), 4);
        // Least-recently-used entries were the ones evicted.
        assert!(cache.get(CellPos::new(0, 0)).is_none());
        assert!(cache.get(CellPos::new(31, 0)).is_some());
    }

    #[test]
    fn concurrent_puts_and_gets_do_not_lose_the_latest_write() {
        let cache = std::sync::Arc::new(VisibilityCache::new(256, Duration::from_millis(1000)));
        let mut handles = Vec::new();
        for t in 0..4 {
            let cache = cache.clone();
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    let cell = CellPos::new(i % 32, t);
                    cache.put(cell, VisibilityRecord::new(i % 2 == 0));
                    let _ = cache.get(cell);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(cache.len() <= 256);
    }
}
