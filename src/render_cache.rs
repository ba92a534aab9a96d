// src/render_cache.rs
//! Short-term cache of final render verdicts.
//!
//! Consulted before any recomputation in the per-cell decision procedure.
//! Entries live ~150 ms; a cell whose geometry changed in the last 100 ms
//! is treated as invalid even if its entry has not expired, so edits show
//! up within a frame or two.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::grid::CellPos;

/// How long modification marks linger before the aged-eviction pass may
/// drop them.
const MODIFICATION_RETENTION: Duration = Duration::from_secs(5);

/// Modifications younger than this invalidate the cell's entry outright.
const MODIFICATION_GRACE: Duration = Duration::from_millis(100);

/// One cached render verdict.
#[derive(Debug, Clone, Copy)]
pub struct RenderDecision {
    pub was_rendered: bool,
    pub distance: f32,
    pub stamp: Instant,
}

impl RenderDecision {
    fn new(was_rendered: bool, distance: f32) -> Self {
        Self {
            was_rendered,
            distance,
            stamp: Instant::now(),
        }
    }

    #[inline]
    fn is_expired(&self, ttl: Duration) -> bool {
        self.stamp.elapsed() > ttl
    }
}

/// Concurrent verdict cache with modification-aware invalidation.
pub struct RenderDecisionCache {
    decisions: DashMap<CellPos, RenderDecision>,
    modifications: DashMap<CellPos, Instant>,
    ttl: Duration,
    max_size: usize,
}

impl RenderDecisionCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            decisions: DashMap::with_capacity(1024),
            modifications: DashMap::with_capacity(1024),
            ttl,
            max_size: max_size.max(1),
        }
    }

    /// True only if the cell has an entry that is neither expired nor
    /// shadowed by a recent modification mark.
    pub fn has_valid(&self, cell: CellPos) -> bool {
        let Some(decision) = self.decisions.get(&cell) else {
            return false;
        };

        if let Some(modified) = self.modifications.get(&cell) {
            if modified.elapsed() < MODIFICATION_GRACE {
                return false;
            }
        }

        !decision.is_expired(self.ttl)
    }

    /// Record a verdict, evicting aged entries when at capacity.
    pub fn cache_decision(&self, cell: CellPos, rendered: bool, distance: f32) {
        if self.decisions.len() >= self.max_size {
            self.evict_aged();
        }
        self.decisions.insert(cell, RenderDecision::new(rendered, distance));
    }

    /// Fast-path verdict query: the entry's verdict, expiry not consulted.
    /// Absent cells answer false (the caller falls through to a fresh
    /// computation).
    pub fn should_render(&self, cell: CellPos) -> bool {
        self.decisions
            .get(&cell)
            .map(|d| d.was_rendered)
            .unwrap_or(false)
    }

    /// Direct read of the cached verdict, if any.
    pub fn decision(&self, cell: CellPos) -> Option<RenderDecision> {
        self.decisions.get(&cell).map(|d| *d)
    }

    /// Drop the cell's entry and mark it modified.
    pub fn invalidate(&self, cell: CellPos) {
        self.decisions.remove(&cell);
        self.modifications.insert(cell, Instant::now());
    }

    /// Invalidate every cell within `radius` (Chebyshev) of `center`.
    pub fn invalidate_area(&self, center_cell: CellPos, radius: i32) {
        let now = Instant::now();
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                let cell = center_cell.offset(dx, dz);
                self.decisions.remove(&cell);
                self.modifications.insert(cell, now);
            }
        }
    }

    pub fn clear(&self) {
        self.decisions.clear();
        self.modifications.clear();
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    /// First pass drops decisions older than twice the TTL; if the map is
    /// still more than three-quarters full, old modification marks go too.
    fn evict_aged(&self) {
        let ttl = self.ttl;
        self.decisions.retain(|_, d| !d.is_expired(ttl * 2));

        if self.decisions.len() > self.max_size * 3 / 4 {
            self.modifications
                .retain(|_, stamp| stamp.elapsed() <= MODIFICATION_RETENTION);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn cache() -> RenderDecisionCache {
        RenderDecisionCache::new(64, Duration::from_millis(150))
    }

    #[test]
    fn absent_cells_are_invalid() {
        let c = cache();
        assert!(!c.has_valid(CellPos::new(0, 0)));
        assert!(!c.should_render(CellPos::new(0, 0)));
    }

    #[test]
    fn cached_verdict_round_trips() {
        let c = cache();
        let cell = CellPos::new(2, 2);
        c.cache_decision(cell, true, 42.0);
        assert!(c.has_valid(cell));
        assert!(c.should_render(cell));

        let d = c.decision(cell).unwrap();
        assert!(d.was_rendered);
        assert_eq!(d.distance, 42.0);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let c = RenderDecisionCache::new(64, Duration::from_millis(20));
        let cell = CellPos::new(1, 1);
        c.cache_decision(cell, true, 10.0);
        assert!(c.has_valid(cell));

        thread::sleep(Duration::from_millis(40));
        assert!(!c.has_valid(cell));
        // The raw verdict is still readable on the fast path.
        assert!(c.should_render(cell));
    }

    #[test]
    fn recent_modification_shadows_even_a_fresh_entry() {
        let c = cache();
        let cell = CellPos::new(3, 3);
        c.invalidate(cell);
        // Re-caching immediately does not make the entry valid: the
        // modification mark is younger than the grace window.
        c.cache_decision(cell, true, 5.0);
        assert!(!c.has_valid(cell));
    }

    #[test]
    fn invalidate_area_covers_the_chebyshev_square() {
        let c = cache();
        for dx in -2..=2 {
            for dz in -2..=2 {
                c.cache_decision(CellPos::new(dx, dz), true, 1.0);
            }
        }
        c.invalidate_area(CellPos::new(0, 0), 1);

        // The 3x3 square around cell (0,0) is gone...
        for dx in -1..=1 {
            for dz in -1..=1 {
                assert!(c.decision(CellPos::new(dx, dz)).is_none());
            }
        }
        // ...the ring outside it is untouched.
        assert!(c.decision(CellPos::new(2, 2)).is_some());
        assert!(c.decision(CellPos::new(-2, 0)).is_some());
    }

    #[test]
    fn aged_eviction_drops_stale_entries_when_full() {
        let c = RenderDecisionCache::new(8, Duration::from_millis(10));
        for i in 0..8 {
            c.cache_decision(CellPos::new(i, 0), true, 1.0);
        }
        thread::sleep(Duration::from_millis(40));

        // The next insert trips the eviction pass; everything stale
        // (older than 2x TTL) is removed first.
        c.cache_decision(CellPos::new(100, 0), true, 1.0);
        assert!(c.len() <= 8);
        assert!(c.decision(CellPos::new(100, 0)).is_some());
        assert!(c.decision(CellPos::new(0, 0)).is_none());
    }

    #[test]
    fn clear_empties_both_maps() {
        let c = cache();
        let cell = CellPos::new(9, 9);
        c.cache_decision(cell, true, 1.0);
        c.invalidate(CellPos::new(8, 8));
        c.clear();
        assert!(c.is_empty());
        // No lingering modification mark: a fresh entry is valid at once.
        c.cache_decision(CellPos::new(8, 8), true, 1.0);
        assert!(c.has_valid(CellPos::new(8, 8)));
    }
}
