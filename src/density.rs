// src/density.rs
//! Dynamic-object density sampling.
//!
//! Cells crowded with dynamic objects need the full decision pipeline;
//! empty cells can skip the expensive checks entirely. Counts are rebuilt
//! from scratch (never merged incrementally) at most once per second from
//! a wholesale scan of the currently relevant objects.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::grid::CellPos;
use crate::world::WorldView;

const REFRESH_INTERVAL: Duration = Duration::from_millis(1000);

/// Heuristic-skip policy for one density tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensitySettings {
    /// Skip the raycast band entirely for this cell.
    pub skip_detailed_checks: bool,
    pub aggressiveness: f32,
    /// Suggested update cadence divider for collaborators.
    pub update_frequency: u32,
    pub enable_distance_skipping: bool,
}

/// Per-cell dynamic-object counts with tiered skip policies.
pub struct DensityOptimizer {
    counts: DashMap<CellPos, u32>,
    last_refresh: Mutex<Option<Instant>>,
}

impl Default for DensityOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl DensityOptimizer {
    pub fn new() -> Self {
        Self {
            counts: DashMap::new(),
            last_refresh: Mutex::new(None),
        }
    }

    /// Rebuild the per-cell counts if the refresh interval has elapsed.
    /// The map is fully replaced; cells without objects simply have no
    /// entry.
    pub fn refresh<W: WorldView + ?Sized>(&self, world: &W) {
        {
            let mut last = self.last_refresh.lock();
            if let Some(stamp) = *last {
                if stamp.elapsed() < REFRESH_INTERVAL {
                    return;
                }
            }
            *last = Some(Instant::now());
        }

        self.counts.clear();
        for pos in world.dynamic_positions() {
            let cell = CellPos::from_world(pos);
            *self.counts.entry(cell).or_insert(0) += 1;
        }
    }

    /// Dynamic objects counted in the cell at the last rebuild.
    pub fn count(&self, cell: CellPos) -> u32 {
        self.counts.get(&cell).map(|c| *c).unwrap_or(0)
    }

    /// Skip policy for the cell's density tier.
    pub fn settings_for(&self, cell: CellPos) -> DensitySettings {
        match self.count(cell) {
            0 => DensitySettings {
                skip_detailed_checks: true,
                aggressiveness: 0.95,
                update_frequency: 4,
                enable_distance_skipping: true,
            },
            1..=2 => DensitySettings {
                skip_detailed_checks: true,
                aggressiveness: 0.85,
                update_frequency: 3,
                enable_distance_skipping: true,
            },
            3..=9 => DensitySettings {
                skip_detailed_checks: false,
                aggressiveness: 0.70,
                update_frequency: 2,
                enable_distance_skipping: false,
            },
            _ => DensitySettings {
                skip_detailed_checks: false,
                aggressiveness: 0.50,
                update_frequency: 1,
                enable_distance_skipping: false,
            },
        }
    }

    pub fn clear(&self) {
        self.counts.clear();
        *self.last_refresh.lock() = None;
    }
}
