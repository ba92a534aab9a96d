// src/region.rs
//! Terrain-aware culling profiles.
//!
//! Open terrain tolerates aggressive culling at long range; dense
//! vegetation hides geometry badly and needs conservative settings. A
//! cell's terrain label classifies into a `TerrainKind` once and is cached
//! until explicitly cleared; a periodic prune keeps the cache anchored
//! around the viewer.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::grid::CellPos;
use crate::world::WorldView;

const PRUNE_INTERVAL: Duration = Duration::from_secs(30);
const PRUNE_THRESHOLD: usize = 2000;
const PRUNE_KEEP_RADIUS: i32 = 32;

/// Coarse terrain classification of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerrainKind {
    Ocean,
    Plains,
    Desert,
    SparseForest,
    DenseForest,
    Jungle,
    Unknown,
}

impl TerrainKind {
    /// Classify a terrain/biome label by substring, mirroring the naming
    /// conventions of streamed world generators.
    pub fn classify(label: &str) -> Self {
        let name = label.to_ascii_lowercase();

        if name.contains("ocean") || name.contains("deep") {
            return TerrainKind::Ocean;
        }
        if name.contains("plains") || name.contains("savanna") {
            return TerrainKind::Plains;
        }
        if name.contains("desert") {
            return TerrainKind::Desert;
        }
        if name.contains("jungle") {
            return TerrainKind::Jungle;
        }
        if name.contains("forest") {
            if name.contains("dark") || name.contains("old_growth") {
                return TerrainKind::DenseForest;
            }
            return TerrainKind::SparseForest;
        }

        TerrainKind::Unknown
    }

    /// Tuning profile for this kind of terrain.
    pub fn profile(self) -> RegionProfile {
        match self {
            TerrainKind::Ocean => RegionProfile {
                aggressiveness: 0.95,
                culling_distance: 200.0,
                enable_lod: true,
                detail_multiplier: 0.3,
            },
            TerrainKind::Plains | TerrainKind::Desert => RegionProfile {
                aggressiveness: 0.90,
                culling_distance: 180.0,
                enable_lod: true,
                detail_multiplier: 0.4,
            },
            TerrainKind::SparseForest => RegionProfile {
                aggressiveness: 0.75,
                culling_distance: 140.0,
                enable_lod: true,
                detail_multiplier: 0.6,
            },
            TerrainKind::DenseForest | TerrainKind::Jungle => RegionProfile {
                aggressiveness: 0.50,
                culling_distance: 100.0,
                enable_lod: false,
                detail_multiplier: 1.0,
            },
            TerrainKind::Unknown => RegionProfile {
                aggressiveness: 0.70,
                culling_distance: 120.0,
                enable_lod: true,
                detail_multiplier: 0.7,
            },
        }
    }
}

/// Per-region culling tunables derived from terrain classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionProfile {
    pub aggressiveness: f32,
    pub culling_distance: f32,
    pub enable_lod: bool,
    pub detail_multiplier: f32,
}

/// Classifies cells into terrain kinds, cached per cell.
pub struct RegionClassifier {
    kinds: DashMap<CellPos, TerrainKind>,
    last_prune: Mutex<Instant>,
}

impl Default for RegionClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionClassifier {
    pub fn new() -> Self {
        Self {
            kinds: DashMap::new(),
            last_prune: Mutex::new(Instant::now()),
        }
    }

    /// Tuning profile for the cell, classifying and caching on first use.
    pub fn profile_for<W: WorldView + ?Sized>(
        &self,
        world: &W,
        cell: CellPos,
        viewer: CellPos,
    ) -> RegionProfile {
        self.kind_for(world, cell, viewer).profile()
    }

    fn kind_for<W: WorldView + ?Sized>(
        &self,
        world: &W,
        cell: CellPos,
        viewer: CellPos,
    ) -> TerrainKind {
        if let Some(kind) = self.kinds.get(&cell) {
            return *kind;
        }

        // Unresolvable cells classify as unknown and are NOT cached, so a
        // later load gets a real classification.
        let Some(label) = world.terrain_label(cell) else {
            return TerrainKind::Unknown;
        };

        let kind = TerrainKind::classify(&label);
        self.kinds.insert(cell, kind);
        self.prune_if_due(viewer);
        kind
    }

    /// At most every 30 s, and only when the cache has grown past its
    /// threshold, drop cells far from the viewer.
    fn prune_if_due(&self, viewer: CellPos) {
        let mut last = self.last_prune.lock();
        if last.elapsed() < PRUNE_INTERVAL {
            return;
        }
        *last = Instant::now();
        drop(last);

        if self.kinds.len() > PRUNE_THRESHOLD {
            self.prune_beyond(viewer, PRUNE_KEEP_RADIUS);
        }
    }

    fn prune_beyond(&self, viewer: CellPos, keep_radius: i32) {
        self.kinds
            .retain(|cell, _| cell.chebyshev_distance(viewer) <= keep_radius);
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn clear(&self) {
        self.kinds.clear();
    }
}
