// src/world.rs
//! World-access boundary.
//!
//! The engine never owns world data; the host hands it a `WorldView` and
//! every query that touches unloaded or missing data answers `None`, which
//! callers resolve fail-open (visible / not occluded).

use glam::{IVec3, Vec3};

use crate::grid::CellPos;

/// One sampled voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSample {
    /// True if the voxel holds no geometry at all.
    pub air: bool,
    /// True if the voxel renders as a full solid block.
    pub solid: bool,
    /// True if the voxel participates in occlusion (solid *and* light-tight).
    pub occluding: bool,
}

impl BlockSample {
    pub const AIR: BlockSample = BlockSample {
        air: true,
        solid: false,
        occluding: false,
    };

    pub const SOLID: BlockSample = BlockSample {
        air: false,
        solid: true,
        occluding: true,
    };

    /// Opaque for the purposes of the occlusion raycast.
    #[inline]
    pub fn opaque(&self) -> bool {
        !self.air && self.solid
    }
}

/// Read-only view of the streamed world, shared with worker threads.
pub trait WorldView: Send + Sync {
    /// Sample a single voxel. `None` means the containing region is not
    /// loaded; callers must treat that as uncertainty, never as solid.
    fn sample(&self, pos: IVec3) -> Option<BlockSample>;

    /// Surface height of the column at (x, z), if known.
    fn surface_height(&self, x: i32, z: i32) -> Option<i32>;

    /// Dominant terrain/biome label around the cell's midpoint, if the
    /// area is resolvable. Used only for region classification.
    fn terrain_label(&self, cell: CellPos) -> Option<String>;

    /// Positions of the dynamic objects currently relevant to rendering.
    /// Scanned wholesale by the density rebuild once per second.
    fn dynamic_positions(&self) -> Vec<Vec3>;
}
