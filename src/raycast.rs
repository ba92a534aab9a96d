// src/raycast.rs
//! Sampled occlusion raycasts.
//!
//! Walks evenly spaced sample points between two world positions and
//! counts opaque voxels to estimate whether geometry blocks the line.
//! Every uncertain answer (unloaded voxel, out-of-range target) resolves
//! fail-open: "not occluded" / "has line of sight".

use glam::{IVec3, Vec3};

use crate::world::WorldView;

const BASE_STEP: f32 = 0.75;

/// Deterministic sampled line tests between two points.
#[derive(Debug, Clone, Copy)]
pub struct OcclusionRaycaster {
    /// Targets farther than this are never reported occluded.
    max_distance: f32,
    /// Range cap of the coarse line-of-sight variant.
    sight_distance: f32,
}

impl Default for OcclusionRaycaster {
    fn default() -> Self {
        Self::new(256.0)
    }
}

impl OcclusionRaycaster {
    pub fn new(max_distance: f32) -> Self {
        Self {
            max_distance,
            sight_distance: max_distance / 2.0,
        }
    }

    /// Estimate whether opaque geometry blocks the line from `origin` to
    /// `target`. Higher `aggressiveness` samples more densely and accepts
    /// fewer opaque hits before declaring occlusion.
    pub fn is_occluded<W: WorldView + ?Sized>(
        &self,
        world: &W,
        origin: Vec3,
        target: Vec3,
        aggressiveness: f32,
    ) -> bool {
        let distance = origin.distance(target);
        if distance > self.max_distance {
            return false;
        }

        let direction = (target - origin).normalize_or_zero();
        if direction == Vec3::ZERO {
            return false;
        }

        // 2 hits at aggressiveness 0, up to 6 at 1; denser steps when
        // aggressive.
        let required_opaque_hits = (2.0 + aggressiveness * 4.0) as u32;
        let step_size = BASE_STEP * (1.8 - aggressiveness * 0.8);
        let max_steps = (distance / step_size) as i32;

        let mut opaque_hits = 0u32;
        let mut total_samples = 0u32;
        let mut consecutive_air = 0u32;
        let mut consecutive_opaque = 0u32;
        let mut last_pos: Option<IVec3> = None;

        for i in 1..max_steps {
            let point = origin + direction * (i as f32 * step_size);
            let pos = voxel_of(point);

            if last_pos == Some(pos) {
                continue;
            }
            last_pos = Some(pos);

            total_samples += 1;

            // Sparse scene: nothing hit in the first stretch, give up.
            if total_samples > 15 && opaque_hits == 0 {
                return false;
            }

            let Some(sample) = world.sample(pos) else {
                // Unloaded voxel: uncertainty favors rendering.
                return false;
            };

            if sample.opaque() {
                opaque_hits += 1;
                consecutive_opaque += 1;
                consecutive_air = 0;

                if consecutive_opaque >= 3 {
                    return true;
                }
                if opaque_hits >= required_opaque_hits {
                    return true;
                }
            } else {
                consecutive_air += 1;
                consecutive_opaque = 0;
            }

            // A long air run after partial hits means the "wall" is broken;
            // abandon the occlusion attempt.
            if consecutive_air > 8 && opaque_hits > 0 && opaque_hits < required_opaque_hits {
                return false;
            }
        }

        false
    }

    /// Coarser single-target variant: one-unit steps, occluded after two
    /// opaque-and-occluding voxels. Used for individual dynamic objects
    /// rather than whole cells.
    pub fn has_line_of_sight<W: WorldView + ?Sized>(
        &self,
        world: &W,
        from: Vec3,
        to: Vec3,
    ) -> bool {
        let distance = from.distance(to);
        if distance > self.sight_distance {
            return true;
        }

        let direction = (to - from).normalize_or_zero();
        if direction == Vec3::ZERO {
            return true;
        }

        let step_size = 1.0;
        let max_steps = (distance / step_size) as i32;

        let mut last_pos: Option<IVec3> = None;
        let mut opaque_blocks = 0u32;

        for i in 1..max_steps {
            let point = from + direction * (i as f32 * step_size);
            let pos = voxel_of(point);

            if last_pos == Some(pos) {
                continue;
            }
            last_pos = Some(pos);

            let Some(sample) = world.sample(pos) else {
                return true;
            };

            if sample.opaque() && sample.occluding {
                opaque_blocks += 1;
                if opaque_blocks >= 2 {
                    return false;
                }
            }
        }

        true
    }
}

#[inline]
fn voxel_of(point: Vec3) -> IVec3 {
    IVec3::new(
        point.x.floor() as i32,
        point.y.floor() as i32,
        point.z.floor() as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellPos;
    use crate::world::BlockSample;
    use std::collections::HashSet;

    /// Axis-aligned voxel world for ray tests: a set of opaque voxels,
    /// optionally reporting everything as unloaded.
    struct VoxelWorld {
        opaque: HashSet<IVec3>,
        loaded: bool,
        all_solid: bool,
    }

    impl VoxelWorld {
        fn empty() -> Self {
            Self {
                opaque: HashSet::new(),
                loaded: true,
                all_solid: false,
            }
        }

        /// Single-voxel-thick walls crossing the +X ray at the given x
        /// coordinates.
        fn with_walls(xs: &[i32]) -> Self {
            let mut world = Self::empty();
            for &x in xs {
                world.opaque.insert(IVec3::new(x, 70, 0));
            }
            world
        }
    }

    impl WorldView for VoxelWorld {
        fn sample(&self, pos: IVec3) -> Option<BlockSample> {
            if !self.loaded {
                return None;
            }
            if self.all_solid || self.opaque.contains(&pos) {
                Some(BlockSample::SOLID)
            } else {
                Some(BlockSample::AIR)
            }
        }

        fn surface_height(&self, _x: i32, _z: i32) -> Option<i32> {
            Some(64)
        }

        fn terrain_label(&self, _cell: CellPos) -> Option<String> {
            None
        }

        fn dynamic_positions(&self) -> Vec<Vec3> {
            Vec::new()
        }
    }

    const ORIGIN: Vec3 = Vec3::new(0.5, 70.5, 0.5);
    const TARGET: Vec3 = Vec3::new(100.5, 70.5, 0.5);

    #[test]
    fn aggressiveness_zero_occludes_after_two_hits() {
        // Separated thin walls: the second hit reaches the required count.
        let world = VoxelWorld::with_walls(&[8, 12, 16, 20, 24]);
        let ray = OcclusionRaycaster::default();
        assert!(ray.is_occluded(&world, ORIGIN, TARGET, 0.0));
    }

    #[test]
    fn aggressiveness_one_requires_six_hits() {
        let ray = OcclusionRaycaster::default();

        // Five thin walls: the air run after the last one breaks the
        // occlusion attempt before six hits accumulate.
        let five = VoxelWorld::with_walls(&[8, 12, 16, 20, 24]);
        assert!(!ray.is_occluded(&five, ORIGIN, TARGET, 1.0));

        let six = VoxelWorld::with_walls(&[8, 12, 16, 20, 24, 28]);
        assert!(ray.is_occluded(&six, ORIGIN, TARGET, 1.0));
    }

    #[test]
    fn thick_wall_occludes_via_consecutive_run() {
        let mut world = VoxelWorld::empty();
        for x in 20..=26 {
            world.opaque.insert(IVec3::new(x, 70, 0));
        }
        let ray = OcclusionRaycaster::default();
        assert!(ray.is_occluded(&world, ORIGIN, TARGET, 0.0));
    }

    #[test]
    fn out_of_range_targets_are_never_occluded() {
        let mut world = VoxelWorld::empty();
        world.all_solid = true;
        let ray = OcclusionRaycaster::default();
        let far = Vec3::new(300.5, 70.5, 0.5);
        assert!(!ray.is_occluded(&world, ORIGIN, far, 1.0));
    }

    #[test]
    fn unloaded_world_fails_open() {
        let mut world = VoxelWorld::with_walls(&[20, 21, 22, 23]);
        world.loaded = false;
        let ray = OcclusionRaycaster::default();
        assert!(!ray.is_occluded(&world, ORIGIN, TARGET, 1.0));
        assert!(ray.has_line_of_sight(&world, ORIGIN, TARGET));
    }

    #[test]
    fn empty_world_is_never_occluded() {
        let world = VoxelWorld::empty();
        let ray = OcclusionRaycaster::default();
        assert!(!ray.is_occluded(&world, ORIGIN, TARGET, 0.5));
        assert!(ray.has_line_of_sight(&world, ORIGIN, TARGET));
    }

    #[test]
    fn line_of_sight_blocked_by_two_occluding_voxels() {
        let world = VoxelWorld::with_walls(&[20, 25]);
        let ray = OcclusionRaycaster::default();
        assert!(!ray.has_line_of_sight(&world, ORIGIN, TARGET));
    }

    #[test]
    fn line_of_sight_ignores_non_occluding_solids() {
        let mut world = VoxelWorld::empty();
        // Solid but light-passing (e.g. glass-like) voxels.
        let glass = BlockSample {
            air: false,
            solid: true,
            occluding: false,
        };
        struct GlassWorld(VoxelWorld, BlockSample);
        impl WorldView for GlassWorld {
            fn sample(&self, pos: IVec3) -> Option<BlockSample> {
                if self.0.opaque.contains(&pos) {
                    Some(self.1)
                } else {
                    Some(BlockSample::AIR)
                }
            }
            fn surface_height(&self, _x: i32, _z: i32) -> Option<i32> {
                Some(64)
            }
            fn terrain_label(&self, _cell: CellPos) -> Option<String> {
                None
            }
            fn dynamic_positions(&self) -> Vec<Vec3> {
                Vec::new()
            }
        }
        world.opaque.insert(IVec3::new(20, 70, 0));
        world.opaque.insert(IVec3::new(25, 70, 0));
        let world = GlassWorld(world, glass);
        let ray = OcclusionRaycaster::default();
        assert!(ray.has_line_of_sight(&world, ORIGIN, TARGET));
    }

    #[test]
    fn beyond_sight_cap_is_always_visible() {
        let mut world = VoxelWorld::empty();
        world.all_solid = true;
        let ray = OcclusionRaycaster::default();
        let far = Vec3::new(200.5, 70.5, 0.5);
        assert!(ray.has_line_of_sight(&world, ORIGIN, far));
    }
}
