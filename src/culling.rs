// src/culling.rs
//! Per-frame cull orchestration.
//!
//! `CullingEngine` is the engine handle the host keeps for the session: it
//! owns the configuration, every cache, the worker pool and the current
//! frame's visibility map. Once per frame the host calls `cull_pass`; the
//! candidate cells inside render distance are partitioned into contiguous
//! batches, evaluated concurrently through the decision pipeline, and the
//! verdicts land in a frame map that readers query through `is_visible`
//! (absent cells read as visible).
//!
//! The pass blocks on a completion latch bounded by an adaptive timeout
//! seeded from the previous pass's duration. On timeout the frame proceeds
//! with partial results; in-flight batches keep running and their late
//! writes are harmless because every shared structure is concurrent.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use glam::{IVec3, Vec3};
use parking_lot::RwLock;

use crate::config::CullingConfig;
use crate::density::DensityOptimizer;
use crate::frustum::FrustumPlanes;
use crate::grid::{CellPos, CELL_SIZE};
use crate::raycast::OcclusionRaycaster;
use crate::region::RegionClassifier;
use crate::render_cache::RenderDecisionCache;
use crate::visibility_cache::{VisibilityCache, VisibilityRecord};
use crate::worker_pool::{FrameLatch, WorkerPool};
use crate::world::WorldView;

/// Bounding-sphere radius used for the per-cell frustum test. Generous on
/// purpose: the sphere must cover the cell's full vertical extent.
const CELL_BOUNDING_RADIUS: f32 = 128.5;

/// Clamp window for the adaptive per-pass timeout.
const MIN_PASS_TIMEOUT_MS: u64 = 3;
const MAX_PASS_TIMEOUT_MS: u64 = 16;

/// Seed duration before the first pass has been measured.
const INITIAL_PASS_NANOS: u64 = 5_000_000;

/// The visibility cache is swept roughly once per this many evaluated
/// cells, tracked by a counter independent of any per-frame state.
const SWEEP_EVERY_CELLS: u64 = 100;

/// Occlusion raycasts only pay off in this distance band: closer cells are
/// almost always visible, farther ones fall to the distance check.
const RAYCAST_BAND_NEAR: f32 = 64.0;
const RAYCAST_BAND_FAR: f32 = 192.0;

/// Underground culling only applies to cameras at or above this height.
const SURFACE_CAMERA_MIN_Y: f32 = 63.0;

/// Minimum height of the camera above a cell's average surface before the
/// cell can count as sealed underground.
const UNDERGROUND_MIN_DEPTH: f32 = 32.0;

/// Fallback when the heightmap is unavailable.
const DEFAULT_SURFACE_HEIGHT: i32 = 64;

/// Consecutive open cells that count as a vertical opening.
const OPENING_RUN: u32 = 4;

/// Depth of the vertical-opening scan, in cells below the camera.
const OPENING_SCAN_DEPTH: i32 = 20;

/// Solid fraction of the overhead sample above which a cell is sealed.
const SEALED_COVERAGE: f32 = 0.6;

const POOL_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Aggregate culling statistics for the stats overlay.
#[derive(Debug, Clone, Copy)]
pub struct CullingStats {
    pub total_cells: usize,
    pub culled_cells: usize,
    pub efficiency_percent: f32,
    pub last_pass: Duration,
}

/// Cache set rebuilt wholesale whenever the configuration changes.
struct CacheSet {
    visibility: VisibilityCache,
    render: RenderDecisionCache,
    raycaster: OcclusionRaycaster,
}

impl CacheSet {
    fn from_config(config: &CullingConfig) -> Self {
        Self {
            visibility: VisibilityCache::new(
                config.occlusion_cache_size,
                Duration::from_millis(config.cache_expiration_time_ms),
            ),
            render: RenderDecisionCache::new(
                config.max_cache_size,
                Duration::from_millis(config.cache_validity_ms),
            ),
            raycaster: OcclusionRaycaster::new(config.max_raycast_distance),
        }
    }
}

/// The per-frame coordinator and session-wide engine handle.
pub struct CullingEngine {
    config: RwLock<CullingConfig>,
    caches: RwLock<CacheSet>,
    regions: RegionClassifier,
    density: DensityOptimizer,
    pool: WorkerPool,

    /// Frame-scoped cell -> visible map. Rebuilt each pass; readers may
    /// observe the previous frame until the new pass lands.
    visible: DashMap<CellPos, bool>,

    /// Average surface height per cell, computed once per session.
    surface_heights: DashMap<CellPos, i32>,

    total_cells: AtomicUsize,
    culled_cells: AtomicUsize,
    last_pass_nanos: AtomicU64,
    cells_since_sweep: AtomicU64,
}

impl CullingEngine {
    pub fn new(config: CullingConfig) -> Arc<Self> {
        let caches = CacheSet::from_config(&config);
        let pool = WorkerPool::new(config.thread_count);
        Arc::new(Self {
            config: RwLock::new(config),
            caches: RwLock::new(caches),
            regions: RegionClassifier::new(),
            density: DensityOptimizer::new(),
            pool,
            visible: DashMap::new(),
            surface_heights: DashMap::new(),
            total_cells: AtomicUsize::new(0),
            culled_cells: AtomicUsize::new(0),
            last_pass_nanos: AtomicU64::new(INITIAL_PASS_NANOS),
            cells_since_sweep: AtomicU64::new(0),
        })
    }

    // ------------------------------------------------------------------------
    // Per-frame pass
    // ------------------------------------------------------------------------

    /// Run one culling pass. Called by the host once per render frame.
    pub fn cull_pass<W>(
        self: &Arc<Self>,
        world: &Arc<W>,
        camera: Vec3,
        frustum: FrustumPlanes,
        render_distance: i32,
    ) where
        W: WorldView + ?Sized + 'static,
    {
        let config = Arc::new(self.config.read().clone());
        if !config.occlusion_culling_enabled {
            return;
        }

        // Rate-limited internally; cheap to call every frame.
        self.density.refresh(world.as_ref());

        let camera_cell = CellPos::from_world(camera);

        self.visible.clear();
        self.total_cells.store(0, Ordering::Relaxed);
        self.culled_cells.store(0, Ordering::Relaxed);

        if self.cells_since_sweep.load(Ordering::Relaxed) >= SWEEP_EVERY_CELLS {
            self.cells_since_sweep.store(0, Ordering::Relaxed);
            self.caches.read().visibility.sweep_expired();
        }

        let side = (render_distance * 2 + 1) as usize;
        let mut candidates = Vec::with_capacity(side * side);
        for dx in -render_distance..=render_distance {
            for dz in -render_distance..=render_distance {
                candidates.push(camera_cell.offset(dx, dz));
            }
        }
        self.total_cells.store(candidates.len(), Ordering::Relaxed);

        let batches = partition_batches(candidates.len(), self.pool.thread_count());
        let latch = Arc::new(FrameLatch::new(batches.len()));
        let candidates: Arc<[CellPos]> = candidates.into();

        let start = Instant::now();

        for range in batches {
            let engine = Arc::clone(self);
            let world = Arc::clone(world);
            let config = Arc::clone(&config);
            let candidates = Arc::clone(&candidates);
            let guard = latch.guard();

            self.pool.execute(move || {
                let _guard = guard;
                for &cell in &candidates[range] {
                    let visible = engine.evaluate_cell(
                        world.as_ref(),
                        &config,
                        cell,
                        camera,
                        camera_cell,
                        &frustum,
                    );
                    if !visible {
                        engine.culled_cells.fetch_add(1, Ordering::Relaxed);
                    }
                    engine.visible.insert(cell, visible);
                }
            });
        }

        let timeout = self.pass_timeout();
        if !latch.wait_timeout(timeout) {
            log::debug!(
                "cull pass exceeded its {:?} budget; continuing with partial results",
                timeout
            );
        }

        self.last_pass_nanos
            .store(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
        self.cells_since_sweep
            .fetch_add(candidates.len() as u64, Ordering::Relaxed);

        log::trace!(
            "cull pass: {} candidates, {} culled",
            self.total_cells.load(Ordering::Relaxed),
            self.culled_cells.load(Ordering::Relaxed),
        );
    }

    /// Adaptive completion budget: the previous pass's duration, clamped.
    fn pass_timeout(&self) -> Duration {
        let previous_ms = self.last_pass_nanos.load(Ordering::Relaxed) / 1_000_000;
        Duration::from_millis(previous_ms.clamp(MIN_PASS_TIMEOUT_MS, MAX_PASS_TIMEOUT_MS))
    }

    // ------------------------------------------------------------------------
    // Per-cell decision procedure
    // ------------------------------------------------------------------------

    /// First matching branch wins; every computed verdict (not the cache
    /// hits) is written back into both caches.
    fn evaluate_cell<W: WorldView + ?Sized>(
        &self,
        world: &W,
        config: &CullingConfig,
        cell: CellPos,
        camera: Vec3,
        camera_cell: CellPos,
        frustum: &FrustumPlanes,
    ) -> bool {
        // The camera's own cell is never culled.
        if cell == camera_cell {
            self.cache_result(cell, true, 0.0);
            return true;
        }

        {
            let caches = self.caches.read();

            if caches.render.has_valid(cell) {
                let verdict = caches.render.should_render(cell);
                log::trace!("{cell:?}: render cache hit: {verdict}");
                return verdict;
            }

            if let Some(record) = caches.visibility.get(cell) {
                if !record.is_expired(caches.visibility.ttl()) {
                    log::trace!("{cell:?}: visibility cache hit: {}", record.visible);
                    return record.visible;
                }
            }
        }

        let center = cell.center();
        let distance = camera.distance(center);

        let profile = self.regions.profile_for(world, cell, camera_cell);
        let density = self.density.settings_for(cell);

        if config.enhanced_frustum_culling
            && !frustum.intersects_sphere(center, CELL_BOUNDING_RADIUS)
        {
            log::trace!("{cell:?}: outside frustum, culled");
            self.cache_result(cell, false, distance);
            return false;
        }

        if config.underground_culling_enabled && self.underground_culled(world, cell, camera) {
            log::trace!("{cell:?}: sealed underground, culled");
            self.cache_result(cell, false, distance);
            return false;
        }

        if distance > profile.culling_distance {
            log::trace!(
                "{cell:?}: beyond region culling distance ({distance:.1} > {:.1}), culled",
                profile.culling_distance
            );
            self.cache_result(cell, false, distance);
            return false;
        }

        if !density.skip_detailed_checks && in_raycast_band(distance) {
            let aggressiveness = config
                .occlusion_aggressiveness
                .max(profile.aggressiveness);
            let occluded = self
                .caches
                .read()
                .raycaster
                .is_occluded(world, camera, center, aggressiveness);
            log::trace!("{cell:?}: raycast (aggr {aggressiveness:.2}): occluded={occluded}");
            if occluded {
                self.cache_result(cell, false, distance);
                return false;
            }
        }

        self.cache_result(cell, true, distance);
        true
    }

    fn cache_result(&self, cell: CellPos, visible: bool, distance: f32) {
        let caches = self.caches.read();
        caches.visibility.put(cell, VisibilityRecord::new(visible));
        caches.render.cache_decision(cell, visible, distance);
    }

    // ------------------------------------------------------------------------
    // Underground heuristic
    // ------------------------------------------------------------------------

    /// A cell is culled as sealed underground only when the camera is on
    /// the surface, well above the cell's average terrain, no vertical
    /// opening leads down into it, and the layer just below the camera is
    /// mostly solid.
    fn underground_culled<W: WorldView + ?Sized>(
        &self,
        world: &W,
        cell: CellPos,
        camera: Vec3,
    ) -> bool {
        if camera.y < SURFACE_CAMERA_MIN_Y {
            return false;
        }

        let avg_height = match self.surface_heights.get(&cell) {
            Some(cached) => *cached,
            None => {
                let computed = average_surface_height(world, cell);
                self.surface_heights.insert(cell, computed);
                computed
            }
        };

        if camera.y - (avg_height as f32) < UNDERGROUND_MIN_DEPTH {
            return false;
        }

        if has_vertical_opening(world, cell, camera) {
            return false;
        }

        // Sparse 4x4 sample one voxel below camera height.
        let y = camera.y as i32 - 1;
        let mut samples = 0u32;
        let mut solid = 0u32;
        for x in (0..CELL_SIZE).step_by(4) {
            for z in (0..CELL_SIZE).step_by(4) {
                samples += 1;
                let pos = IVec3::new(cell.min_block_x() + x, y, cell.min_block_z() + z);
                let Some(sample) = world.sample(pos) else {
                    continue;
                };
                if sample.opaque() {
                    solid += 1;
                }
            }
        }

        solid as f32 / samples as f32 > SEALED_COVERAGE
    }

    // ------------------------------------------------------------------------
    // Queries & lifecycle
    // ------------------------------------------------------------------------

    /// Frame-map lookup. Cells without a verdict this frame are visible.
    pub fn is_visible(&self, cell: CellPos) -> bool {
        self.visible.get(&cell).map(|v| *v).unwrap_or(true)
    }

    /// Fast-path verdict for collaborators culling individual objects.
    pub fn should_render_cached(&self, cell: CellPos) -> bool {
        self.caches.read().render.should_render(cell)
    }

    /// Standalone raycast utility, independent of cell culling.
    pub fn has_line_of_sight<W: WorldView + ?Sized>(
        &self,
        world: &W,
        from: Vec3,
        to: Vec3,
    ) -> bool {
        self.caches.read().raycaster.has_line_of_sight(world, from, to)
    }

    /// Drop a cell's cached render verdict after its content changed.
    pub fn invalidate(&self, cell: CellPos) {
        self.caches.read().render.invalidate(cell);
    }

    /// Area form of [`CullingEngine::invalidate`].
    pub fn invalidate_area(&self, center: CellPos, radius: i32) {
        self.caches.read().render.invalidate_area(center, radius);
    }

    pub fn stats_snapshot(&self) -> CullingStats {
        let total = self.total_cells.load(Ordering::Relaxed);
        let culled = self.culled_cells.load(Ordering::Relaxed);
        let efficiency_percent = if total == 0 {
            0.0
        } else {
            culled as f32 * 100.0 / total as f32
        };
        CullingStats {
            total_cells: total,
            culled_cells: culled,
            efficiency_percent,
            last_pass: Duration::from_nanos(self.last_pass_nanos.load(Ordering::Relaxed)),
        }
    }

    /// Snapshot of the current configuration, for collaborators that need
    /// the entity/particle tunables.
    pub fn config(&self) -> CullingConfig {
        self.config.read().clone()
    }

    pub fn clear_all_caches(&self) {
        {
            let caches = self.caches.read();
            caches.visibility.clear();
            caches.render.clear();
        }
        self.regions.clear();
        self.density.clear();
        self.surface_heights.clear();
        self.visible.clear();
    }

    /// Swap in a new configuration. Caches are rebuilt with the new sizes
    /// and TTLs; the pool restarts only if the thread count changed.
    pub fn on_config_changed(&self, new_config: CullingConfig) {
        let old_threads = self.config.read().thread_count;

        *self.caches.write() = CacheSet::from_config(&new_config);
        self.regions.clear();
        self.density.clear();
        self.surface_heights.clear();

        if new_config.thread_count != old_threads {
            self.pool
                .resize(new_config.thread_count, POOL_SHUTDOWN_GRACE);
        }

        *self.config.write() = new_config;
        log::info!("culling configuration updated");
    }

    /// The world was replaced (dimension change, disconnect): every cached
    /// verdict is stale.
    pub fn on_world_reset(&self) {
        self.clear_all_caches();
    }

    /// Graceful teardown of the worker pool. Safe to skip: workers are
    /// daemon-style and never block process exit.
    pub fn shutdown(&self) {
        self.pool.shutdown(POOL_SHUTDOWN_GRACE);
    }
}

/// Raycasts only pay off in the middle distance band.
#[inline]
fn in_raycast_band(distance: f32) -> bool {
    distance > RAYCAST_BAND_NEAR && distance < RAYCAST_BAND_FAR
}

/// Average heightmap height over a sparse sample of the cell's columns.
fn average_surface_height<W: WorldView + ?Sized>(world: &W, cell: CellPos) -> i32 {
    let mut total = 0i64;
    let mut samples = 0i64;
    for x in (0..CELL_SIZE).step_by(8) {
        for z in (0..CELL_SIZE).step_by(8) {
            if let Some(height) = world.surface_height(cell.min_block_x() + x, cell.min_block_z() + z)
            {
                total += height as i64;
                samples += 1;
            }
        }
    }
    if samples > 0 {
        (total / samples) as i32
    } else {
        DEFAULT_SURFACE_HEIGHT
    }
}

/// Scan a few sparse columns downward from camera height; a run of open
/// cells means the underground is reachable by sight and must not be
/// sealed away.
fn has_vertical_opening<W: WorldView + ?Sized>(world: &W, cell: CellPos, camera: Vec3) -> bool {
    for x in (4..CELL_SIZE).step_by(6) {
        for z in (4..CELL_SIZE).step_by(6) {
            let top = IVec3::new(
                cell.min_block_x() + x,
                camera.y as i32,
                cell.min_block_z() + z,
            );

            let mut air_run = 0u32;
            for dy in 0..OPENING_SCAN_DEPTH {
                let pos = IVec3::new(top.x, top.y - dy, top.z);
                let Some(sample) = world.sample(pos) else {
                    break;
                };
                if sample.air {
                    air_run += 1;
                    if air_run >= OPENING_RUN {
                        return true;
                    }
                } else {
                    air_run = 0;
                }
            }
        }
    }
    false
}

/// Split `count` items into at most `batches` contiguous ranges of nearly
/// equal size; the final batch absorbs the remainder.
fn partition_batches(count: usize, batches: usize) -> Vec<std::ops::Range<usize>> {
    if count == 0 || batches == 0 {
        return Vec::new();
    }

    let per_batch = (count / batches).max(1);
    let mut out = Vec::with_capacity(batches);
    for i in 0..batches {
        let start = i * per_batch;
        if start >= count {
            break;
        }
        let end = if i == batches - 1 {
            count
        } else {
            ((i + 1) * per_batch).min(count)
        };
        out.push(start..end);
    }
    out
}
