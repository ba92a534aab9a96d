// src/lib.rs
//! Permafrost: real-time chunk visibility culling for streamed voxel
//! worlds.
//!
//! Each frame the host render loop hands the engine its camera, frustum
//! and render distance; the engine decides, for every grid cell in range,
//! whether it is worth drawing, and publishes the verdicts with a bounded
//! latency budget. The pipeline combines:
//!
//! * frustum testing against per-cell bounding spheres,
//! * a sampled-raycast occlusion test,
//! * terrain-profile tuning (open terrain culls harder than dense cover),
//! * dynamic-object-density tiers that skip expensive checks where
//!   nothing moves,
//! * an underground heuristic that seals caves away from surface cameras,
//!
//! coordinated through a bounded worker pool with an adaptive per-frame
//! timeout. Every uncertain answer resolves fail-open: missing data is
//! rendered, never culled.
//!
//! The host supplies world access through the [`WorldView`] trait and
//! keeps one [`CullingEngine`] handle for the session:
//!
//! ```no_run
//! use std::sync::Arc;
//! use glam::{Mat4, Vec3};
//! use permafrost::{CullingConfig, CullingEngine, FrustumPlanes, CellPos};
//!
//! # fn view_proj() -> Mat4 { Mat4::IDENTITY }
//! # struct HostWorld;
//! # impl permafrost::WorldView for HostWorld {
//! #     fn sample(&self, _: glam::IVec3) -> Option<permafrost::BlockSample> { None }
//! #     fn surface_height(&self, _: i32, _: i32) -> Option<i32> { None }
//! #     fn terrain_label(&self, _: CellPos) -> Option<String> { None }
//! #     fn dynamic_positions(&self) -> Vec<Vec3> { Vec::new() }
//! # }
//! let engine = CullingEngine::new(CullingConfig::default());
//! let world: Arc<HostWorld> = Arc::new(HostWorld);
//!
//! // Once per frame:
//! let frustum = FrustumPlanes::from_view_proj(&view_proj());
//! engine.cull_pass(&world, Vec3::new(8.0, 70.0, 8.0), frustum, 12);
//!
//! // From the draw loop:
//! if engine.is_visible(CellPos::new(3, -2)) {
//!     // submit the cell's mesh
//! }
//! ```

pub mod config;
pub mod culling;
pub mod density;
pub mod error;
pub mod frustum;
pub mod grid;
pub mod raycast;
pub mod recency;
pub mod region;
pub mod render_cache;
pub mod visibility_cache;
pub mod worker_pool;
pub mod world;

pub use config::CullingConfig;
pub use culling::{CullingEngine, CullingStats};
pub use density::{DensityOptimizer, DensitySettings};
pub use error::{Error, Result};
pub use frustum::FrustumPlanes;
pub use grid::{CellPos, CELL_SIZE};
pub use raycast::OcclusionRaycaster;
pub use recency::RecencyTracker;
pub use region::{RegionClassifier, RegionProfile, TerrainKind};
pub use render_cache::{RenderDecision, RenderDecisionCache};
pub use visibility_cache::{VisibilityCache, VisibilityRecord};
pub use worker_pool::WorkerPool;
pub use world::{BlockSample, WorldView};
