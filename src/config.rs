// src/config.rs
//! Engine configuration.
//!
//! One plain struct holds every tunable; the host owns persistence and
//! hands the engine a fresh copy through `CullingEngine::on_config_changed`.
//! `apply` is the hot-reload surface behind a `set <option> <value>` style
//! command: option names are matched case-insensitively against the same
//! camelCase keys the serialized form uses.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// All culling tunables. Field names serialize in camelCase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CullingConfig {
    pub occlusion_culling_enabled: bool,
    pub underground_culling_enabled: bool,
    /// How hard the raycaster tries to prove occlusion, in [0, 1].
    pub occlusion_aggressiveness: f32,
    pub occlusion_cache_size: usize,

    pub entity_culling_enabled: bool,
    pub entity_culling_distance: f32,
    #[serde(rename = "entityLODEnabled")]
    pub entity_lod_enabled: bool,

    pub particle_culling_enabled: bool,
    pub particle_culling_distance: f32,
    pub max_particles: usize,

    pub block_entity_culling_enabled: bool,
    pub block_entity_caching_enabled: bool,

    pub thread_count: usize,

    pub enhanced_frustum_culling: bool,
    /// Reserved: accepted and persisted, consulted by no algorithm yet.
    pub portal_detection: bool,

    pub cache_expiration_time_ms: u64,
    pub max_raycast_distance: f32,

    pub max_cache_size: usize,
    pub cache_validity_ms: u64,

    /// Name substrings whose particles are exempt from distance culling.
    pub important_particles: Vec<String>,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            occlusion_culling_enabled: true,
            underground_culling_enabled: true,
            occlusion_aggressiveness: 0.8,
            occlusion_cache_size: 2048,
            entity_culling_enabled: true,
            entity_culling_distance: 128.0,
            entity_lod_enabled: true,
            particle_culling_enabled: true,
            particle_culling_distance: 64.0,
            max_particles: 4000,
            block_entity_culling_enabled: true,
            block_entity_caching_enabled: true,
            thread_count: default_thread_count(),
            enhanced_frustum_culling: true,
            portal_detection: true,
            cache_expiration_time_ms: 1000,
            max_raycast_distance: 256.0,
            max_cache_size: 4096,
            cache_validity_ms: 150,
            important_particles: ["redstone", "portal", "note", "flame", "lava", "water"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Leave two cores for the render and main threads, never fewer than two
/// workers.
fn default_thread_count() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    cores.saturating_sub(2).max(2)
}

impl CullingConfig {
    /// Apply one hot-reloaded key/value pair. Option names match the
    /// serialized camelCase keys, case-insensitively.
    pub fn apply(&mut self, option: &str, value: &str) -> Result<()> {
        match option.to_ascii_lowercase().as_str() {
            "occlusioncullingenabled" => self.occlusion_culling_enabled = value.parse()?,
            "undergroundcullingenabled" => self.underground_culling_enabled = value.parse()?,
            "occlusionaggressiveness" => {
                self.occlusion_aggressiveness = value.parse::<f32>()?.clamp(0.0, 1.0);
            }
            "occlusioncachesize" => self.occlusion_cache_size = value.parse()?,
            "entitycullingenabled" => self.entity_culling_enabled = value.parse()?,
            "entitycullingdistance" => self.entity_culling_distance = value.parse()?,
            "entitylodenabled" => self.entity_lod_enabled = value.parse()?,
            "particlecullingenabled" => self.particle_culling_enabled = value.parse()?,
            "particlecullingdistance" => self.particle_culling_distance = value.parse()?,
            "maxparticles" => self.max_particles = value.parse()?,
            "blockentitycullingenabled" => self.block_entity_culling_enabled = value.parse()?,
            "blockentitycachingenabled" => self.block_entity_caching_enabled = value.parse()?,
            "threadcount" => self.thread_count = value.parse()?,
            "enhancedfrustumculling" => self.enhanced_frustum_culling = value.parse()?,
            "portaldetection" => self.portal_detection = value.parse()?,
            "cacheexpirationtimems" => self.cache_expiration_time_ms = value.parse()?,
            "maxraycastdistance" => self.max_raycast_distance = value.parse()?,
            "maxcachesize" => self.max_cache_size = value.parse()?,
            "cachevalidityms" => self.cache_validity_ms = value.parse()?,
            "importantparticles" => {
                self.important_particles = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            _ => return Err(Error::UnknownOption(option.to_string())),
        }
        Ok(())
    }

    /// True if a particle name matches one of the important substrings.
    pub fn is_important_name(&self, name: &str) -> bool {
        let lowered = name.to_ascii_lowercase();
        self.important_particles
            .iter()
            .any(|pat| lowered.contains(pat.as_str()))
    }
}
