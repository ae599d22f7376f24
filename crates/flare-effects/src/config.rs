//! Effects configuration.
//!
//! Tunables shared by the group manager, the mesh extractor and the
//! dispatcher. Loaded as part of the engine configuration file.

use flare_kernel::{DEFAULT_POOL_CAPACITY, THREADS_PER_GROUP};
use serde::{Deserialize, Serialize};

use crate::trail::DEFAULT_MAX_TRAIL_STEPS;

/// Default hard cap on extracted mesh triangles.
pub const DEFAULT_MAX_MESH_TRIANGLES: u32 = 4096;

/// Default normal dot product above which two triangles count as coplanar.
pub const DEFAULT_COPLANAR_THRESHOLD: f32 = 0.99;

/// Default spatial quantization step for edge keys.
pub const DEFAULT_EDGE_EPSILON: f32 = 1e-4;

/// Effects configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    /// Particle pool capacity shared by every emitter
    pub pool_capacity: u32,
    /// Maximum number of triangles a mesh emitter keeps
    pub max_mesh_triangles: u32,
    /// Normal dot product above which a shared edge is internal
    pub coplanar_threshold: f32,
    /// Quantization step used when matching edge endpoints
    pub edge_epsilon: f32,
    /// Threads per compute workgroup
    pub threads_per_group: u32,
    /// Auto-stop duration for newly created groups (0 = never)
    pub default_auto_stop: f32,
    /// Most trail sub-steps one emitter queues per frame
    pub max_trail_steps: u32,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            pool_capacity: DEFAULT_POOL_CAPACITY,
            max_mesh_triangles: DEFAULT_MAX_MESH_TRIANGLES,
            coplanar_threshold: DEFAULT_COPLANAR_THRESHOLD,
            edge_epsilon: DEFAULT_EDGE_EPSILON,
            threads_per_group: THREADS_PER_GROUP,
            default_auto_stop: 0.0,
            max_trail_steps: DEFAULT_MAX_TRAIL_STEPS,
        }
    }
}

impl EffectsConfig {
    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        self.pool_capacity = self.pool_capacity.clamp(1, 1 << 24);
        self.max_mesh_triangles = self.max_mesh_triangles.clamp(1, 1 << 20);
        self.coplanar_threshold = self.coplanar_threshold.clamp(-1.0, 1.0);
        if !(self.edge_epsilon.is_finite() && self.edge_epsilon > 0.0) {
            self.edge_epsilon = DEFAULT_EDGE_EPSILON;
        }
        self.threads_per_group = self.threads_per_group.clamp(1, THREADS_PER_GROUP);
        self.default_auto_stop = self.default_auto_stop.max(0.0);
        self.max_trail_steps = self.max_trail_steps.clamp(1, 1 << 16);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EffectsConfig::default();
        assert_eq!(config.pool_capacity, 65536);
        assert_eq!(config.threads_per_group, 1024);
        assert!((config.coplanar_threshold - 0.99).abs() < f32::EPSILON);
        assert!((config.edge_epsilon - 1e-4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_validation() {
        let mut config = EffectsConfig {
            pool_capacity: 0,
            coplanar_threshold: 3.0,
            edge_epsilon: -1.0,
            threads_per_group: 0,
            default_auto_stop: -5.0,
            max_trail_steps: 0,
            ..EffectsConfig::default()
        };

        config.validate();

        assert_eq!(config.pool_capacity, 1);
        assert!((config.coplanar_threshold - 1.0).abs() < f32::EPSILON);
        assert!((config.edge_epsilon - DEFAULT_EDGE_EPSILON).abs() < f32::EPSILON);
        assert_eq!(config.threads_per_group, 1);
        assert!(config.default_auto_stop.abs() < f32::EPSILON);
        assert_eq!(config.max_trail_steps, 1);

        config.max_trail_steps = u32::MAX;
        config.validate();
        assert_eq!(config.max_trail_steps, 1 << 16);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EffectsConfig =
            serde_json::from_str(r#"{"pool_capacity": 128}"#).expect("parse");
        assert_eq!(config.pool_capacity, 128);
        assert_eq!(config.max_mesh_triangles, DEFAULT_MAX_MESH_TRIANGLES);
    }
}
