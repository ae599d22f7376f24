//! Spawn-time particle parameters shared by every shape of an emitter.

use flare_kernel::SpawnBlock;
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Base values and symmetric variances for newly spawned particles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpawnParameters {
    /// Lifetime in seconds
    pub lifetime: f32,
    /// Lifetime variance in seconds
    pub lifetime_variance: f32,
    /// Scale per axis
    pub scale: Vec3,
    /// Scale variance per axis
    pub scale_variance: Vec3,
    /// Rotation in radians
    pub rotation: f32,
    /// Rotation variance in radians
    pub rotation_variance: f32,
    /// Rotation speed in radians per second
    pub rotation_speed: f32,
    /// Rotation speed variance
    pub rotation_speed_variance: f32,
    /// Initial velocity
    pub velocity: Vec3,
    /// Velocity variance per axis
    pub velocity_variance: Vec3,
    /// RGBA color
    pub color: Vec4,
    /// RGBA color variance
    pub color_variance: Vec4,
    /// Face the camera
    pub billboard: bool,
}

impl Default for SpawnParameters {
    fn default() -> Self {
        Self {
            lifetime: 1.0,
            lifetime_variance: 0.0,
            scale: Vec3::ONE,
            scale_variance: Vec3::ZERO,
            rotation: 0.0,
            rotation_variance: 0.0,
            rotation_speed: 0.0,
            rotation_speed_variance: 0.0,
            velocity: Vec3::ZERO,
            velocity_variance: Vec3::ZERO,
            color: Vec4::ONE,
            color_variance: Vec4::ZERO,
            billboard: true,
        }
    }
}

impl SpawnParameters {
    /// Builds the GPU block.
    ///
    /// `lifetime_override` replaces the lifetime (and drops its variance);
    /// `scale_multiplier` multiplies both scale and its variance.
    #[must_use]
    pub fn to_block(&self, lifetime_override: Option<f32>, scale_multiplier: Vec3) -> SpawnBlock {
        let (lifetime, lifetime_variance) = match lifetime_override {
            Some(lifetime) => (lifetime, 0.0),
            None => (self.lifetime, self.lifetime_variance),
        };

        SpawnBlock {
            lifetime,
            lifetime_variance,
            rotation: self.rotation,
            rotation_variance: self.rotation_variance,
            rotation_speed: self.rotation_speed,
            rotation_speed_variance: self.rotation_speed_variance,
            billboard: u32::from(self.billboard),
            scale: (self.scale * scale_multiplier).to_array(),
            scale_variance: (self.scale_variance * scale_multiplier).to_array(),
            velocity: self.velocity.to_array(),
            velocity_variance: self.velocity_variance.to_array(),
            color: self.color.to_array(),
            color_variance: self.color_variance.to_array(),
            ..SpawnBlock::default()
        }
    }
}
