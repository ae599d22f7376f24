//! Emission shapes and their interval schedule.
//!
//! An emitter has exactly one current [`EmissionShape`]. The shape holds the
//! placement and extent of the active kind plus an [`EmissionSchedule`] that
//! gates timer-driven emission. `configure` overwrites everything;
//! `retarget` only moves and orients the shape.

use std::fmt;

use flare_kernel::{
    BoxBlock, ConeBlock, MappedBlock, MeshBlock, ShapeTag, SphereBlock, TriangleBlock,
};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Kind of emission shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShapeKind {
    /// Sphere volume.
    #[default]
    Sphere,
    /// Box volume.
    Box,
    /// Single triangle.
    Triangle,
    /// Cone volume.
    Cone,
    /// Mesh surface, volume or edges.
    Mesh,
}

impl ShapeKind {
    /// Every shape kind.
    pub const ALL: [Self; 5] = [
        Self::Sphere,
        Self::Box,
        Self::Triangle,
        Self::Cone,
        Self::Mesh,
    ];

    /// Returns the tag written into the common block.
    #[must_use]
    pub const fn tag(self) -> ShapeTag {
        match self {
            Self::Sphere => ShapeTag::Sphere,
            Self::Box => ShapeTag::Box,
            Self::Triangle => ShapeTag::Triangle,
            Self::Cone => ShapeTag::Cone,
            Self::Mesh => ShapeTag::Mesh,
        }
    }

    /// Returns the document name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sphere => "Sphere",
            Self::Box => "Box",
            Self::Triangle => "Triangle",
            Self::Cone => "Cone",
            Self::Mesh => "Mesh",
        }
    }

    /// Parses a document name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the mesh shape picks points from its triangle list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MeshEmitMode {
    /// Area-weighted points on the surface.
    #[default]
    Surface,
    /// Points inside the mesh's bounding shell.
    Volume,
    /// Points on boundary edges.
    Edge,
}

impl MeshEmitMode {
    /// Value written into the mesh block.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Surface => 0,
            Self::Volume => 1,
            Self::Edge => 2,
        }
    }
}

/// Count, interval and timer state shared by every shape kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionSchedule {
    /// Particles requested per emission.
    pub count: u32,
    /// Seconds between timer-driven emissions.
    pub interval: f32,
    timer: f32,
    emit_now: bool,
}

impl EmissionSchedule {
    /// Creates a schedule with a cleared timer.
    #[must_use]
    pub const fn new(count: u32, interval: f32) -> Self {
        Self {
            count,
            interval,
            timer: 0.0,
            emit_now: false,
        }
    }

    /// Advances the timer by `delta_time`.
    ///
    /// Returns true on the frame the timer reaches the interval; the timer is
    /// reset to zero in the same step. At most one emission fires per call,
    /// no matter how many intervals `delta_time` spans.
    pub fn tick(&mut self, delta_time: f32) -> bool {
        self.timer += delta_time;
        self.emit_now = self.timer >= self.interval;
        if self.emit_now {
            self.timer = 0.0;
        }
        self.emit_now
    }

    /// Forces an emission of `count` particles this frame, bypassing the timer.
    pub fn trigger(&mut self, count: u32) {
        self.emit_now = true;
        self.count = count;
    }

    /// Clears the one-frame emit flag.
    pub fn clear_emit(&mut self) {
        self.emit_now = false;
    }

    /// Clears the timer and the emit flag.
    pub fn reset(&mut self) {
        self.timer = 0.0;
        self.emit_now = false;
    }

    /// Seconds accumulated since the last emission.
    #[must_use]
    pub const fn timer(&self) -> f32 {
        self.timer
    }

    /// Whether the shape emits this frame.
    #[must_use]
    pub const fn emit_now(&self) -> bool {
        self.emit_now
    }
}

impl Default for EmissionSchedule {
    fn default() -> Self {
        Self::new(1, 1.0)
    }
}

/// Extent fields of one shape kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShapeParams {
    /// Sphere of `radius` around the translate.
    Sphere {
        /// Sphere radius.
        radius: f32,
    },
    /// Box of `size` centred on the translate.
    Box {
        /// Full box extent per axis.
        size: Vec3,
    },
    /// Triangle with vertices relative to the translate.
    Triangle {
        /// First vertex.
        v1: Vec3,
        /// Second vertex.
        v2: Vec3,
        /// Third vertex.
        v3: Vec3,
    },
    /// Cone with its apex at the translate, opening along `direction`.
    Cone {
        /// Cone axis.
        direction: Vec3,
        /// Base radius.
        radius: f32,
        /// Height along the axis.
        height: f32,
    },
    /// Extracted mesh triangles, scaled then rotated.
    Mesh {
        /// Per-axis scale.
        scale: Vec3,
        /// Mesh rotation.
        rotation: Quat,
        /// Sampling mode.
        mode: MeshEmitMode,
    },
}

impl ShapeParams {
    /// Returns the default extent for `kind`.
    #[must_use]
    pub fn default_for(kind: ShapeKind) -> Self {
        match kind {
            ShapeKind::Sphere => Self::Sphere { radius: 1.0 },
            ShapeKind::Box => Self::Box { size: Vec3::ONE },
            ShapeKind::Triangle => Self::Triangle {
                v1: Vec3::ZERO,
                v2: Vec3::X,
                v3: Vec3::Y,
            },
            ShapeKind::Cone => Self::Cone {
                direction: Vec3::Y,
                radius: 1.0,
                height: 1.0,
            },
            ShapeKind::Mesh => Self::Mesh {
                scale: Vec3::ONE,
                rotation: Quat::IDENTITY,
                mode: MeshEmitMode::Surface,
            },
        }
    }

    /// Returns the kind these parameters belong to.
    #[must_use]
    pub const fn kind(&self) -> ShapeKind {
        match self {
            Self::Sphere { .. } => ShapeKind::Sphere,
            Self::Box { .. } => ShapeKind::Box,
            Self::Triangle { .. } => ShapeKind::Triangle,
            Self::Cone { .. } => ShapeKind::Cone,
            Self::Mesh { .. } => ShapeKind::Mesh,
        }
    }
}

impl Default for ShapeParams {
    fn default() -> Self {
        Self::default_for(ShapeKind::Sphere)
    }
}

/// Full shape configuration, applied by [`EmissionShape::configure`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeConfig {
    /// Offset from the group origin.
    pub translate: Vec3,
    /// Kind and extent.
    pub params: ShapeParams,
    /// Particles per emission.
    pub count: u32,
    /// Seconds between emissions.
    pub interval: f32,
}

impl ShapeConfig {
    /// Default configuration for `kind`.
    #[must_use]
    pub fn default_for(kind: ShapeKind) -> Self {
        Self {
            translate: Vec3::ZERO,
            params: ShapeParams::default_for(kind),
            count: 1,
            interval: 1.0,
        }
    }
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self::default_for(ShapeKind::Sphere)
    }
}

/// Placement-only update, applied by [`EmissionShape::retarget`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Placement {
    /// New offset from the group origin.
    pub translate: Vec3,
    /// New orientation. Used by the cone axis and the mesh rotation.
    pub orientation: Option<Quat>,
}

/// CPU copies of the five shape blocks of one emitter.
#[derive(Debug, Clone, Default)]
pub struct ShapeBlocks {
    /// Sphere block.
    pub sphere: MappedBlock<SphereBlock>,
    /// Box block.
    pub cube: MappedBlock<BoxBlock>,
    /// Triangle block.
    pub triangle: MappedBlock<TriangleBlock>,
    /// Cone block.
    pub cone: MappedBlock<ConeBlock>,
    /// Mesh block.
    pub mesh: MappedBlock<MeshBlock>,
}

/// Values written into the active shape block for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockFill {
    /// World-space translate.
    pub translate: Vec3,
    /// Requested particle count.
    pub count: u32,
    /// Whether the kernel should emit.
    pub emit: bool,
    /// Triangles resident for the mesh shape.
    pub triangle_count: u32,
}

/// The current emission shape of an emitter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmissionShape {
    translate: Vec3,
    params: ShapeParams,
    schedule: EmissionSchedule,
}

impl EmissionShape {
    /// Creates a shape from a full configuration.
    #[must_use]
    pub fn new(config: ShapeConfig) -> Self {
        Self {
            translate: config.translate,
            params: config.params,
            schedule: EmissionSchedule::new(config.count, config.interval),
        }
    }

    /// Overwrites placement, extent, count and interval.
    ///
    /// The running timer is kept unless the shape kind changes.
    pub fn configure(&mut self, config: ShapeConfig) {
        if config.params.kind() != self.kind() {
            self.schedule.reset();
        }
        self.translate = config.translate;
        self.params = config.params;
        self.schedule.count = config.count;
        self.schedule.interval = config.interval;
    }

    /// Moves and orients the shape without touching its extent or schedule.
    pub fn retarget(&mut self, placement: Placement) {
        self.translate = placement.translate;
        let Some(orientation) = placement.orientation else {
            return;
        };
        match &mut self.params {
            ShapeParams::Cone { direction, .. } => *direction = orientation * Vec3::Y,
            ShapeParams::Mesh { rotation, .. } => *rotation = orientation,
            _ => {},
        }
    }

    /// Returns the current kind.
    #[must_use]
    pub const fn kind(&self) -> ShapeKind {
        self.params.kind()
    }

    /// Returns the offset from the group origin.
    #[must_use]
    pub const fn translate(&self) -> Vec3 {
        self.translate
    }

    /// Returns the extent parameters.
    #[must_use]
    pub const fn params(&self) -> &ShapeParams {
        &self.params
    }

    /// Returns the full configuration, without timer state.
    #[must_use]
    pub const fn config(&self) -> ShapeConfig {
        ShapeConfig {
            translate: self.translate,
            params: self.params,
            count: self.schedule.count,
            interval: self.schedule.interval,
        }
    }

    /// Returns the interval schedule.
    #[must_use]
    pub const fn schedule(&self) -> &EmissionSchedule {
        &self.schedule
    }

    /// Returns the interval schedule mutably.
    pub fn schedule_mut(&mut self) -> &mut EmissionSchedule {
        &mut self.schedule
    }

    /// Scale applied to inherited particle scale. Only meshes carry one.
    #[must_use]
    pub fn scale(&self) -> Vec3 {
        match self.params {
            ShapeParams::Mesh { scale, .. } => scale,
            _ => Vec3::ONE,
        }
    }

    /// Writes the active kind's block. Inactive blocks are left as they are.
    pub fn write_block(&self, blocks: &mut ShapeBlocks, fill: BlockFill) {
        let translate = fill.translate.to_array();
        let emit = u32::from(fill.emit);
        match self.params {
            ShapeParams::Sphere { radius } => blocks.sphere.set(SphereBlock {
                translate,
                radius,
                count: fill.count,
                emit,
                _padding: [0; 2],
            }),
            ShapeParams::Box { size } => blocks.cube.set(BoxBlock {
                translate,
                count: fill.count,
                size: size.to_array(),
                emit,
            }),
            ShapeParams::Triangle { v1, v2, v3 } => blocks.triangle.set(TriangleBlock {
                v1: v1.to_array(),
                count: fill.count,
                v2: v2.to_array(),
                emit,
                v3: v3.to_array(),
                _padding0: 0,
                translate,
                _padding1: 0,
            }),
            ShapeParams::Cone {
                direction,
                radius,
                height,
            } => blocks.cone.set(ConeBlock {
                translate,
                radius,
                direction: direction.try_normalize().unwrap_or(Vec3::Y).to_array(),
                height,
                count: fill.count,
                emit,
                _padding: [0; 2],
            }),
            ShapeParams::Mesh {
                scale,
                rotation,
                mode,
            } => blocks.mesh.set(MeshBlock {
                translate,
                count: fill.count,
                scale: scale.to_array(),
                emit,
                rotation: rotation.normalize().to_array(),
                mode: mode.as_u32(),
                triangle_count: fill.triangle_count,
                _padding: [0; 2],
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_interval_gating_fires_once_and_resets() {
        let mut schedule = EmissionSchedule::new(4, 1.0);
        assert!(!schedule.tick(0.4));
        assert!(!schedule.tick(0.4));
        assert!(schedule.tick(0.4));
        assert!(schedule.emit_now());
        assert!(schedule.timer().abs() < f32::EPSILON);
        assert!(!schedule.tick(0.1));
    }

    #[test]
    fn test_large_delta_emits_once() {
        let mut schedule = EmissionSchedule::new(1, 0.5);
        assert!(schedule.tick(10.0));
        assert!(schedule.timer().abs() < f32::EPSILON);
        assert!(!schedule.tick(0.1));
    }

    #[test]
    fn test_trigger_overrides_count() {
        let mut schedule = EmissionSchedule::new(1, 100.0);
        schedule.trigger(25);
        assert!(schedule.emit_now());
        assert_eq!(schedule.count, 25);
        schedule.clear_emit();
        assert!(!schedule.emit_now());
    }

    #[test]
    fn test_shape_kind_names() {
        for kind in ShapeKind::ALL {
            assert_eq!(ShapeKind::from_name(kind.as_str()), Some(kind));
            assert_eq!(kind.to_string(), kind.as_str());
        }
        assert_eq!(ShapeKind::from_name("Torus"), None);
        assert_eq!(ShapeKind::Mesh.tag(), ShapeTag::Mesh);
    }

    #[test]
    fn test_configure_switches_kind() {
        let mut shape = EmissionShape::default();
        shape.schedule_mut().tick(0.5);
        assert!(shape.schedule().timer() > 0.0);

        shape.configure(ShapeConfig {
            translate: Vec3::new(1.0, 2.0, 3.0),
            params: ShapeParams::Box {
                size: Vec3::splat(2.0),
            },
            count: 10,
            interval: 0.25,
        });

        assert_eq!(shape.kind(), ShapeKind::Box);
        assert_eq!(shape.translate(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(shape.schedule().count, 10);
        assert!(shape.schedule().timer().abs() < f32::EPSILON);
    }

    #[test]
    fn test_configure_same_kind_keeps_timer() {
        let mut shape = EmissionShape::default();
        shape.schedule_mut().tick(0.5);
        shape.configure(ShapeConfig {
            params: ShapeParams::Sphere { radius: 3.0 },
            ..ShapeConfig::default()
        });
        assert!((shape.schedule().timer() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_retarget_only_moves() {
        let mut shape = EmissionShape::new(ShapeConfig::default_for(ShapeKind::Cone));
        let before = shape.config();

        shape.retarget(Placement {
            translate: Vec3::new(0.0, 5.0, 0.0),
            orientation: Some(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)),
        });

        let after = shape.config();
        assert_eq!(after.translate, Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(after.count, before.count);
        let ShapeParams::Cone {
            direction,
            radius,
            height,
        } = after.params
        else {
            panic!("shape kind changed");
        };
        assert!((direction - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-5);
        assert!((radius - 1.0).abs() < f32::EPSILON);
        assert!((height - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_write_block_targets_active_kind() {
        let mut blocks = ShapeBlocks::default();
        let _ = blocks.sphere.take_upload();
        let _ = blocks.cube.take_upload();

        let shape = EmissionShape::new(ShapeConfig::default_for(ShapeKind::Box));
        shape.write_block(
            &mut blocks,
            BlockFill {
                translate: Vec3::new(1.0, 0.0, 0.0),
                count: 7,
                emit: true,
                triangle_count: 0,
            },
        );

        assert!(!blocks.sphere.is_dirty());
        assert!(blocks.cube.is_dirty());
        assert_eq!(blocks.cube.get().count, 7);
        assert_eq!(blocks.cube.get().emit, 1);
        assert_eq!(blocks.cube.get().translate, [1.0, 0.0, 0.0]);
    }

    proptest! {
        #[test]
        fn prop_interval_gating(interval in 0.01f32..10.0, steps in proptest::collection::vec(0.0f32..2.0, 1..64)) {
            let mut schedule = EmissionSchedule::new(1, interval);
            for dt in steps {
                let before = schedule.timer();
                let fired = schedule.tick(dt);
                prop_assert_eq!(fired, before + dt >= interval);
                if fired {
                    prop_assert!(schedule.timer().abs() < f32::EPSILON);
                } else {
                    prop_assert!(schedule.timer() < interval);
                }
            }
        }
    }
}
