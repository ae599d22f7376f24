//! GPU parameter blocks for the emission kernel.
//!
//! Every struct here mirrors a WGSL struct in [`crate::shader`]. Vec3 fields
//! are stored as `[f32; 3]` followed by a scalar so that the Rust layout
//! matches WGSL's 16-byte vec3 alignment without implicit padding.

use bytemuck::{Pod, Zeroable};

/// Threads per workgroup used by the emission kernel.
pub const THREADS_PER_GROUP: u32 = 1024;

/// Bit mask with all three triangle edges marked as boundary.
pub const ALL_EDGES: u32 = 0b111;

/// Shape tag written into [`CommonBlock::shape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ShapeTag {
    /// Sphere volume.
    #[default]
    Sphere = 0,
    /// Axis-aligned box volume.
    Box = 1,
    /// Single triangle surface.
    Triangle = 2,
    /// Cone volume along an axis.
    Cone = 3,
    /// Mesh surface, volume or edges.
    Mesh = 4,
}

impl ShapeTag {
    /// Converts from raw u32 value.
    #[must_use]
    pub const fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Box,
            2 => Self::Triangle,
            3 => Self::Cone,
            4 => Self::Mesh,
            _ => Self::Sphere,
        }
    }
}

/// Block shared by every shape: which shape is active plus timing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct CommonBlock {
    /// Active [`ShapeTag`].
    pub shape: u32,
    /// Per-dispatch random seed.
    pub seed: u32,
    /// Seconds since the owning group started playing.
    pub time: f32,
    /// Frame delta time in seconds.
    pub delta_time: f32,
}

/// Per-frame block shared by every dispatch of one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FrameBlock {
    /// Total session time in seconds.
    pub time: f32,
    /// Frame delta time in seconds.
    pub delta_time: f32,
    /// Monotonic frame counter.
    pub frame_index: u32,
    /// Pool capacity in particles.
    pub pool_capacity: u32,
}

/// Sphere shape block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct SphereBlock {
    /// World-space center.
    pub translate: [f32; 3],
    /// Sphere radius.
    pub radius: f32,
    /// Particles requested by this dispatch.
    pub count: u32,
    /// Non-zero when the shape emits this dispatch.
    pub emit: u32,
    /// Padding for alignment.
    pub _padding: [u32; 2],
}

/// Box shape block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct BoxBlock {
    /// World-space center.
    pub translate: [f32; 3],
    /// Particles requested by this dispatch.
    pub count: u32,
    /// Full extent along each axis.
    pub size: [f32; 3],
    /// Non-zero when the shape emits this dispatch.
    pub emit: u32,
}

/// Triangle shape block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TriangleBlock {
    /// First vertex, local space.
    pub v1: [f32; 3],
    /// Particles requested by this dispatch.
    pub count: u32,
    /// Second vertex, local space.
    pub v2: [f32; 3],
    /// Non-zero when the shape emits this dispatch.
    pub emit: u32,
    /// Third vertex, local space.
    pub v3: [f32; 3],
    /// Padding for alignment.
    pub _padding0: u32,
    /// World-space offset added to every vertex.
    pub translate: [f32; 3],
    /// Padding for alignment.
    pub _padding1: u32,
}

/// Cone shape block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ConeBlock {
    /// World-space apex.
    pub translate: [f32; 3],
    /// Base radius.
    pub radius: f32,
    /// Cone axis (not required to be normalized).
    pub direction: [f32; 3],
    /// Distance from apex to base.
    pub height: f32,
    /// Particles requested by this dispatch.
    pub count: u32,
    /// Non-zero when the shape emits this dispatch.
    pub emit: u32,
    /// Padding for alignment.
    pub _padding: [u32; 2],
}

/// Mesh shape block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MeshBlock {
    /// World-space origin of the mesh.
    pub translate: [f32; 3],
    /// Particles requested by this dispatch.
    pub count: u32,
    /// Non-uniform scale applied before rotation.
    pub scale: [f32; 3],
    /// Non-zero when the shape emits this dispatch.
    pub emit: u32,
    /// Rotation quaternion (x, y, z, w).
    pub rotation: [f32; 4],
    /// Sampling mode: 0 surface, 1 volume, 2 edge.
    pub mode: u32,
    /// Number of valid entries in the triangle buffer.
    pub triangle_count: u32,
    /// Padding for alignment.
    pub _padding: [u32; 2],
}

/// Spawn-time particle parameters shared by all shapes of an emitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct SpawnBlock {
    /// Base lifetime in seconds.
    pub lifetime: f32,
    /// Symmetric lifetime variance.
    pub lifetime_variance: f32,
    /// Base rotation in radians.
    pub rotation: f32,
    /// Symmetric rotation variance.
    pub rotation_variance: f32,
    /// Base rotation speed in radians per second.
    pub rotation_speed: f32,
    /// Symmetric rotation speed variance.
    pub rotation_speed_variance: f32,
    /// Non-zero for camera-facing particles.
    pub billboard: u32,
    /// Padding for alignment.
    pub _padding0: u32,
    /// Base scale.
    pub scale: [f32; 3],
    /// Padding for alignment.
    pub _padding1: f32,
    /// Per-axis scale variance.
    pub scale_variance: [f32; 3],
    /// Padding for alignment.
    pub _padding2: f32,
    /// Base velocity.
    pub velocity: [f32; 3],
    /// Padding for alignment.
    pub _padding3: f32,
    /// Per-axis velocity variance.
    pub velocity_variance: [f32; 3],
    /// Padding for alignment.
    pub _padding4: f32,
    /// Base color (RGBA).
    pub color: [f32; 4],
    /// Per-channel color variance.
    pub color_variance: [f32; 4],
}

/// Triangle record consumed by the mesh sampler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuMeshTriangle {
    /// First vertex, local space.
    pub v0: [f32; 3],
    /// Triangle area.
    pub area: f32,
    /// Second vertex, local space.
    pub v1: [f32; 3],
    /// Boundary edge mask (bit i = edge i).
    pub edge_mask: u32,
    /// Third vertex, local space.
    pub v2: [f32; 3],
    /// Sum of areas of this and every preceding triangle.
    pub cumulative_area: f32,
    /// Unit normal.
    pub normal: [f32; 3],
    /// Padding for alignment.
    pub _padding: u32,
}

/// Particle record stored in the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuParticle {
    /// World-space position.
    pub position: [f32; 3],
    /// Total lifetime in seconds.
    pub lifetime: f32,
    /// Velocity.
    pub velocity: [f32; 3],
    /// Seconds lived so far.
    pub age: f32,
    /// Scale.
    pub scale: [f32; 3],
    /// Rotation in radians.
    pub rotation: f32,
    /// Color (RGBA).
    pub color: [f32; 4],
    /// Rotation speed in radians per second.
    pub rotation_speed: f32,
    /// Non-zero for camera-facing particles.
    pub billboard: u32,
    /// Non-zero while the slot is in use.
    pub alive: u32,
    /// Padding for alignment.
    pub _padding: u32,
}
