//! Emitters: one shape, its spawn parameters, trail and runtime state.

use flare_common::EmitterId;
use flare_kernel::{CommonBlock, GpuMeshTriangle, MappedArray, MappedBlock, SpawnBlock};
use glam::Vec3;
use tracing::debug;

use crate::mesh::{to_gpu_triangles, MeshExtractionStats, MeshSurfaceExtractor, MeshTriangle, ModelSource};
use crate::shape::{EmissionShape, Placement, ShapeBlocks, ShapeConfig, ShapeKind};
use crate::spawn::SpawnParameters;
use crate::trail::{TrailConfig, TrailEmitter, DEFAULT_MAX_TRAIL_STEPS};

/// What produced a pending emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionSource {
    /// The interval timer fired.
    Timer,
    /// An explicit point emission.
    Explicit,
    /// A trail sub-step.
    Trail,
}

/// An emission queued for the next dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingEmission {
    /// World-space emission position.
    pub position: Vec3,
    /// Particles requested.
    pub count: u32,
    /// What queued it.
    pub source: EmissionSource,
}

/// CPU copies of every block an emitter uploads.
#[derive(Debug, Clone, Default)]
pub struct EmitterBlocks {
    /// Common block.
    pub common: MappedBlock<CommonBlock>,
    /// Shape blocks.
    pub shapes: ShapeBlocks,
    /// Spawn parameter block.
    pub spawn: MappedBlock<SpawnBlock>,
    /// Mesh triangle array.
    pub triangles: MappedArray<GpuMeshTriangle>,
}

/// A named emitter inside a group.
#[derive(Debug, Clone)]
pub struct Emitter {
    id: EmitterId,
    name: String,
    texture: String,
    active: bool,
    shape: EmissionShape,
    spawn: SpawnParameters,
    trail: TrailConfig,
    trail_state: TrailEmitter,
    max_trail_steps: u32,
    pending: Vec<PendingEmission>,
    lifetime_override: Option<f32>,
    mesh_triangles: Vec<MeshTriangle>,
    mesh_stats: MeshExtractionStats,
    model_ref: Option<String>,
    pub(crate) blocks: EmitterBlocks,
}

impl Emitter {
    /// Creates an active sphere emitter with default parameters.
    #[must_use]
    pub fn new(id: EmitterId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            texture: String::new(),
            active: true,
            shape: EmissionShape::default(),
            spawn: SpawnParameters::default(),
            trail: TrailConfig::default(),
            trail_state: TrailEmitter::new(),
            max_trail_steps: DEFAULT_MAX_TRAIL_STEPS,
            pending: Vec::new(),
            lifetime_override: None,
            mesh_triangles: Vec::new(),
            mesh_stats: MeshExtractionStats::default(),
            model_ref: None,
            blocks: EmitterBlocks::default(),
        }
    }

    /// Returns the emitter ID.
    #[must_use]
    pub const fn id(&self) -> EmitterId {
        self.id
    }

    /// Returns the emitter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the texture path.
    #[must_use]
    pub fn texture(&self) -> &str {
        &self.texture
    }

    /// Sets the texture path.
    pub fn set_texture(&mut self, path: impl Into<String>) {
        self.texture = path.into();
    }

    /// Whether the emitter takes part in updates and dispatches.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Enables or disables the emitter. Disabling drops queued emissions.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.discard_pending();
        }
    }

    /// Returns the current shape.
    #[must_use]
    pub const fn shape(&self) -> &EmissionShape {
        &self.shape
    }

    /// Returns the current shape kind.
    #[must_use]
    pub const fn shape_kind(&self) -> ShapeKind {
        self.shape.kind()
    }

    /// Overwrites the shape configuration.
    pub fn configure_shape(&mut self, config: ShapeConfig) {
        self.shape.configure(config);
    }

    /// Moves the shape.
    pub fn retarget(&mut self, placement: Placement) {
        self.shape.retarget(placement);
    }

    /// Returns the spawn parameters.
    #[must_use]
    pub const fn spawn(&self) -> &SpawnParameters {
        &self.spawn
    }

    /// Replaces the spawn parameters.
    pub fn set_spawn(&mut self, spawn: SpawnParameters) {
        self.spawn = spawn;
    }

    /// Returns the trail settings.
    #[must_use]
    pub const fn trail(&self) -> &TrailConfig {
        &self.trail
    }

    /// Replaces the trail settings.
    pub fn set_trail(&mut self, trail: TrailConfig) {
        self.trail = trail;
    }

    /// Upper bound on trail sub-steps per frame.
    #[must_use]
    pub const fn max_trail_steps(&self) -> u32 {
        self.max_trail_steps
    }

    /// Sets the upper bound on trail sub-steps per frame.
    pub fn set_max_trail_steps(&mut self, max_steps: u32) {
        self.max_trail_steps = max_steps.max(1);
    }

    /// Returns the trail baseline state.
    #[must_use]
    pub const fn trail_state(&self) -> &TrailEmitter {
        &self.trail_state
    }

    /// Rebuilds the mesh triangle list from `model`.
    ///
    /// A missing model leaves an empty list.
    pub fn set_mesh_source(&mut self, extractor: &MeshSurfaceExtractor, model: Option<&dyn ModelSource>) {
        let extraction = extractor.extract(model);
        self.model_ref = model.map(|m| m.name().to_string());
        self.install_triangles(extraction.triangles, extraction.stats);
    }

    /// Empties the mesh triangle list.
    pub fn clear_mesh_source(&mut self) {
        self.model_ref = None;
        self.install_triangles(Vec::new(), MeshExtractionStats::default());
    }

    /// Records a model reference that could not be resolved.
    pub(crate) fn set_unresolved_model(&mut self, name: String) {
        self.install_triangles(Vec::new(), MeshExtractionStats::default());
        self.model_ref = Some(name);
    }

    fn install_triangles(&mut self, triangles: Vec<MeshTriangle>, stats: MeshExtractionStats) {
        self.blocks.triangles.replace(to_gpu_triangles(&triangles));
        self.mesh_triangles = triangles;
        self.mesh_stats = stats;
    }

    /// Returns the extracted mesh triangles.
    #[must_use]
    pub fn mesh_triangles(&self) -> &[MeshTriangle] {
        &self.mesh_triangles
    }

    /// Returns the last extraction summary.
    #[must_use]
    pub const fn mesh_stats(&self) -> &MeshExtractionStats {
        &self.mesh_stats
    }

    /// Returns the source model reference.
    #[must_use]
    pub fn model_ref(&self) -> Option<&str> {
        self.model_ref.as_deref()
    }

    /// Number of triangles the mesh shape samples from.
    #[must_use]
    pub fn triangle_count(&self) -> u32 {
        self.mesh_triangles.len() as u32
    }

    /// Per-frame update: interval timer, then trail sub-steps.
    ///
    /// `origin` is the owning group's origin offset.
    pub fn update(&mut self, delta_time: f32, origin: Vec3) {
        let position = origin + self.shape.translate();

        if self.shape.schedule_mut().tick(delta_time) {
            self.pending.push(PendingEmission {
                position,
                count: self.shape.schedule().count,
                source: EmissionSource::Timer,
            });
        }

        let points = self.trail_state.advance(position, &self.trail, self.max_trail_steps);
        if points.is_empty() {
            return;
        }
        if let Some(lifetime) = self.trail.lifetime_override() {
            self.lifetime_override = Some(lifetime);
        }
        let count = self.trail.emission_count;
        for point in points {
            self.queue_emission(point, count, EmissionSource::Trail);
        }
    }

    /// Emits `count` particles at `position` this frame, bypassing the timer.
    ///
    /// Ignored while the emitter is inactive.
    pub fn emit_at_position(&mut self, position: Vec3, count: u32) {
        if !self.active {
            debug!("Emitter '{}' inactive, dropping emission of {count}", self.name);
            return;
        }
        self.queue_emission(position, count, EmissionSource::Explicit);
    }

    fn queue_emission(&mut self, position: Vec3, count: u32, source: EmissionSource) {
        self.shape.schedule_mut().trigger(count);
        self.pending.push(PendingEmission {
            position,
            count,
            source,
        });
        self.trail_state.record(position);
    }

    /// Returns the emissions queued for this frame.
    #[must_use]
    pub fn pending(&self) -> &[PendingEmission] {
        &self.pending
    }

    pub(crate) fn take_pending(&mut self) -> Vec<PendingEmission> {
        std::mem::take(&mut self.pending)
    }

    /// Lifetime override applied to this frame's emissions.
    #[must_use]
    pub const fn lifetime_override(&self) -> Option<f32> {
        self.lifetime_override
    }

    /// Clears one-frame state after the dispatch pass.
    pub(crate) fn finish_frame(&mut self) {
        self.shape.schedule_mut().clear_emit();
        self.lifetime_override = None;
    }

    /// Drops queued emissions and one-frame state without dispatching.
    pub(crate) fn discard_pending(&mut self) {
        self.pending.clear();
        self.finish_frame();
    }

    /// Clears timers, trail baseline and queued emissions.
    pub fn reset(&mut self) {
        self.shape.schedule_mut().reset();
        self.trail_state.reset();
        self.pending.clear();
        self.lifetime_override = None;
        debug!("Emitter '{}' reset", self.name);
    }
}
