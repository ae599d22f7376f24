//! Emission dispatcher.
//!
//! Turns each emitter's queued emissions into kernel dispatches. Every
//! pending emission (timer, explicit or trail sub-step) becomes one dispatch
//! with the shape block's translate moved to the emission point and its emit
//! flag raised. A frame with nothing queued still issues exactly one dispatch
//! with the flag lowered, so the protocol's buffer bracketing runs every frame.

use flare_common::GpuResult;
use flare_kernel::{
    record_emission_dispatch, BindingSlot, CommonBlock, ComputeTarget, FrameBlock,
    THREADS_PER_GROUP,
};
use glam::Vec3;
use tracing::trace;

use crate::emitter::{EmissionSource, Emitter, PendingEmission};
use crate::shape::{BlockFill, ShapeKind};

/// Dispatch counters for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    /// Emitters dispatched.
    pub emitters: u32,
    /// Kernel dispatches issued.
    pub dispatches: u32,
    /// Dispatches with the emit flag raised.
    pub emissions: u32,
    /// Particles requested by raised dispatches.
    pub requested_particles: u64,
    /// Thread groups launched.
    pub thread_groups: u64,
}

/// Per-emitter timing passed to [`EmissionDispatcher::run_emitter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmitterFrame {
    /// Owning group origin.
    pub origin: Vec3,
    /// Seconds since the group started playing.
    pub group_time: f32,
    /// Frame delta time.
    pub delta_time: f32,
}

/// Records emission dispatches into a [`ComputeTarget`].
#[derive(Debug, Clone)]
pub struct EmissionDispatcher {
    threads_per_group: u32,
    frame: FrameBlock,
    seed: u32,
    stats: DispatchStats,
}

impl Default for EmissionDispatcher {
    fn default() -> Self {
        Self::new(THREADS_PER_GROUP)
    }
}

impl EmissionDispatcher {
    /// Creates a dispatcher sizing groups by `threads_per_group`.
    #[must_use]
    pub fn new(threads_per_group: u32) -> Self {
        Self {
            threads_per_group: threads_per_group.max(1),
            frame: FrameBlock::default(),
            seed: 0x9E37_79B9,
            stats: DispatchStats::default(),
        }
    }

    /// Threads per group used for sizing.
    #[must_use]
    pub const fn threads_per_group(&self) -> u32 {
        self.threads_per_group
    }

    /// Starts a frame: resets counters and forwards the per-frame block to
    /// the pool.
    pub fn begin_frame<T: ComputeTarget + ?Sized>(&mut self, target: &mut T, time: f32, delta_time: f32) {
        self.stats = DispatchStats::default();
        self.frame.time = time;
        self.frame.delta_time = delta_time;
        self.frame.frame_index = self.frame.frame_index.wrapping_add(1);
        target.update_pool(&self.frame);
    }

    /// Returns this frame's counters.
    #[must_use]
    pub const fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Returns the last per-frame block.
    #[must_use]
    pub const fn frame(&self) -> &FrameBlock {
        &self.frame
    }

    /// Dispatches everything `emitter` queued this frame and clears its
    /// one-frame state. Returns the number of dispatches issued.
    pub fn run_emitter<T: ComputeTarget + ?Sized>(
        &mut self,
        target: &mut T,
        emitter: &mut Emitter,
        frame: EmitterFrame,
    ) -> GpuResult<u32> {
        target.select_emitter(emitter.id());

        let mut pending = emitter.take_pending();
        if pending.is_empty() {
            pending.push(PendingEmission {
                position: frame.origin + emitter.shape().translate(),
                count: emitter.shape().schedule().count,
                source: EmissionSource::Timer,
            });
            self.dispatch_one(target, emitter, &pending[0], false, frame)?;
        } else {
            for emission in &pending {
                self.dispatch_one(target, emitter, emission, true, frame)?;
            }
        }

        emitter.finish_frame();
        self.stats.emitters += 1;
        Ok(pending.len() as u32)
    }

    fn dispatch_one<T: ComputeTarget + ?Sized>(
        &mut self,
        target: &mut T,
        emitter: &mut Emitter,
        emission: &PendingEmission,
        emit: bool,
        frame: EmitterFrame,
    ) -> GpuResult<()> {
        let kind = emitter.shape_kind();
        let with_triangles = kind == ShapeKind::Mesh;
        let seed = self.next_seed();

        let scale = if emission.source == EmissionSource::Trail && emitter.trail().inherit_scale {
            emitter.shape().scale()
        } else {
            Vec3::ONE
        };
        let spawn = emitter.spawn().to_block(emitter.lifetime_override(), scale);
        let fill = BlockFill {
            translate: emission.position,
            count: emission.count,
            emit,
            triangle_count: emitter.triangle_count(),
        };

        let shape = emitter.shape().clone();
        let blocks = &mut emitter.blocks;
        blocks.common.set(CommonBlock {
            shape: kind.tag() as u32,
            seed,
            time: frame.group_time,
            delta_time: frame.delta_time,
        });
        shape.write_block(&mut blocks.shapes, fill);
        blocks.spawn.set(spawn);

        upload(target, BindingSlot::Common, blocks.common.take_upload())?;
        upload(target, BindingSlot::Sphere, blocks.shapes.sphere.take_upload())?;
        upload(target, BindingSlot::Box, blocks.shapes.cube.take_upload())?;
        upload(target, BindingSlot::Triangle, blocks.shapes.triangle.take_upload())?;
        upload(target, BindingSlot::Cone, blocks.shapes.cone.take_upload())?;
        upload(target, BindingSlot::Mesh, blocks.shapes.mesh.take_upload())?;
        upload(target, BindingSlot::Spawn, blocks.spawn.take_upload())?;
        if with_triangles {
            upload(target, BindingSlot::MeshTriangles, blocks.triangles.take_upload())?;
        }

        let groups = record_emission_dispatch(target, emission.count, self.threads_per_group, with_triangles)?;

        self.stats.dispatches += 1;
        self.stats.thread_groups += u64::from(groups);
        if emit {
            self.stats.emissions += 1;
            self.stats.requested_particles += u64::from(emission.count);
        }
        trace!(
            "{} dispatched {} groups (emit: {}, count: {})",
            emitter.id(),
            groups,
            emit,
            emission.count
        );
        Ok(())
    }

    fn next_seed(&mut self) -> u32 {
        self.seed = self.seed.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
        self.seed
    }
}

fn upload<T: ComputeTarget + ?Sized>(target: &mut T, slot: BindingSlot, bytes: Option<&[u8]>) -> GpuResult<()> {
    match bytes {
        Some(bytes) => target.upload(slot, bytes),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{MeshSurfaceExtractor, ModelData};
    use crate::shape::{ShapeConfig, ShapeParams};
    use flare_common::EmitterId;
    use flare_kernel::{
        BufferState, MeshBlock, RecordedCommand, RecordingTarget, SphereBlock, SpawnBlock,
    };

    fn frame() -> EmitterFrame {
        EmitterFrame {
            origin: Vec3::ZERO,
            group_time: 0.0,
            delta_time: 0.016,
        }
    }

    fn emitter() -> Emitter {
        let mut emitter = Emitter::new(EmitterId::from_raw(7), "burst");
        emitter.configure_shape(ShapeConfig {
            count: 2500,
            interval: 100.0,
            ..ShapeConfig::default()
        });
        emitter
    }

    #[test]
    fn test_idle_frame_dispatches_once_without_emitting() {
        let mut target = RecordingTarget::new();
        let mut dispatcher = EmissionDispatcher::default();
        let mut emitter = emitter();

        dispatcher.begin_frame(&mut target, 0.0, 0.016);
        let count = dispatcher
            .run_emitter(&mut target, &mut emitter, frame())
            .expect("dispatch");

        assert_eq!(count, 1);
        assert_eq!(target.dispatch_count(), 1);
        let sphere: SphereBlock = target
            .last_upload(Some(emitter.id()), BindingSlot::Sphere)
            .expect("sphere upload");
        assert_eq!(sphere.emit, 0);
        assert_eq!(dispatcher.stats().emissions, 0);

        let (_, bindings, groups) = target.dispatches().next().expect("dispatch");
        assert_eq!(groups, 3);
        assert_eq!(bindings.len(), 12);
    }

    #[test]
    fn test_each_pending_emission_dispatches() {
        let mut target = RecordingTarget::new();
        let mut dispatcher = EmissionDispatcher::default();
        let mut emitter = emitter();

        emitter.emit_at_position(Vec3::new(1.0, 0.0, 0.0), 10);
        emitter.emit_at_position(Vec3::new(2.0, 0.0, 0.0), 20);

        dispatcher.begin_frame(&mut target, 0.0, 0.016);
        let count = dispatcher
            .run_emitter(&mut target, &mut emitter, frame())
            .expect("dispatch");

        assert_eq!(count, 2);
        let spheres: Vec<SphereBlock> = target.uploads(Some(emitter.id()), BindingSlot::Sphere);
        assert_eq!(spheres.len(), 2);
        assert_eq!(spheres[0].translate, [1.0, 0.0, 0.0]);
        assert_eq!(spheres[0].count, 10);
        assert_eq!(spheres[1].translate, [2.0, 0.0, 0.0]);
        assert_eq!(spheres[1].emit, 1);
        assert_eq!(dispatcher.stats().requested_particles, 30);

        assert!(emitter.pending().is_empty());
        assert!(!emitter.shape().schedule().emit_now());
    }

    #[test]
    fn test_dispatch_is_bracketed_by_transitions() {
        let mut target = RecordingTarget::new();
        let mut dispatcher = EmissionDispatcher::default();
        let mut emitter = emitter();

        dispatcher.begin_frame(&mut target, 0.0, 0.016);
        dispatcher
            .run_emitter(&mut target, &mut emitter, frame())
            .expect("dispatch");

        let transitions: Vec<_> = target
            .commands()
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::Transition { from, to, .. } => Some((*from, *to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                (BufferState::ShaderRead, BufferState::ComputeWrite),
                (BufferState::ComputeWrite, BufferState::ShaderRead),
            ]
        );
        assert!(matches!(target.commands()[0], RecordedCommand::PoolUpdate(_)));
    }

    #[test]
    fn test_mesh_binds_triangles() {
        let mut target = RecordingTarget::new();
        let mut dispatcher = EmissionDispatcher::default();
        let mut emitter = emitter();
        emitter.configure_shape(ShapeConfig::default_for(ShapeKind::Mesh));
        let model = ModelData::single("tri", vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2]);
        emitter.set_mesh_source(&MeshSurfaceExtractor::default(), Some(&model));

        dispatcher.begin_frame(&mut target, 0.0, 0.016);
        dispatcher
            .run_emitter(&mut target, &mut emitter, frame())
            .expect("dispatch");

        let (_, bindings, _) = target.dispatches().next().expect("dispatch");
        assert_eq!(bindings.len(), 13);
        assert_eq!(bindings[12], BindingSlot::MeshTriangles);

        let mesh: MeshBlock = target
            .last_upload(Some(emitter.id()), BindingSlot::Mesh)
            .expect("mesh upload");
        assert_eq!(mesh.triangle_count, 1);
        assert!(target.commands().iter().any(|c| matches!(
            c,
            RecordedCommand::Upload {
                slot: BindingSlot::MeshTriangles,
                ..
            }
        )));
    }

    #[test]
    fn test_unchanged_blocks_upload_once() {
        let mut target = RecordingTarget::new();
        let mut dispatcher = EmissionDispatcher::default();
        let mut emitter = emitter();

        for _ in 0..3 {
            dispatcher.begin_frame(&mut target, 0.0, 0.016);
            dispatcher
                .run_emitter(&mut target, &mut emitter, frame())
                .expect("dispatch");
        }

        let boxes: Vec<flare_kernel::BoxBlock> = target.uploads(Some(emitter.id()), BindingSlot::Box);
        assert_eq!(boxes.len(), 1);
        // Seed changes every dispatch
        let commons: Vec<CommonBlock> = target.uploads(Some(emitter.id()), BindingSlot::Common);
        assert_eq!(commons.len(), 3);
    }

    #[test]
    fn test_lifetime_override_applies_to_frame() {
        let mut target = RecordingTarget::new();
        let mut dispatcher = EmissionDispatcher::default();
        let mut emitter = emitter();
        emitter.set_trail(crate::trail::TrailConfig {
            enabled: true,
            min_distance: 0.0,
            lifetime_override: 0.25,
            ..crate::trail::TrailConfig::default()
        });

        emitter.update(0.016, Vec3::ZERO);
        emitter.retarget(crate::shape::Placement {
            translate: Vec3::X,
            orientation: None,
        });
        emitter.update(0.016, Vec3::ZERO);

        dispatcher.begin_frame(&mut target, 0.0, 0.016);
        dispatcher
            .run_emitter(&mut target, &mut emitter, frame())
            .expect("dispatch");

        let spawn: SpawnBlock = target
            .last_upload(Some(emitter.id()), BindingSlot::Spawn)
            .expect("spawn upload");
        assert!((spawn.lifetime - 0.25).abs() < f32::EPSILON);
        assert_eq!(emitter.lifetime_override(), None);
    }

    #[test]
    fn test_inherit_scale_applies_to_trail_only() {
        let mut target = RecordingTarget::new();
        let mut dispatcher = EmissionDispatcher::default();
        let mut emitter = emitter();
        emitter.configure_shape(ShapeConfig {
            params: ShapeParams::Mesh {
                scale: Vec3::splat(2.0),
                rotation: glam::Quat::IDENTITY,
                mode: crate::shape::MeshEmitMode::Surface,
            },
            count: 4,
            interval: 0.01,
            ..ShapeConfig::default()
        });
        emitter.set_trail(crate::trail::TrailConfig {
            enabled: true,
            min_distance: 1.0,
            inherit_scale: true,
            ..crate::trail::TrailConfig::default()
        });

        // Explicit emission sets the trail baseline, then one timer tick
        // and one trail step follow in the same frame
        emitter.emit_at_position(Vec3::new(0.0, 5.0, 0.0), 5);
        emitter.retarget(crate::shape::Placement {
            translate: Vec3::new(0.0, 6.5, 0.0),
            orientation: None,
        });
        emitter.update(0.016, Vec3::ZERO);
        let sources: Vec<_> = emitter.pending().iter().map(|p| p.source).collect();
        assert_eq!(
            sources,
            vec![EmissionSource::Explicit, EmissionSource::Timer, EmissionSource::Trail]
        );

        dispatcher.begin_frame(&mut target, 0.0, 0.016);
        dispatcher
            .run_emitter(&mut target, &mut emitter, frame())
            .expect("dispatch");

        let scales: Vec<[f32; 3]> = target
            .uploads_at_dispatch::<SpawnBlock>(BindingSlot::Spawn)
            .into_iter()
            .map(|spawn| spawn.expect("spawn upload").scale)
            .collect();
        assert_eq!(scales, vec![[1.0; 3], [1.0; 3], [2.0; 3]]);
    }

    #[test]
    fn test_sphere_radius_reaches_block() {
        let mut target = RecordingTarget::new();
        let mut dispatcher = EmissionDispatcher::default();
        let mut emitter = emitter();
        emitter.configure_shape(ShapeConfig {
            params: ShapeParams::Sphere { radius: 4.0 },
            ..ShapeConfig::default()
        });
        emitter.emit_at_position(Vec3::ZERO, 1);

        dispatcher.begin_frame(&mut target, 0.0, 0.016);
        dispatcher
            .run_emitter(&mut target, &mut emitter, frame())
            .expect("dispatch");

        let sphere: SphereBlock = target
            .last_upload(Some(emitter.id()), BindingSlot::Sphere)
            .expect("sphere upload");
        assert!((sphere.radius - 4.0).abs() < f32::EPSILON);
    }
}
