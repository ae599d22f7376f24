//! wgpu implementation of the emission dispatch protocol.
//!
//! [`EmissionPipeline`] compiles the kernel twice (with and without the mesh
//! triangle binding). [`EmitterResourceCache`] keeps one set of parameter
//! buffers per emitter so that blocks only need uploading when they change.
//! [`WgpuComputeTarget`] ties both to a device and queue for one frame.

use std::collections::HashMap;

use flare_common::{EmitterId, GpuError, GpuResult};
use tracing::{debug, info, trace, warn};
use wgpu::{BindGroupLayout, Buffer, BufferUsages, ComputePipeline, Device, Queue};

use crate::blocks::{
    BoxBlock, CommonBlock, ConeBlock, FrameBlock, GpuMeshTriangle, MeshBlock, SpawnBlock,
    SphereBlock, TriangleBlock,
};
use crate::dispatch::{BindingSlot, BufferState, ComputeTarget};
use crate::pool::{ParticlePool, PoolBuffer};
use crate::shader::{emission_shader_source, EMIT_ENTRY_POINT, EMIT_MESH_ENTRY_POINT};

/// Byte size of the uniform block behind a parameter slot.
#[must_use]
pub const fn block_size(slot: BindingSlot) -> u64 {
    let size = match slot {
        BindingSlot::Common => std::mem::size_of::<CommonBlock>(),
        BindingSlot::Sphere => std::mem::size_of::<SphereBlock>(),
        BindingSlot::Box => std::mem::size_of::<BoxBlock>(),
        BindingSlot::Triangle => std::mem::size_of::<TriangleBlock>(),
        BindingSlot::Cone => std::mem::size_of::<ConeBlock>(),
        BindingSlot::Mesh => std::mem::size_of::<MeshBlock>(),
        BindingSlot::Frame => std::mem::size_of::<FrameBlock>(),
        BindingSlot::Spawn => std::mem::size_of::<SpawnBlock>(),
        _ => 0,
    };
    size as u64
}

fn layout_entry(slot: BindingSlot) -> wgpu::BindGroupLayoutEntry {
    let ty = if slot.is_uniform() {
        wgpu::BufferBindingType::Uniform
    } else {
        let read_only = matches!(slot, BindingSlot::FreeList | BindingSlot::MeshTriangles);
        wgpu::BufferBindingType::Storage { read_only }
    };
    wgpu::BindGroupLayoutEntry {
        binding: slot.index(),
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Compiled emission kernel.
pub struct EmissionPipeline {
    basic_layout: BindGroupLayout,
    mesh_layout: BindGroupLayout,
    basic_pipeline: ComputePipeline,
    mesh_pipeline: ComputePipeline,
    threads_per_group: u32,
}

impl EmissionPipeline {
    /// Creates the emission pipelines.
    ///
    /// `threads_per_group` is clamped to the device's invocation limit.
    pub fn new(device: &Device, threads_per_group: u32) -> Self {
        let limits = device.limits();
        let max_threads = limits
            .max_compute_invocations_per_workgroup
            .min(limits.max_compute_workgroup_size_x)
            .max(1);
        let threads = threads_per_group.clamp(1, max_threads);
        if threads != threads_per_group {
            warn!(
                "Requested {} threads per group, device allows {}; using {}",
                threads_per_group, max_threads, threads
            );
        }

        info!("Creating emission pipeline ({} threads per group)...", threads);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Emission Shader"),
            source: wgpu::ShaderSource::Wgsl(emission_shader_source(threads).into()),
        });

        let basic_entries: Vec<_> = BindingSlot::dispatch_order(false).map(layout_entry).collect();
        let mesh_entries: Vec<_> = BindingSlot::dispatch_order(true).map(layout_entry).collect();

        let basic_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Emission Bind Group Layout"),
            entries: &basic_entries,
        });
        let mesh_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mesh Emission Bind Group Layout"),
            entries: &mesh_entries,
        });

        let basic_pipeline =
            create_pipeline(device, &shader, &basic_layout, EMIT_ENTRY_POINT, "Emission Pipeline");
        let mesh_pipeline = create_pipeline(
            device,
            &shader,
            &mesh_layout,
            EMIT_MESH_ENTRY_POINT,
            "Mesh Emission Pipeline",
        );

        info!("Emission pipeline created");

        Self {
            basic_layout,
            mesh_layout,
            basic_pipeline,
            mesh_pipeline,
            threads_per_group: threads,
        }
    }

    /// Threads per group the kernel was compiled with.
    #[must_use]
    pub const fn threads_per_group(&self) -> u32 {
        self.threads_per_group
    }

    fn layout(&self, with_triangles: bool) -> &BindGroupLayout {
        if with_triangles {
            &self.mesh_layout
        } else {
            &self.basic_layout
        }
    }

    fn pipeline(&self, with_triangles: bool) -> &ComputePipeline {
        if with_triangles {
            &self.mesh_pipeline
        } else {
            &self.basic_pipeline
        }
    }
}

impl std::fmt::Debug for EmissionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmissionPipeline")
            .field("threads_per_group", &self.threads_per_group)
            .finish_non_exhaustive()
    }
}

fn create_pipeline(
    device: &Device,
    shader: &wgpu::ShaderModule,
    layout: &BindGroupLayout,
    entry_point: &str,
    label: &str,
) -> ComputePipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: shader,
        entry_point: Some(entry_point),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}

/// Device buffers owned by one emitter.
struct EmitterResources {
    blocks: HashMap<BindingSlot, Buffer>,
    triangles: Buffer,
    triangle_capacity: u64,
    bind_groups: [Option<wgpu::BindGroup>; 2],
}

impl EmitterResources {
    fn new(device: &Device, emitter: EmitterId) -> Self {
        let blocks = BindingSlot::BLOCKS
            .into_iter()
            .filter(|slot| *slot != BindingSlot::Frame)
            .map(|slot| {
                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{emitter} {slot:?} Block")),
                    size: block_size(slot),
                    usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                (slot, buffer)
            })
            .collect();

        let triangle_capacity = std::mem::size_of::<GpuMeshTriangle>() as u64;
        let triangles = create_triangle_buffer(device, emitter, triangle_capacity);

        Self {
            blocks,
            triangles,
            triangle_capacity,
            bind_groups: [None, None],
        }
    }
}

fn create_triangle_buffer(device: &Device, emitter: EmitterId, size: u64) -> Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(&format!("{emitter} Mesh Triangles")),
        size,
        usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Per-emitter device buffers, kept across frames.
///
/// Cached bind groups reference the pool's buffers, so a cache must only be
/// used with the pool it was first used with.
#[derive(Default)]
pub struct EmitterResourceCache {
    emitters: HashMap<EmitterId, EmitterResources>,
}

impl EmitterResourceCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops resources for emitters not in `live`.
    pub fn retain(&mut self, live: &[EmitterId]) {
        let before = self.emitters.len();
        self.emitters.retain(|id, _| live.contains(id));
        let dropped = before - self.emitters.len();
        if dropped > 0 {
            debug!("Released GPU resources of {} emitters", dropped);
        }
    }

    /// Returns the number of emitters with resident resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    /// Returns true when no emitter has resident resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }
}

impl std::fmt::Debug for EmitterResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitterResourceCache")
            .field("emitters", &self.emitters.len())
            .finish()
    }
}

/// [`ComputeTarget`] backed by a wgpu device and queue.
///
/// Uploads go through `Queue::write_buffer`. Each dispatch is submitted in its
/// own command buffer, so uploads made between two dispatches are visible to
/// the second one only. wgpu tracks buffer usage itself; transitions are
/// validated against the tracked logical state and logged.
pub struct WgpuComputeTarget<'a> {
    device: &'a Device,
    queue: &'a Queue,
    pipeline: &'a EmissionPipeline,
    pool: &'a mut ParticlePool,
    cache: &'a mut EmitterResourceCache,
    selected: Option<EmitterId>,
    bound: Vec<BindingSlot>,
    pool_state: BufferState,
}

impl<'a> WgpuComputeTarget<'a> {
    /// Creates a target for one frame.
    pub fn new(
        device: &'a Device,
        queue: &'a Queue,
        pipeline: &'a EmissionPipeline,
        pool: &'a mut ParticlePool,
        cache: &'a mut EmitterResourceCache,
    ) -> Self {
        Self {
            device,
            queue,
            pipeline,
            pool,
            cache,
            selected: None,
            bound: Vec::with_capacity(13),
            pool_state: BufferState::ShaderRead,
        }
    }

    fn selected_resources(&mut self) -> GpuResult<(EmitterId, &mut EmitterResources)> {
        let id = self
            .selected
            .ok_or_else(|| GpuError::DispatchError("no emitter selected".to_string()))?;
        let device = self.device;
        let resources = self
            .cache
            .emitters
            .entry(id)
            .or_insert_with(|| EmitterResources::new(device, id));
        Ok((id, resources))
    }

    fn upload_triangles(&mut self, bytes: &[u8]) -> GpuResult<()> {
        let device = self.device;
        let queue = self.queue;
        let (id, resources) = self.selected_resources()?;

        let needed = (bytes.len() as u64).max(std::mem::size_of::<GpuMeshTriangle>() as u64);
        if needed > resources.triangle_capacity {
            let capacity = needed.next_power_of_two();
            debug!("Growing triangle buffer of {} to {} bytes", id, capacity);
            resources.triangles = create_triangle_buffer(device, id, capacity);
            resources.triangle_capacity = capacity;
            resources.bind_groups[1] = None;
        }
        if !bytes.is_empty() {
            queue.write_buffer(&resources.triangles, 0, bytes);
        }
        Ok(())
    }
}

impl ComputeTarget for WgpuComputeTarget<'_> {
    fn select_emitter(&mut self, emitter: EmitterId) {
        self.selected = Some(emitter);
        self.bound.clear();
    }

    fn upload(&mut self, slot: BindingSlot, bytes: &[u8]) -> GpuResult<()> {
        match slot {
            BindingSlot::Frame => {
                self.queue.write_buffer(self.pool.frame_buffer(), 0, bytes);
                Ok(())
            },
            BindingSlot::MeshTriangles => self.upload_triangles(bytes),
            slot if slot.is_uniform() => {
                if bytes.len() as u64 != block_size(slot) {
                    return Err(GpuError::DispatchError(format!(
                        "{slot:?} upload of {} bytes, expected {}",
                        bytes.len(),
                        block_size(slot)
                    )));
                }
                let queue = self.queue;
                let (_, resources) = self.selected_resources()?;
                if let Some(buffer) = resources.blocks.get(&slot) {
                    queue.write_buffer(buffer, 0, bytes);
                }
                Ok(())
            },
            slot => Err(GpuError::DispatchError(format!(
                "{slot:?} is owned by the particle pool"
            ))),
        }
    }

    fn update_pool(&mut self, frame: &FrameBlock) {
        self.pool.update(self.queue, frame);
    }

    fn transition(&mut self, buffers: &[PoolBuffer], from: BufferState, to: BufferState) {
        if self.pool_state != from {
            warn!(
                "Pool buffers transitioned from {:?} while in {:?}",
                from, self.pool_state
            );
        }
        trace!("Pool buffers {:?}: {:?} -> {:?}", buffers, from, to);
        self.pool_state = to;
    }

    fn bind(&mut self, slot: BindingSlot) {
        self.bound.push(slot);
    }

    fn dispatch(&mut self, groups: u32) -> GpuResult<()> {
        let bound = std::mem::take(&mut self.bound);
        let with_triangles = bound.contains(&BindingSlot::MeshTriangles);
        let expected: Vec<BindingSlot> = BindingSlot::dispatch_order(with_triangles).collect();
        if bound != expected {
            return Err(GpuError::DispatchError(format!(
                "bindings {bound:?} do not follow the emission protocol"
            )));
        }
        if self.pool_state != BufferState::ComputeWrite {
            return Err(GpuError::DispatchError(
                "pool buffers are not in compute-write state".to_string(),
            ));
        }

        let device = self.device;
        let pipeline = self.pipeline;
        let pool = &*self.pool;
        let frame_buffer = pool.frame_buffer();
        let (id, resources) = {
            let id = self
                .selected
                .ok_or_else(|| GpuError::DispatchError("no emitter selected".to_string()))?;
            let resources = self
                .cache
                .emitters
                .entry(id)
                .or_insert_with(|| EmitterResources::new(device, id));
            (id, resources)
        };

        let variant = usize::from(with_triangles);
        if resources.bind_groups[variant].is_none() {
            let entries: Vec<wgpu::BindGroupEntry<'_>> = bound
                .iter()
                .filter_map(|slot| {
                    let buffer = match slot {
                        BindingSlot::Frame => Some(frame_buffer),
                        BindingSlot::MeshTriangles => Some(&resources.triangles),
                        slot => match slot.pool_buffer() {
                            Some(which) => Some(pool.buffer(which)),
                            None => resources.blocks.get(slot),
                        },
                    }?;
                    Some(wgpu::BindGroupEntry {
                        binding: slot.index(),
                        resource: buffer.as_entire_binding(),
                    })
                })
                .collect();

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{id} Emission Bind Group")),
                layout: pipeline.layout(with_triangles),
                entries: &entries,
            });
            resources.bind_groups[variant] = Some(bind_group);
        }

        let Some(bind_group) = resources.bind_groups[variant].as_ref() else {
            return Err(GpuError::DispatchError("bind group missing".to_string()));
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Emission Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Emission Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline.pipeline(with_triangles));
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        trace!("Dispatched {} groups for {}", groups, id);
        Ok(())
    }
}
