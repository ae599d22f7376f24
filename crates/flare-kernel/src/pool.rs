//! Shared particle pool.
//!
//! The pool owns the device-side particle storage, a free-list stack of unused
//! slot indices, the free-list top-of-stack index and the active-particle
//! counter. Emitters never call into the pool to spawn: they bind its buffers
//! and the emission kernel pops slots itself with atomics. Because several
//! emitters dispatch against the same pool within one frame, the pop must be
//! an atomic decrement on the free-list index (see [`crate::shader`]).

use std::sync::mpsc;

use flare_common::{GpuError, GpuResult};
use tracing::{debug, info};
use wgpu::{util::DeviceExt, Buffer, BufferUsages, Device, MapMode, Queue};

use crate::blocks::{FrameBlock, GpuParticle};

/// Default pool capacity in particles.
pub const DEFAULT_POOL_CAPACITY: u32 = 65536;

/// One of the pool's device buffers, in binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolBuffer {
    /// Particle records.
    Particles,
    /// Top-of-stack index into the free list (`atomic<i32>`).
    FreeListIndex,
    /// Stack of unused slot indices.
    FreeList,
    /// Number of live particles (`atomic<u32>`).
    ActiveCount,
}

impl PoolBuffer {
    /// All pool buffers in the order the kernel binds them.
    pub const ALL: [Self; 4] = [
        Self::Particles,
        Self::FreeListIndex,
        Self::FreeList,
        Self::ActiveCount,
    ];
}

/// Initial free-list contents: every slot is free.
#[must_use]
pub fn initial_free_list(capacity: u32) -> Vec<u32> {
    (0..capacity).collect()
}

/// Initial top-of-stack index for a full free list.
#[must_use]
pub const fn initial_free_list_index(capacity: u32) -> i32 {
    capacity as i32 - 1
}

/// Fixed-capacity device particle pool.
pub struct ParticlePool {
    particles: Buffer,
    free_list_index: Buffer,
    free_list: Buffer,
    active_count: Buffer,
    /// Per-frame block forwarded by the dispatcher each frame.
    frame_buffer: Buffer,
    /// Staging buffer for active-count readback.
    readback: Buffer,
    frame: FrameBlock,
    capacity: u32,
}

impl ParticlePool {
    /// Creates a pool with `capacity` slots, all on the free list.
    pub fn new(device: &Device, capacity: u32) -> GpuResult<Self> {
        if capacity == 0 || capacity > i32::MAX as u32 {
            return Err(GpuError::BufferAlloc(format!(
                "invalid particle pool capacity {capacity}"
            )));
        }

        let storage_size = u64::from(capacity) * std::mem::size_of::<GpuParticle>() as u64;
        let max_binding = u64::from(device.limits().max_storage_buffer_binding_size);
        if storage_size > max_binding {
            return Err(GpuError::BufferAlloc(format!(
                "particle storage of {storage_size} bytes exceeds device limit {max_binding}"
            )));
        }

        info!("Creating particle pool with {} slots", capacity);

        let particles = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Pool Storage"),
            size: storage_size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::VERTEX,
            mapped_at_creation: false,
        });

        let free_list = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Pool Free List"),
            contents: bytemuck::cast_slice(&initial_free_list(capacity)),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
        });

        let free_list_index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Pool Free List Index"),
            contents: bytemuck::bytes_of(&initial_free_list_index(capacity)),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
        });

        let active_count = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Pool Active Count"),
            contents: bytemuck::bytes_of(&0u32),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
        });

        let frame = FrameBlock {
            pool_capacity: capacity,
            ..FrameBlock::default()
        };
        let frame_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Pool Frame Block"),
            contents: bytemuck::bytes_of(&frame),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Pool Count Readback"),
            size: std::mem::size_of::<u32>() as u64,
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Ok(Self {
            particles,
            free_list_index,
            free_list,
            active_count,
            frame_buffer,
            readback,
            frame,
            capacity,
        })
    }

    /// Returns every slot to the free list and zeroes the active count.
    pub fn reset(&self, queue: &Queue) {
        queue.write_buffer(
            &self.free_list,
            0,
            bytemuck::cast_slice(&initial_free_list(self.capacity)),
        );
        queue.write_buffer(
            &self.free_list_index,
            0,
            bytemuck::bytes_of(&initial_free_list_index(self.capacity)),
        );
        queue.write_buffer(&self.active_count, 0, bytemuck::bytes_of(&0u32));
        debug!("Particle pool reset ({} slots free)", self.capacity);
    }

    /// Pool update step: takes this frame's per-frame block.
    ///
    /// The capacity field is always overwritten with the pool's own value.
    pub fn update(&mut self, queue: &Queue, frame: &FrameBlock) {
        self.frame = FrameBlock {
            pool_capacity: self.capacity,
            ..*frame
        };
        queue.write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&self.frame));
    }

    /// Returns the device buffer for `which`.
    #[must_use]
    pub fn buffer(&self, which: PoolBuffer) -> &Buffer {
        match which {
            PoolBuffer::Particles => &self.particles,
            PoolBuffer::FreeListIndex => &self.free_list_index,
            PoolBuffer::FreeList => &self.free_list,
            PoolBuffer::ActiveCount => &self.active_count,
        }
    }

    /// Returns the per-frame block buffer written by [`update`](Self::update).
    #[must_use]
    pub fn frame_buffer(&self) -> &Buffer {
        &self.frame_buffer
    }

    /// Returns the last per-frame block received.
    #[must_use]
    pub const fn frame(&self) -> &FrameBlock {
        &self.frame
    }

    /// Returns the pool capacity in particles.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Reads the active-particle counter back to the CPU.
    ///
    /// Diagnostics only: this waits for the device, so it must never gate
    /// per-frame emission logic.
    pub fn read_active_count(&self, device: &Device, queue: &Queue) -> GpuResult<u32> {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Particle Pool Count Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(
            &self.active_count,
            0,
            &self.readback,
            0,
            std::mem::size_of::<u32>() as u64,
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = self.readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => {},
            Ok(Err(e)) => return Err(GpuError::Readback(e.to_string())),
            Err(e) => return Err(GpuError::Readback(e.to_string())),
        }

        let count = {
            let data = slice.get_mapped_range();
            bytemuck::pod_read_unaligned::<u32>(&data[..4])
        };
        self.readback.unmap();
        Ok(count)
    }
}

impl std::fmt::Debug for ParticlePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticlePool")
            .field("capacity", &self.capacity)
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}
