//! Emission dispatch protocol.
//!
//! The emission kernel reads its inputs from fixed binding slots. This module
//! owns that order and the buffer-state bracketing around each dispatch, and
//! abstracts the command stream behind [`ComputeTarget`] so the protocol can
//! be driven against wgpu ([`crate::pipeline::WgpuComputeTarget`]) or recorded
//! for inspection ([`RecordingTarget`]).

use flare_common::{EmitterId, GpuResult};
use tracing::trace;

use crate::blocks::FrameBlock;
use crate::pool::PoolBuffer;

/// Binding slots of the emission kernel, in bind order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum BindingSlot {
    /// Common block (active shape tag, seed, time).
    Common = 0,
    /// Sphere shape block.
    Sphere = 1,
    /// Box shape block.
    Box = 2,
    /// Triangle shape block.
    Triangle = 3,
    /// Cone shape block.
    Cone = 4,
    /// Mesh shape block.
    Mesh = 5,
    /// Per-frame block.
    Frame = 6,
    /// Spawn parameters block.
    Spawn = 7,
    /// Pool particle storage.
    Particles = 8,
    /// Pool free-list index.
    FreeListIndex = 9,
    /// Pool free list.
    FreeList = 10,
    /// Pool active-particle counter.
    ActiveCount = 11,
    /// Mesh triangle buffer, bound only for the mesh shape.
    MeshTriangles = 12,
}

impl BindingSlot {
    /// Parameter blocks, in bind order.
    pub const BLOCKS: [Self; 8] = [
        Self::Common,
        Self::Sphere,
        Self::Box,
        Self::Triangle,
        Self::Cone,
        Self::Mesh,
        Self::Frame,
        Self::Spawn,
    ];

    /// Pool buffers, in bind order.
    pub const POOL: [Self; 4] = [
        Self::Particles,
        Self::FreeListIndex,
        Self::FreeList,
        Self::ActiveCount,
    ];

    /// Returns the WGSL `@binding` index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self as u32
    }

    /// Returns the full bind sequence for one dispatch.
    pub fn dispatch_order(with_triangles: bool) -> impl Iterator<Item = Self> {
        Self::BLOCKS
            .into_iter()
            .chain(Self::POOL)
            .chain(with_triangles.then_some(Self::MeshTriangles))
    }

    /// Maps a pool binding to its pool buffer.
    #[must_use]
    pub const fn pool_buffer(self) -> Option<PoolBuffer> {
        match self {
            Self::Particles => Some(PoolBuffer::Particles),
            Self::FreeListIndex => Some(PoolBuffer::FreeListIndex),
            Self::FreeList => Some(PoolBuffer::FreeList),
            Self::ActiveCount => Some(PoolBuffer::ActiveCount),
            _ => None,
        }
    }

    /// Returns true for uniform parameter blocks.
    #[must_use]
    pub const fn is_uniform(self) -> bool {
        (self as u32) <= Self::Spawn as u32
    }
}

/// Logical state of a pool buffer relative to the emission kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferState {
    /// Readable by other passes (simulation, rendering).
    #[default]
    ShaderRead,
    /// Writable by the emission compute kernel.
    ComputeWrite,
}

/// Thread groups needed for `requested` particles. Never returns zero.
#[must_use]
pub const fn thread_group_count(requested: u32, threads_per_group: u32) -> u32 {
    let threads = if threads_per_group == 0 { 1 } else { threads_per_group };
    let groups = requested.div_ceil(threads);
    if groups == 0 {
        1
    } else {
        groups
    }
}

/// A command stream the emission dispatch protocol is recorded into.
pub trait ComputeTarget {
    /// Selects the emitter whose resource set subsequent uploads and binds use.
    fn select_emitter(&mut self, emitter: EmitterId);

    /// Copies `bytes` into the buffer behind `slot` for the selected emitter.
    ///
    /// [`BindingSlot::Frame`] is shared by every emitter.
    fn upload(&mut self, slot: BindingSlot, bytes: &[u8]) -> GpuResult<()>;

    /// Forwards the per-frame block to the pool's update step.
    fn update_pool(&mut self, frame: &FrameBlock);

    /// Moves pool buffers from one state to another.
    fn transition(&mut self, buffers: &[PoolBuffer], from: BufferState, to: BufferState);

    /// Binds the resource behind `slot` at its binding index.
    fn bind(&mut self, slot: BindingSlot);

    /// Issues the dispatch with everything bound since the last dispatch.
    fn dispatch(&mut self, groups: u32) -> GpuResult<()>;
}

/// Records one emission dispatch with the fixed protocol.
///
/// Pool buffers are moved to [`BufferState::ComputeWrite`] before binding and
/// back to [`BufferState::ShaderRead`] afterwards, exactly once each, even when
/// `requested_count` is zero or the dispatch fails. Returns the thread-group
/// count used.
pub fn record_emission_dispatch<T: ComputeTarget + ?Sized>(
    target: &mut T,
    requested_count: u32,
    threads_per_group: u32,
    with_triangles: bool,
) -> GpuResult<u32> {
    let groups = thread_group_count(requested_count, threads_per_group);
    trace!(
        "Emission dispatch: {} requested, {} groups, triangles bound: {}",
        requested_count,
        groups,
        with_triangles
    );

    target.transition(&PoolBuffer::ALL, BufferState::ShaderRead, BufferState::ComputeWrite);
    for slot in BindingSlot::dispatch_order(with_triangles) {
        target.bind(slot);
    }
    let result = target.dispatch(groups);
    target.transition(&PoolBuffer::ALL, BufferState::ComputeWrite, BufferState::ShaderRead);

    result.map(|()| groups)
}

/// A command captured by [`RecordingTarget`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// Emitter selected.
    Select(EmitterId),
    /// Bytes uploaded to a slot.
    Upload {
        /// Emitter selected at upload time.
        emitter: Option<EmitterId>,
        /// Destination slot.
        slot: BindingSlot,
        /// Uploaded bytes.
        bytes: Vec<u8>,
    },
    /// Per-frame block forwarded to the pool.
    PoolUpdate(FrameBlock),
    /// Pool buffer transition.
    Transition {
        /// Buffers moved.
        buffers: Vec<PoolBuffer>,
        /// Previous state.
        from: BufferState,
        /// New state.
        to: BufferState,
    },
    /// Slot bound.
    Bind(BindingSlot),
    /// Dispatch issued.
    Dispatch {
        /// Emitter selected at dispatch time.
        emitter: Option<EmitterId>,
        /// Slots bound for this dispatch, in order.
        bindings: Vec<BindingSlot>,
        /// Thread-group count.
        groups: u32,
    },
}

/// [`ComputeTarget`] that records commands instead of executing them.
///
/// Used for headless runs and for checking the protocol without a device.
#[derive(Debug, Default)]
pub struct RecordingTarget {
    commands: Vec<RecordedCommand>,
    selected: Option<EmitterId>,
    pending_bindings: Vec<BindingSlot>,
}

impl RecordingTarget {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded command in order.
    #[must_use]
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Clears recorded commands.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.pending_bindings.clear();
    }

    /// Returns `(emitter, bindings, groups)` for every dispatch.
    pub fn dispatches(&self) -> impl Iterator<Item = (Option<EmitterId>, &[BindingSlot], u32)> {
        self.commands.iter().filter_map(|command| match command {
            RecordedCommand::Dispatch {
                emitter,
                bindings,
                groups,
            } => Some((*emitter, bindings.as_slice(), *groups)),
            _ => None,
        })
    }

    /// Returns the number of dispatches recorded.
    #[must_use]
    pub fn dispatch_count(&self) -> usize {
        self.dispatches().count()
    }

    /// Decodes every upload to `slot` for `emitter`, in order.
    #[must_use]
    pub fn uploads<T: bytemuck::Pod>(&self, emitter: Option<EmitterId>, slot: BindingSlot) -> Vec<T> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::Upload {
                    emitter: e,
                    slot: s,
                    bytes,
                } if *e == emitter && *s == slot && bytes.len() >= std::mem::size_of::<T>() => {
                    Some(bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<T>()]))
                },
                _ => None,
            })
            .collect()
    }

    /// Decodes the most recent upload to `slot` for `emitter`.
    #[must_use]
    pub fn last_upload<T: bytemuck::Pod>(&self, emitter: Option<EmitterId>, slot: BindingSlot) -> Option<T> {
        self.uploads(emitter, slot).pop()
    }

    /// Decodes, for every dispatch in order, the contents `slot` held for the
    /// dispatching emitter. Skipped uploads of unchanged blocks keep the
    /// previous contents.
    #[must_use]
    pub fn uploads_at_dispatch<T: bytemuck::Pod>(&self, slot: BindingSlot) -> Vec<Option<T>> {
        let mut latest: Vec<(Option<EmitterId>, T)> = Vec::new();
        let mut seen = Vec::new();
        for command in &self.commands {
            match command {
                RecordedCommand::Upload {
                    emitter,
                    slot: s,
                    bytes,
                } if *s == slot && bytes.len() >= std::mem::size_of::<T>() => {
                    let value = bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<T>()]);
                    match latest.iter_mut().find(|(e, _)| e == emitter) {
                        Some(entry) => entry.1 = value,
                        None => latest.push((*emitter, value)),
                    }
                },
                RecordedCommand::Dispatch { emitter, .. } => {
                    seen.push(latest.iter().find(|(e, _)| e == emitter).map(|(_, v)| *v));
                },
                _ => {},
            }
        }
        seen
    }
}

impl ComputeTarget for RecordingTarget {
    fn select_emitter(&mut self, emitter: EmitterId) {
        self.selected = Some(emitter);
        self.commands.push(RecordedCommand::Select(emitter));
    }

    fn upload(&mut self, slot: BindingSlot, bytes: &[u8]) -> GpuResult<()> {
        let emitter = if slot == BindingSlot::Frame {
            None
        } else {
            self.selected
        };
        self.commands.push(RecordedCommand::Upload {
            emitter,
            slot,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn update_pool(&mut self, frame: &FrameBlock) {
        self.commands.push(RecordedCommand::PoolUpdate(*frame));
    }

    fn transition(&mut self, buffers: &[PoolBuffer], from: BufferState, to: BufferState) {
        self.commands.push(RecordedCommand::Transition {
            buffers: buffers.to_vec(),
            from,
            to,
        });
    }

    fn bind(&mut self, slot: BindingSlot) {
        self.pending_bindings.push(slot);
        self.commands.push(RecordedCommand::Bind(slot));
    }

    fn dispatch(&mut self, groups: u32) -> GpuResult<()> {
        let bindings = std::mem::take(&mut self.pending_bindings);
        self.commands.push(RecordedCommand::Dispatch {
            emitter: self.selected,
            bindings,
            groups,
        });
        Ok(())
    }
}
