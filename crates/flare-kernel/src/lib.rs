//! # Flare Kernel
//!
//! GPU side of the particle emission subsystem.
//!
//! This crate provides:
//! - Pod parameter blocks matching the WGSL emission kernel layouts
//! - Mapped block views for CPU → GPU parameter updates
//! - The shared particle pool (particle storage, free list, active counter)
//! - The fixed dispatch protocol (binding order, buffer-state bracketing)
//! - The WGSL emission kernel and its wgpu pipeline
//! - GPU validation helpers
//!
//! ## Architecture
//!
//! Every emitter in a frame spawns into one shared [`ParticlePool`]. Slots are
//! popped from the pool's free list by the kernel itself with atomics, so no
//! CPU-side locking is involved; the CPU only fills parameter blocks and
//! records dispatches through a [`ComputeTarget`].
//!
//! ## Dispatch protocol
//!
//! The kernel relies on a bit-exact binding order (see [`BindingSlot`]).
//! [`record_emission_dispatch`] is the single place that order is produced,
//! and it always brackets the dispatch with pool buffer transitions.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod blocks;
pub mod dispatch;
pub mod mapped;
pub mod pipeline;
pub mod pool;
pub mod shader;
pub mod validation;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::blocks::*;
    pub use crate::dispatch::*;
    pub use crate::mapped::*;
    pub use crate::pipeline::*;
    pub use crate::pool::*;
    pub use crate::shader::*;
    pub use crate::validation::*;
}

pub use prelude::*;
