//! # Flare Effects
//!
//! CPU side of the particle emission subsystem.
//!
//! This crate provides:
//! - Emission shapes with interval scheduling
//! - Spawn parameters and trail sub-stepping
//! - Mesh surface extraction with active-edge masks
//! - Emitters, emitter groups and the group manager
//! - The emission dispatcher driving a [`flare_kernel::ComputeTarget`]
//! - Effect documents (JSON) for saving and loading groups
//!
//! ## Frame flow
//!
//! [`EffectContext::frame`] updates every group (timers, auto-stop, trail
//! sub-steps), forwards the per-frame block to the pool, then dispatches every
//! active emitter of every active and playing group.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod document;
pub mod emitter;
pub mod group;
pub mod mesh;
pub mod shape;
pub mod spawn;
pub mod trail;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::context::*;
    pub use crate::dispatcher::*;
    pub use crate::document::*;
    pub use crate::emitter::*;
    pub use crate::group::*;
    pub use crate::mesh::*;
    pub use crate::shape::*;
    pub use crate::spawn::*;
    pub use crate::trail::*;
}

pub use prelude::*;
