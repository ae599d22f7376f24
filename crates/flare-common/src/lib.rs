//! # Flare Common
//!
//! Common types and shared abstractions for Project Flare.
//!
//! This crate provides foundational types used across the Flare crates:
//! - Emitter identifiers shared by the CPU emitter layer and GPU resources
//! - Version information for the effect document schema
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod ids;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::version::*;
}

pub use prelude::*;
