//! # Flare Engine
//!
//! Headless runner for Project Flare particle effects.
//!
//! This crate ties together all subsystems:
//! - Kernel: GPU emission pipeline and the shared particle pool
//! - Effects: emitter groups, shapes, trails and effect documents
//!
//! Usage: `flare [config.toml]`. Without an argument the configuration is
//! read from the platform config directory.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod app;
mod config;
mod models;

use anyhow::Result;
use config::EngineConfig;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("flare=info".parse()?))
        .init();

    info!("Project Flare starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args_os().nth(1) {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load_or_init(),
    };

    // Run the effects
    app::run(config)?;

    info!("Project Flare shutdown complete");
    Ok(())
}
