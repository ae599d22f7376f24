//! GPU validation helpers.
//!
//! - wgpu validation layer integration
//! - Error callback handling and logging
//! - Sanity checks on values read back from the particle pool

use tracing::{error, info, warn};

/// Returns wgpu instance flags for the requested validation setting.
///
/// Validation is only honoured in debug builds; release builds always run
/// without the validation layer.
#[must_use]
pub fn gpu_instance_flags(validation: bool) -> wgpu::InstanceFlags {
    if validation && cfg!(debug_assertions) {
        info!("GPU validation layer enabled (debug build)");
        wgpu::InstanceFlags::VALIDATION | wgpu::InstanceFlags::DEBUG
    } else {
        info!("GPU validation layer disabled");
        wgpu::InstanceFlags::empty()
    }
}

/// Creates a wgpu instance with the given validation setting.
#[must_use]
pub fn create_validated_instance(validation: bool) -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: gpu_instance_flags(validation),
        ..Default::default()
    })
}

/// Handles wgpu device errors by logging them.
///
/// Use this with `device.on_uncaptured_error()`.
pub fn handle_device_error(error: &wgpu::Error) {
    error!("GPU device error: {error}");
}

/// Checks an active-count readback against the pool capacity.
///
/// The kernel restores the free-list index when the pool is exhausted, so the
/// live count can never exceed the capacity. Returns false and logs when it
/// does.
pub fn check_active_count(active: u32, capacity: u32) -> bool {
    if active > capacity {
        warn!(
            "Active particle count {} exceeds pool capacity {}",
            active, capacity
        );
        return false;
    }
    true
}
