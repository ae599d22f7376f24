//! Headless effect runner.
//!
//! Loads an effect document (or builds the demo scene), then steps it for a
//! fixed number of frames against the GPU. Without an adapter the frames are
//! recorded instead of executed so documents can still be validated on CI.

use anyhow::{Context, Result};
use flare_common::{FlareResult, GpuError};
use flare_effects::{
    EffectContext, FrameReport, GroupManager, MeshEmitMode, Placement, ShapeConfig, ShapeKind, ShapeParams,
    SpawnParameters, TrailConfig,
};
use flare_kernel::{
    check_active_count, create_validated_instance, handle_device_error, EmissionPipeline, EmitterResourceCache,
    ParticlePool, RecordingTarget, WgpuComputeTarget,
};
use glam::{Quat, Vec3, Vec4};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::models::{self, BuiltinModels};

/// Demo group names.
const BURST_GROUP: &str = "burst";
const TRAIL_GROUP: &str = "comet";
const MESH_GROUP: &str = "outline";

/// Radius of the comet's circular path.
const COMET_RADIUS: f32 = 4.0;

/// GPU device and queue for compute-only work.
struct Gpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl Gpu {
    /// Requests a headless adapter and device.
    async fn new(validation: bool) -> FlareResult<Self> {
        let instance = create_validated_instance(validation);

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| GpuError::InitFailed("no suitable GPU adapter".to_string()))?;

        info!("Using GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Flare Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| GpuError::InitFailed(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|e| handle_device_error(&e)));

        Ok(Self { device, queue })
    }
}

/// Totals over a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Frames stepped.
    pub frames: u32,
    /// Kernel dispatches issued.
    pub dispatches: u64,
    /// Dispatches that spawned particles.
    pub emissions: u64,
    /// Particles requested from the pool.
    pub requested_particles: u64,
    /// Live particles read back after the last frame (GPU runs only).
    pub active_particles: Option<u32>,
}

impl RunSummary {
    fn record(&mut self, report: &FrameReport) {
        self.frames += 1;
        self.dispatches += u64::from(report.stats.dispatches);
        self.emissions += u64::from(report.stats.emissions);
        self.requested_particles += report.stats.requested_particles;
        for group in &report.auto_stopped {
            info!("Group '{}' finished after frame {}", group, report.frame_index);
        }
    }
}

/// Runs the effect runner with the given configuration.
pub fn run(mut config: EngineConfig) -> Result<()> {
    config.validate();

    info!("Configuration loaded:");
    info!("  Frames: {} at {:.4}s", config.frame_count, config.delta_time);
    info!("  Pool capacity: {}", config.effects.pool_capacity);
    info!("  Max mesh triangles: {}", config.effects.max_mesh_triangles);

    let models = BuiltinModels::new();

    let summary = match pollster::block_on(Gpu::new(config.gpu_validation)) {
        Ok(gpu) => run_on_gpu(&gpu, &mut config, &models)?,
        Err(e) if config.allow_dry_run => {
            warn!("{e}; recording dispatches without a GPU");
            let mut context = build_context(&config, &models)?;
            let summary = run_recorded(&mut context, &config)?;
            save_output(&context, &config)?;
            summary
        },
        Err(e) => return Err(e).context("GPU initialization failed"),
    };

    info!(
        "Ran {} frames: {} dispatches, {} emissions, {} particles requested",
        summary.frames, summary.dispatches, summary.emissions, summary.requested_particles
    );
    if let Some(active) = summary.active_particles {
        info!("Live particles: {}", active);
    }

    Ok(())
}

fn run_on_gpu(gpu: &Gpu, config: &mut EngineConfig, models: &BuiltinModels) -> Result<RunSummary> {
    info!("Initializing emission pipeline...");
    let pipeline = EmissionPipeline::new(&gpu.device, config.effects.threads_per_group);
    // Group counts must be computed with the size the kernel was built with
    config.effects.threads_per_group = pipeline.threads_per_group();

    let mut pool = ParticlePool::new(&gpu.device, config.effects.pool_capacity)
        .context("Failed to create particle pool")?;
    let mut cache = EmitterResourceCache::new();

    let mut context = build_context(config, models)?;
    let animate = config.document_path.is_none();

    let mut summary = RunSummary::default();
    for _ in 0..config.frame_count {
        if animate {
            let time = context.time() + config.delta_time;
            animate_demo(context.manager_mut(), time);
        }

        let mut target = WgpuComputeTarget::new(&gpu.device, &gpu.queue, &pipeline, &mut pool, &mut cache);
        let report = context.frame(&mut target, config.delta_time)?;
        summary.record(&report);

        cache.retain(&context.manager().emitter_ids());
    }

    gpu.device.poll(wgpu::Maintain::Wait);
    let active = pool
        .read_active_count(&gpu.device, &gpu.queue)
        .context("Failed to read active particle count")?;
    check_active_count(active, pool.capacity());
    summary.active_particles = Some(active);
    debug!("{} emitter resource sets cached", cache.len());

    save_output(&context, config)?;
    Ok(summary)
}

/// Steps the context against a recording target.
fn run_recorded(context: &mut EffectContext, config: &EngineConfig) -> Result<RunSummary> {
    let animate = config.document_path.is_none();
    let mut target = RecordingTarget::new();
    let mut summary = RunSummary::default();

    for _ in 0..config.frame_count {
        if animate {
            let time = context.time() + config.delta_time;
            animate_demo(context.manager_mut(), time);
        }
        target.clear();
        let report = context.frame(&mut target, config.delta_time)?;
        summary.record(&report);
    }

    Ok(summary)
}

fn build_context(config: &EngineConfig, models: &BuiltinModels) -> Result<EffectContext> {
    let mut context = EffectContext::new(config.effects.clone());

    match &config.document_path {
        Some(path) => {
            context
                .manager_mut()
                .load_from(path, Some(models))
                .with_context(|| format!("Failed to load effect document {}", path.display()))?;
            let manager = context.manager_mut();
            let names: Vec<String> = manager.groups().map(|g| g.name().to_string()).collect();
            for name in &names {
                manager.play(name);
            }
        },
        None => build_demo(context.manager_mut(), models),
    }

    Ok(context)
}

fn save_output(context: &EffectContext, config: &EngineConfig) -> Result<()> {
    if let Some(path) = &config.output_path {
        context
            .manager()
            .save_to(path)
            .with_context(|| format!("Failed to save effect document {}", path.display()))?;
        info!("Saved effect document to {}", path.display());
    }
    Ok(())
}

/// Builds the demo scene: a repeating burst, a comet trail and a mesh outline.
fn build_demo(manager: &mut GroupManager, models: &BuiltinModels) {
    if manager.create_group(BURST_GROUP).is_some() {
        manager.create_emitter(BURST_GROUP, "sparks");
        manager.configure_shape(
            BURST_GROUP,
            "sparks",
            ShapeConfig {
                translate: Vec3::new(0.0, 1.0, 0.0),
                params: ShapeParams::Sphere { radius: 0.25 },
                count: 256,
                interval: 0.5,
            },
        );
        manager.set_spawn_params(
            BURST_GROUP,
            "sparks",
            SpawnParameters {
                lifetime: 0.8,
                lifetime_variance: 0.2,
                velocity: Vec3::new(0.0, 2.0, 0.0),
                velocity_variance: Vec3::splat(1.5),
                color: Vec4::new(1.0, 0.7, 0.2, 1.0),
                ..SpawnParameters::default()
            },
        );
        manager.set_auto_stop(BURST_GROUP, 3.0);
        manager.play(BURST_GROUP);
    }

    if manager.create_group(TRAIL_GROUP).is_some() {
        manager.create_emitter(TRAIL_GROUP, "tail");
        manager.configure_shape(
            TRAIL_GROUP,
            "tail",
            ShapeConfig {
                params: ShapeParams::Cone {
                    direction: Vec3::Y,
                    radius: 0.1,
                    height: 0.2,
                },
                count: 8,
                interval: 0.25,
                ..ShapeConfig::default_for(ShapeKind::Cone)
            },
        );
        manager.retarget(
            TRAIL_GROUP,
            "tail",
            Placement {
                translate: Vec3::ZERO,
                orientation: Some(Quat::from_rotation_x(std::f32::consts::FRAC_PI_2)),
            },
        );
        manager.set_trail(
            TRAIL_GROUP,
            "tail",
            TrailConfig {
                enabled: true,
                min_distance: 0.2,
                lifetime_override: 0.5,
                emission_count: 4,
                inherit_scale: false,
            },
        );
        manager.set_group_origin(TRAIL_GROUP, Vec3::new(COMET_RADIUS, 0.0, 0.0));
        manager.play(TRAIL_GROUP);
    }

    if manager.create_group(MESH_GROUP).is_some() {
        manager.create_emitter(MESH_GROUP, "edges");
        manager.configure_shape(
            MESH_GROUP,
            "edges",
            ShapeConfig {
                params: ShapeParams::Mesh {
                    scale: Vec3::splat(2.0),
                    rotation: Quat::IDENTITY,
                    mode: MeshEmitMode::Edge,
                },
                count: 128,
                interval: 0.1,
                ..ShapeConfig::default_for(ShapeKind::Mesh)
            },
        );
        let cube = models.get(models::CUBE).map(|m| m as &dyn flare_effects::ModelSource);
        manager.set_mesh_source(MESH_GROUP, "edges", cube);
        manager.set_texture(MESH_GROUP, "edges", "textures/glow.png");
        manager.play(MESH_GROUP);
    }

    info!("Built demo scene with {} groups", manager.groups().count());
}

/// Moves the comet around its circle.
fn animate_demo(manager: &mut GroupManager, time: f32) {
    let angle = time * std::f32::consts::TAU * 0.25;
    let origin = Vec3::new(angle.cos() * COMET_RADIUS, 0.0, angle.sin() * COMET_RADIUS);
    manager.set_group_origin(TRAIL_GROUP, origin);
}
