//! Effect context: the group manager and dispatcher driven together.
//!
//! Built once per session and passed by reference to whoever drives frames.

use flare_common::GpuResult;
use flare_kernel::ComputeTarget;
use tracing::debug;

use crate::config::EffectsConfig;
use crate::dispatcher::{DispatchStats, EmissionDispatcher, EmitterFrame};
use crate::group::GroupManager;

/// Summary of one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Frame number, starting at 1.
    pub frame_index: u32,
    /// Groups that auto-stopped this frame.
    pub auto_stopped: Vec<String>,
    /// Dispatch counters.
    pub stats: DispatchStats,
}

/// Owns the emitter registry and the dispatcher.
#[derive(Debug)]
pub struct EffectContext {
    manager: GroupManager,
    dispatcher: EmissionDispatcher,
    time: f32,
}

impl EffectContext {
    /// Creates a context.
    #[must_use]
    pub fn new(mut config: EffectsConfig) -> Self {
        config.validate();
        Self {
            dispatcher: EmissionDispatcher::new(config.threads_per_group),
            manager: GroupManager::new(config),
            time: 0.0,
        }
    }

    /// Returns the group manager.
    #[must_use]
    pub const fn manager(&self) -> &GroupManager {
        &self.manager
    }

    /// Returns the group manager mutably.
    pub fn manager_mut(&mut self) -> &mut GroupManager {
        &mut self.manager
    }

    /// Returns the dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &EmissionDispatcher {
        &self.dispatcher
    }

    /// Seconds simulated so far.
    #[must_use]
    pub const fn time(&self) -> f32 {
        self.time
    }

    /// Runs one frame: update every group, then dispatch every active
    /// emitter of every running group.
    pub fn frame<T: ComputeTarget + ?Sized>(&mut self, target: &mut T, delta_time: f32) -> GpuResult<FrameReport> {
        self.time += delta_time;
        let auto_stopped = self.manager.update(delta_time);

        self.dispatcher.begin_frame(target, self.time, delta_time);
        for group in self.manager.groups_mut() {
            if !group.is_running() {
                group.discard_pending();
                continue;
            }
            let origin = group.origin();
            let group_time = group.elapsed();
            for emitter in group.emitters_mut() {
                if !emitter.is_active() {
                    emitter.discard_pending();
                    continue;
                }
                self.dispatcher.run_emitter(
                    target,
                    emitter,
                    EmitterFrame {
                        origin,
                        group_time,
                        delta_time,
                    },
                )?;
            }
        }

        let stats = *self.dispatcher.stats();
        debug!(
            "Frame {}: {} emitters, {} dispatches, {} particles requested",
            self.dispatcher.frame().frame_index,
            stats.emitters,
            stats.dispatches,
            stats.requested_particles
        );

        Ok(FrameReport {
            frame_index: self.dispatcher.frame().frame_index,
            auto_stopped,
            stats,
        })
    }
}

impl Default for EffectContext {
    fn default() -> Self {
        Self::new(EffectsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ShapeConfig;
    use flare_kernel::{RecordedCommand, RecordingTarget};
    use glam::Vec3;

    #[test]
    fn test_only_running_groups_dispatch() {
        let mut context = EffectContext::default();
        let manager = context.manager_mut();
        manager.create_group("on").expect("group");
        manager.create_emitter("on", "a").expect("emitter");
        manager.create_emitter("on", "b").expect("emitter");
        manager.create_group("off").expect("group");
        manager.create_emitter("off", "c").expect("emitter");
        manager.play("on");

        let mut target = RecordingTarget::new();
        let report = context.frame(&mut target, 0.016).expect("frame");

        assert_eq!(report.frame_index, 1);
        assert_eq!(report.stats.emitters, 2);
        assert_eq!(target.dispatch_count(), 2);
        assert_eq!(
            target
                .commands()
                .iter()
                .filter(|c| matches!(c, RecordedCommand::PoolUpdate(_)))
                .count(),
            1
        );
    }

    #[test]
    fn test_explicit_emission_reaches_dispatch() {
        let mut context = EffectContext::default();
        let manager = context.manager_mut();
        manager.create_group("fx").expect("group");
        manager.create_emitter("fx", "burst").expect("emitter");
        manager.configure_shape(
            "fx",
            "burst",
            ShapeConfig {
                interval: 100.0,
                ..ShapeConfig::default()
            },
        );
        manager.play("fx");
        manager.emit_at_position("fx", "burst", Vec3::ONE, 3000);

        let mut target = RecordingTarget::new();
        let report = context.frame(&mut target, 0.016).expect("frame");

        assert_eq!(report.stats.emissions, 1);
        assert_eq!(report.stats.requested_particles, 3000);
        let (_, _, groups) = target.dispatches().next().expect("dispatch");
        assert_eq!(groups, 3);
    }

    #[test]
    fn test_emissions_while_inactive_are_not_replayed() {
        let mut context = EffectContext::default();
        let manager = context.manager_mut();
        manager.create_group("fx").expect("group");
        manager.create_emitter("fx", "burst").expect("emitter");
        manager.configure_shape(
            "fx",
            "burst",
            ShapeConfig {
                interval: 100.0,
                ..ShapeConfig::default()
            },
        );
        manager.play("fx");
        manager.set_group_active("fx", false);

        let mut target = RecordingTarget::new();
        for _ in 0..500 {
            context
                .manager_mut()
                .emit_at_position("fx", "burst", Vec3::ONE, 10);
            context.frame(&mut target, 0.016).expect("frame");
        }
        assert_eq!(target.dispatch_count(), 0);

        context.manager_mut().set_group_active("fx", true);
        let mut target = RecordingTarget::new();
        let report = context.frame(&mut target, 0.016).expect("frame");
        assert_eq!(report.stats.emissions, 0);
        assert_eq!(report.stats.requested_particles, 0);
        assert!(target.dispatch_count() <= 1);

        context
            .manager_mut()
            .emit_at_position("fx", "burst", Vec3::ONE, 10);
        let report = context.frame(&mut target, 0.016).expect("frame");
        assert_eq!(report.stats.emissions, 1);
        assert_eq!(report.stats.requested_particles, 10);
    }

    #[test]
    fn test_auto_stop_is_reported() {
        let mut context = EffectContext::default();
        let manager = context.manager_mut();
        manager.create_group("fx").expect("group");
        manager.create_emitter("fx", "e").expect("emitter");
        manager.set_auto_stop("fx", 0.5);
        manager.play("fx");

        let mut target = RecordingTarget::new();
        let report = context.frame(&mut target, 0.6).expect("frame");
        assert_eq!(report.auto_stopped, vec!["fx".to_string()]);
        assert_eq!(target.dispatch_count(), 0);
    }
}
