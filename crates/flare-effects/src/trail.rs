//! Distance-gated trail emission.
//!
//! A [`TrailEmitter`] turns the continuous motion of an emitter into discrete
//! emission points. When the emitter moved further than `min_distance` since
//! the last emission, the path is split into evenly spaced sub-steps so a fast
//! source does not leave gaps.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Default cap on sub-steps produced by one trail advance.
pub const DEFAULT_MAX_TRAIL_STEPS: u32 = 256;

/// Trail settings of one emitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrailConfig {
    /// Emit along the path of motion
    pub enabled: bool,
    /// Spacing between emission points (<= 0 emits once per moving frame)
    pub min_distance: f32,
    /// Lifetime for this frame's particles when > 0
    pub lifetime_override: f32,
    /// Particles per emission point
    pub emission_count: u32,
    /// Multiply trail particle scale by the shape scale
    pub inherit_scale: bool,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_distance: 0.1,
            lifetime_override: 0.0,
            emission_count: 1,
            inherit_scale: false,
        }
    }
}

impl TrailConfig {
    /// Returns the lifetime override, if one is set.
    #[must_use]
    pub fn lifetime_override(&self) -> Option<f32> {
        (self.lifetime_override > 0.0).then_some(self.lifetime_override)
    }
}

/// Trail baseline state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrailEmitter {
    last_position: Vec3,
    has_last_position: bool,
}

impl TrailEmitter {
    /// Creates a trail with no baseline.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_position: Vec3::ZERO,
            has_last_position: false,
        }
    }

    /// Advances the trail to `current` and returns the points to emit at.
    ///
    /// The first sample only records the baseline. At most `max_steps` points
    /// are returned; a longer jump is spread evenly over that many steps and
    /// the last point is always `current`.
    pub fn advance(&mut self, current: Vec3, config: &TrailConfig, max_steps: u32) -> Vec<Vec3> {
        if !config.enabled {
            return Vec::new();
        }
        if !self.has_last_position {
            self.record(current);
            return Vec::new();
        }

        let delta = current - self.last_position;
        let distance = delta.length();
        if distance == 0.0 {
            return Vec::new();
        }

        if config.min_distance <= 0.0 {
            self.record(current);
            return vec![current];
        }
        if distance < config.min_distance {
            return Vec::new();
        }

        let max_steps = max_steps.max(1);
        let ratio = f64::from(distance) / f64::from(config.min_distance);
        let steps = if ratio >= f64::from(max_steps) {
            max_steps
        } else {
            (ratio.floor() as u32).max(1)
        };
        let step = delta / steps as f32;
        let start = self.last_position;
        let points = (1..=steps)
            .map(|k| {
                if k == steps {
                    current
                } else {
                    start + step * k as f32
                }
            })
            .collect();

        self.record(current);
        points
    }

    /// Sets the baseline to `position`.
    pub fn record(&mut self, position: Vec3) {
        self.last_position = position;
        self.has_last_position = true;
    }

    /// Forgets the baseline.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Returns the baseline, if one is recorded.
    #[must_use]
    pub const fn last_position(&self) -> Option<Vec3> {
        if self.has_last_position {
            Some(self.last_position)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CAP: u32 = DEFAULT_MAX_TRAIL_STEPS;

    fn enabled(min_distance: f32) -> TrailConfig {
        TrailConfig {
            enabled: true,
            min_distance,
            ..TrailConfig::default()
        }
    }

    #[test]
    fn test_disabled_trail_emits_nothing() {
        let mut trail = TrailEmitter::new();
        let config = TrailConfig::default();
        assert!(trail.advance(Vec3::ZERO, &config, CAP).is_empty());
        assert!(trail.advance(Vec3::X * 10.0, &config, CAP).is_empty());
        assert_eq!(trail.last_position(), None);
    }

    #[test]
    fn test_first_sample_records_baseline() {
        let mut trail = TrailEmitter::new();
        assert!(trail.advance(Vec3::X, &enabled(1.0), CAP).is_empty());
        assert_eq!(trail.last_position(), Some(Vec3::X));
    }

    #[test]
    fn test_three_steps_evenly_spaced() {
        let mut trail = TrailEmitter::new();
        let config = enabled(2.0);
        trail.advance(Vec3::ZERO, &config, CAP);

        let points = trail.advance(Vec3::new(6.0, 0.0, 0.0), &config, CAP);
        assert_eq!(
            points,
            vec![
                Vec3::new(2.0, 0.0, 0.0),
                Vec3::new(4.0, 0.0, 0.0),
                Vec3::new(6.0, 0.0, 0.0),
            ]
        );
        assert_eq!(trail.last_position(), Some(Vec3::new(6.0, 0.0, 0.0)));
    }

    #[test]
    fn test_below_threshold_keeps_baseline() {
        let mut trail = TrailEmitter::new();
        let config = enabled(2.0);
        trail.advance(Vec3::ZERO, &config, CAP);

        assert!(trail.advance(Vec3::new(1.0, 0.0, 0.0), &config, CAP).is_empty());
        assert_eq!(trail.last_position(), Some(Vec3::ZERO));
    }

    #[test]
    fn test_zero_min_distance_emits_once() {
        let mut trail = TrailEmitter::new();
        let config = enabled(0.0);
        trail.advance(Vec3::ZERO, &config, CAP);

        let points = trail.advance(Vec3::new(0.0, 100.0, 0.0), &config, CAP);
        assert_eq!(points, vec![Vec3::new(0.0, 100.0, 0.0)]);
        assert!(trail.advance(Vec3::new(0.0, 100.0, 0.0), &config, CAP).is_empty());
    }

    #[test]
    fn test_long_jump_is_capped() {
        let mut trail = TrailEmitter::new();
        let config = enabled(1e-9);
        trail.advance(Vec3::ZERO, &config, 8);

        let current = Vec3::new(1000.0, 0.0, 0.0);
        let points = trail.advance(current, &config, 8);
        assert_eq!(points.len(), 8);
        assert_eq!(points[0], Vec3::new(125.0, 0.0, 0.0));
        assert_eq!(points.last(), Some(&current));
        assert_eq!(trail.last_position(), Some(current));
    }

    #[test]
    fn test_zero_cap_still_emits_once() {
        let mut trail = TrailEmitter::new();
        let config = enabled(0.5);
        trail.advance(Vec3::ZERO, &config, 0);
        assert_eq!(trail.advance(Vec3::Y * 4.0, &config, 0), vec![Vec3::Y * 4.0]);
    }

    #[test]
    fn test_reset_forgets_baseline() {
        let mut trail = TrailEmitter::new();
        trail.record(Vec3::ONE);
        trail.reset();
        assert_eq!(trail.last_position(), None);
    }

    #[test]
    fn test_lifetime_override() {
        assert_eq!(TrailConfig::default().lifetime_override(), None);
        let config = TrailConfig {
            lifetime_override: 0.25,
            ..TrailConfig::default()
        };
        assert_eq!(config.lifetime_override(), Some(0.25));
    }

    proptest! {
        #[test]
        fn prop_substep_count(d in 0.05f32..10.0, multiple in 1u32..20, dir in prop::array::uniform3(-1.0f32..1.0)) {
            let direction = Vec3::from(dir);
            prop_assume!(direction.length() > 0.1);
            let direction = direction.normalize();

            let mut trail = TrailEmitter::new();
            let config = enabled(d);
            trail.advance(Vec3::ZERO, &config, CAP);

            // Slightly past the multiple so float rounding cannot drop a step
            let target = direction * d * (multiple as f32 + 0.5);
            let points = trail.advance(target, &config, CAP);
            prop_assert_eq!(points.len(), multiple as usize);

            let spacing = target.length() / multiple as f32;
            for (k, point) in points.iter().enumerate() {
                let expected = direction * spacing * (k + 1) as f32;
                prop_assert!((*point - expected).length() < 1e-3 * target.length().max(1.0));
            }
        }

        #[test]
        fn prop_steps_never_exceed_cap(
            exponent in -12i32..-1,
            jump in 1.0f32..10_000.0,
            cap in 1u32..512,
        ) {
            let mut trail = TrailEmitter::new();
            let config = enabled(10f32.powi(exponent));
            trail.advance(Vec3::ZERO, &config, cap);

            let current = Vec3::new(jump, 0.0, 0.0);
            let points = trail.advance(current, &config, cap);
            prop_assert!(!points.is_empty());
            prop_assert!(points.len() <= cap as usize);
            prop_assert_eq!(points.last().copied(), Some(current));
        }

        #[test]
        fn prop_half_distance_emits_nothing(d in 0.05f32..10.0) {
            let mut trail = TrailEmitter::new();
            let config = enabled(d);
            trail.advance(Vec3::ZERO, &config, CAP);
            prop_assert!(trail.advance(Vec3::X * (d * 0.5), &config, CAP).is_empty());
        }
    }
}
