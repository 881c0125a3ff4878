use crate::remap::{remap_range, Clampable};
use serde::{Deserialize, Serialize};
use tracing::*;

/// Speed limit inside the slow zone when the obstacle sits right at the slow
/// distance.
const SLOW_ZONE_MAX_SPEED: f32 = 0.5;
const BRAKE_REMAP_MIN: f32 = -4.0;
const BRAKE_MIN: f32 = -1.0;
const BRAKE_MAX: f32 = -0.2;

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct SafetyConfig {
    pub min_stop_distance: f32,
    pub max_stop_distance: f32,
    /// cm of extra stop distance per (cm/s)^2
    pub stop_distance_scale: f32,
    pub slow_distance_ratio: f32,
    pub smoothing: f32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            min_stop_distance: 20.0,
            max_stop_distance: 80.0,
            stop_distance_scale: 40.0 / 10000.0,
            slow_distance_ratio: 1.5,
            smoothing: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SafetyEnvelope {
    pub stop_distance: f32,
    pub slow_distance: f32,
}

impl SafetyEnvelope {
    /// Stop distance grows with speed squared within the configured bounds
    pub fn from_speed(
        speed: f32,
        min_stop: f32,
        max_stop: f32,
        distance_scale: f32,
        slow_ratio: f32,
    ) -> Self {
        let stop_distance =
            (min_stop + speed * speed.abs() * distance_scale).clamp_num(min_stop, max_stop);
        Self {
            stop_distance,
            slow_distance: stop_distance * slow_ratio,
        }
    }

    pub fn with_config(speed: f32, config: &SafetyConfig) -> Self {
        Self::from_speed(
            speed,
            config.min_stop_distance,
            config.max_stop_distance,
            config.stop_distance_scale,
            config.slow_distance_ratio,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SafetyAdvisory {
    Slow { limit: f32 },
    Stop { speed: f32 },
}

/// `measured_distance` of `None` or `0.0` means nothing was seen.
pub fn override_speed(
    requested_speed: f32,
    measured_distance: Option<f32>,
    envelope: &SafetyEnvelope,
    bypass: bool,
) -> (f32, Option<SafetyAdvisory>) {
    if bypass || requested_speed <= 0.0 {
        return (requested_speed, None);
    }
    let distance = match measured_distance {
        Some(distance) if distance > 0.0 => distance,
        _ => return (requested_speed, None),
    };
    let SafetyEnvelope {
        stop_distance,
        slow_distance,
    } = *envelope;

    if stop_distance < distance && distance < slow_distance {
        let limit = remap_range(
            distance,
            stop_distance,
            slow_distance,
            0.0,
            SLOW_ZONE_MAX_SPEED,
            false,
        );
        let speed = requested_speed.min(limit);
        debug!("Safety slow: speed limited to {}", speed);
        (speed, Some(SafetyAdvisory::Slow { limit }))
    } else if distance < stop_distance {
        let speed = remap_range(distance, 0.0, stop_distance, BRAKE_REMAP_MIN, BRAKE_MAX, true)
            .clamp_num(BRAKE_MIN, BRAKE_MAX);
        debug!("Safety stop: reversing at {}", speed);
        (speed, Some(SafetyAdvisory::Stop { speed }))
    } else {
        (requested_speed, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn envelope(speed: f32) -> SafetyEnvelope {
        SafetyEnvelope::with_config(speed, &SafetyConfig::default())
    }

    #[test]
    fn standing_still_uses_min_stop() {
        let envelope = envelope(0.0);
        assert_relative_eq!(envelope.stop_distance, 20.0);
        assert_relative_eq!(envelope.slow_distance, 30.0);
    }

    #[test]
    fn stop_distance_monotonic_and_bounded() {
        let mut last = 0.0;
        for step in 0..300 {
            let speed = step as f32;
            let envelope = envelope(speed);
            assert!(envelope.stop_distance >= last);
            assert!(envelope.stop_distance >= 20.0);
            assert!(envelope.stop_distance <= 80.0);
            assert!(envelope.slow_distance > envelope.stop_distance);
            last = envelope.stop_distance;
        }
        assert_relative_eq!(last, 80.0);
    }

    #[test]
    fn reverse_speed_does_not_grow_envelope() {
        assert_relative_eq!(envelope(-100.0).stop_distance, 20.0);
    }

    #[test]
    fn quadratic_growth() {
        // 20 + 50 * 50 * 0.004 = 30
        assert_relative_eq!(envelope(50.0).stop_distance, 30.0, max_relative = 1e-5);
    }

    #[test]
    fn clear_road_passes_through() {
        let envelope = envelope(0.0);
        for requested in [0.1, 0.5, 1.0] {
            for distance in [30.0, 31.0, 500.0] {
                let (speed, advisory) =
                    override_speed(requested, Some(distance), &envelope, false);
                assert_relative_eq!(speed, requested);
                assert!(advisory.is_none());
            }
        }
    }

    #[test]
    fn bypass_passes_through() {
        let envelope = envelope(0.0);
        for distance in [1.0, 10.0, 25.0, 100.0] {
            let (speed, advisory) = override_speed(0.8, Some(distance), &envelope, true);
            assert_relative_eq!(speed, 0.8);
            assert!(advisory.is_none());
        }
    }

    #[test]
    fn reversing_request_passes_through() {
        let envelope = envelope(0.0);
        let (speed, advisory) = override_speed(-0.5, Some(5.0), &envelope, false);
        assert_relative_eq!(speed, -0.5);
        assert!(advisory.is_none());
    }

    #[test]
    fn zero_distance_is_no_obstacle() {
        let envelope = envelope(0.0);
        let (speed, advisory) = override_speed(1.0, Some(0.0), &envelope, false);
        assert_relative_eq!(speed, 1.0);
        assert!(advisory.is_none());
        let (speed, _) = override_speed(1.0, None, &envelope, false);
        assert_relative_eq!(speed, 1.0);
    }

    #[test]
    fn slow_zone_limits_speed() {
        let envelope = envelope(0.0);
        // halfway between 20 and 30 -> 0.25
        let (speed, advisory) = override_speed(1.0, Some(25.0), &envelope, false);
        assert_relative_eq!(speed, 0.25);
        assert_eq!(advisory, Some(SafetyAdvisory::Slow { limit: 0.25 }));

        // a slower request is kept
        let (speed, _) = override_speed(0.1, Some(25.0), &envelope, false);
        assert_relative_eq!(speed, 0.1);
    }

    #[test]
    fn stop_zone_reverses() {
        let envelope = envelope(0.0);
        for distance in [0.5, 5.0, 10.0, 19.9] {
            let (speed, advisory) = override_speed(1.0, Some(distance), &envelope, false);
            assert!((-1.0..=-0.2).contains(&speed), "speed {}", speed);
            assert!(matches!(advisory, Some(SafetyAdvisory::Stop { .. })));
        }
        // deeper penetration brakes harder
        let (near, _) = override_speed(1.0, Some(2.0), &envelope, false);
        let (far, _) = override_speed(1.0, Some(18.0), &envelope, false);
        assert!(near <= far);
    }

    #[test]
    fn stop_zone_floor() {
        let envelope = envelope(0.0);
        // remap gives -4 + 0.1 * 3.8 = -3.62, clamped to -1
        let (speed, _) = override_speed(1.0, Some(2.0), &envelope, false);
        assert_relative_eq!(speed, -1.0);
    }
}
