/// Positive speed means the distance is shrinking.
pub fn estimate(
    previous_distance: f32,
    current_distance: f32,
    elapsed: f32,
    previous_speed: f32,
    smoothing: f32,
) -> f32 {
    let frame_speed = (previous_distance - current_distance) / elapsed;
    previous_speed + smoothing * (frame_speed - previous_speed)
}

#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    smoothing: f32,
    speed: f32,
    previous_distance: Option<f32>,
}

impl SpeedEstimator {
    pub fn new(smoothing: f32) -> Self {
        Self {
            smoothing: smoothing.clamp(f32::EPSILON, 1.0),
            speed: 0.0,
            previous_distance: None,
        }
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn previous_distance(&self) -> Option<f32> {
        self.previous_distance
    }

    /// The first sample only seeds the filter, cycles without one keep the estimate.
    pub fn update(&mut self, distance: Option<f32>, elapsed: f32) -> f32 {
        if let Some(current) = distance {
            if let Some(previous) = self.previous_distance {
                self.speed = estimate(previous, current, elapsed, self.speed, self.smoothing);
            }
            self.previous_distance = Some(current);
        }
        self.speed
    }

    pub fn reset(&mut self) {
        self.speed = 0.0;
        self.previous_distance = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn standing_still_decays_estimate() {
        let speed = 50.0;
        let alpha = 0.2;
        assert_relative_eq!(estimate(80.0, 80.0, 0.1, speed, alpha), speed * (1.0 - alpha));
    }

    #[test]
    fn closing_distance_is_positive_speed() {
        let speed = estimate(100.0, 90.0, 0.1, 0.0, 1.0);
        assert_relative_eq!(speed, 100.0);
    }

    #[test]
    fn backing_away_is_negative_speed() {
        let speed = estimate(90.0, 100.0, 0.1, 0.0, 1.0);
        assert_relative_eq!(speed, -100.0);
    }

    #[test]
    fn continuous_in_current_distance() {
        let a = estimate(100.0, 90.0, 0.1, 10.0, 0.2);
        let b = estimate(100.0, 90.001, 0.1, 10.0, 0.2);
        assert!((a - b).abs() < 0.01);
    }

    #[test]
    fn first_sample_only_seeds() {
        let mut estimator = SpeedEstimator::new(0.2);
        assert_relative_eq!(estimator.update(Some(100.0), 0.1), 0.0);
        assert_eq!(estimator.previous_distance(), Some(100.0));
        assert_relative_eq!(estimator.update(Some(90.0), 0.1), 20.0);
    }

    #[test]
    fn missing_sample_holds_estimate() {
        let mut estimator = SpeedEstimator::new(0.2);
        estimator.update(Some(100.0), 0.1);
        estimator.update(Some(90.0), 0.1);
        let held = estimator.update(None, 0.1);
        assert_relative_eq!(held, 20.0);
        assert_eq!(estimator.previous_distance(), Some(90.0));
    }

    #[test]
    fn converges_on_constant_closing_rate() {
        let mut estimator = SpeedEstimator::new(0.2);
        let mut distance = 500.0;
        estimator.update(Some(distance), 0.1);
        for _ in 0..60 {
            distance -= 5.0;
            estimator.update(Some(distance), 0.1);
        }
        assert_relative_eq!(estimator.speed(), 50.0, max_relative = 0.001);
    }

    #[test]
    fn reset_clears_state() {
        let mut estimator = SpeedEstimator::new(0.2);
        estimator.update(Some(100.0), 0.1);
        estimator.update(Some(80.0), 0.1);
        estimator.reset();
        assert_relative_eq!(estimator.speed(), 0.0);
        assert!(estimator.previous_distance().is_none());
    }
}
