use crate::{
    lidar::RangeScan,
    remap::{remap_range, Clampable},
    stage::Direction,
};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct WallFollowConfig {
    pub side_angle: f32,
    pub spread_angle: f32,
    pub window_angle: f32,
    /// cm
    pub target_distance: f32,
    pub max_difference: f32,
    pub distance_coefficient: f32,
}

impl Default for WallFollowConfig {
    fn default() -> Self {
        Self {
            side_angle: 90.0,
            spread_angle: 45.0,
            window_angle: 5.0,
            target_distance: 35.0,
            max_difference: 10.0,
            distance_coefficient: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallSamples {
    pub lateral: f32,
    pub forward: f32,
    pub rear: f32,
}

#[derive(Debug, Clone)]
pub struct WallFollower {
    config: WallFollowConfig,
}

impl WallFollower {
    pub fn new(config: WallFollowConfig) -> Self {
        Self { config }
    }

    /// Read the three wall windows on `side`. `None` if any of them is empty.
    pub fn sample(&self, scan: &RangeScan, side: Direction) -> Option<WallSamples> {
        let sign = side.sign();
        let config = &self.config;
        let window = |angle: f32| scan.average_in_window(angle * sign, config.window_angle);
        Some(WallSamples {
            lateral: window(config.side_angle)?,
            forward: window(config.side_angle - config.spread_angle)?,
            rear: window(config.side_angle + config.spread_angle)?,
        })
    }

    pub fn steer_from_samples(&self, samples: &WallSamples, side: Direction) -> f32 {
        let config = &self.config;
        let max_difference = config.max_difference;

        // positive when the wall ahead is further away than the wall behind
        let alignment = remap_range(
            samples.forward - samples.rear,
            -max_difference,
            max_difference,
            -1.0,
            1.0,
            true,
        );
        // negative when too close, which steers away from the wall
        let distance = remap_range(
            config.target_distance - samples.lateral,
            -max_difference,
            max_difference,
            1.0,
            -1.0,
            true,
        );

        let angle = alignment + distance * config.distance_coefficient;
        side.sign() * angle.clamp_num(-1.0, 1.0)
    }

    pub fn steer(&self, scan: &RangeScan, side: Direction) -> Option<f32> {
        self.sample(scan, side)
            .map(|samples| self.steer_from_samples(&samples, side))
    }
}
