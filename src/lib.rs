#![doc = include_str!("../README.md")]
pub mod configuration;
pub mod depth;
pub mod driver;
pub mod error;
pub mod gamepad;
pub mod lidar;
pub mod line_follow;
pub mod logging;
pub mod marker;
pub mod remap;
pub mod roi;
pub mod safety;
pub mod sensor_bridge;
pub mod session;
pub mod speed_estimator;
pub mod stage;
pub mod util;
pub mod vision;
pub mod wall_follow;
