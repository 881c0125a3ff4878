use super::{MotionCommand, VehicleDriver};
use crate::remap::Clampable;
use anyhow::Result;
use async_trait::async_trait;
use lss_driver::{LSSDriver, LedColor};
use serde::Deserialize;
use tracing::*;

/// Below this pack voltage the status LEDs turn red
const LOW_VOLTAGE: f32 = 3.0 * 3.6;

#[derive(Deserialize, Debug, Clone)]
pub struct LssDriverConfig {
    pub port: String,
    /// Servo in wheel mode that drives the car
    #[serde(default = "default_drive_id")]
    pub drive_id: u8,
    #[serde(default = "default_steering_id")]
    pub steering_id: u8,
    /// Wheel speed at full throttle in degrees per second
    #[serde(default = "default_max_rotation_speed")]
    pub max_rotation_speed: f32,
    /// Steering servo travel from centre to full lock in degrees
    #[serde(default = "default_steering_range")]
    pub steering_range: f32,
    /// Steering servo position for driving straight in degrees
    #[serde(default)]
    pub steering_center: f32,
    #[serde(default)]
    pub drive_inverted: bool,
    #[serde(default)]
    pub steering_inverted: bool,
}

fn default_drive_id() -> u8 {
    1
}

fn default_steering_id() -> u8 {
    2
}

fn default_max_rotation_speed() -> f32 {
    360.0
}

fn default_steering_range() -> f32 {
    30.0
}

/// Servo set points for one command
#[derive(Debug, Clone, Copy, PartialEq)]
struct ServoCommand {
    /// degrees per second
    wheel_speed: f32,
    /// degrees
    steering_position: f32,
}

impl LssDriverConfig {
    fn servo_command(&self, command: &MotionCommand, max_speed: f32) -> ServoCommand {
        let drive_mul = if self.drive_inverted { -1.0 } else { 1.0 };
        let steering_mul = if self.steering_inverted { -1.0 } else { 1.0 };
        ServoCommand {
            wheel_speed: (command.speed * max_speed).clamp_num(-1.0, 1.0)
                * self.max_rotation_speed
                * drive_mul,
            steering_position: self.steering_center
                + command.angle.clamp_num(-1.0, 1.0) * self.steering_range * steering_mul,
        }
    }
}

pub struct LssVehicleDriver {
    driver: LSSDriver,
    config: LssDriverConfig,
    max_speed: f32,
}

impl LssVehicleDriver {
    pub async fn new(config: LssDriverConfig) -> Result<Self> {
        let mut driver = LSSDriver::new(&config.port)?;
        driver
            .set_maximum_speed(config.drive_id, config.max_rotation_speed.abs())
            .await?;
        driver
            .move_to_position(config.steering_id, config.steering_center)
            .await?;
        Ok(Self {
            driver,
            config,
            max_speed: 1.0,
        })
    }

    pub async fn set_color(&mut self, color: LedColor) -> Result<()> {
        for id in [self.config.drive_id, self.config.steering_id] {
            self.driver.set_color(id, color).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl VehicleDriver for LssVehicleDriver {
    async fn send(&mut self, command: MotionCommand) -> Result<()> {
        let servo_command = self.config.servo_command(&command, self.max_speed);
        self.driver
            .set_rotation_speed(self.config.drive_id, servo_command.wheel_speed)
            .await?;
        self.driver
            .move_to_position(self.config.steering_id, servo_command.steering_position)
            .await?;
        Ok(())
    }

    fn set_max_speed(&mut self, scale: f32) {
        self.max_speed = scale.clamp_num(0.0, 1.0);
    }

    async fn read_voltage(&mut self) -> Result<Option<f32>> {
        let voltage = self.driver.query_voltage(self.config.drive_id).await?;
        let color = if voltage < LOW_VOLTAGE {
            warn!("Battery low {:.2}V", voltage);
            LedColor::Red
        } else {
            LedColor::Magenta
        };
        self.set_color(color).await?;
        Ok(Some(voltage))
    }
}
