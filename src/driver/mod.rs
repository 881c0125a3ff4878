pub mod lss_driver;
pub mod serial_driver;

use crate::remap::Clampable;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::*;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum DriverError {
    #[error("communication with motor driver failed")]
    CommError,
    #[error("failed opening serial port")]
    FailedOpeningSerialPort,
}

/// Actuator command. Both channels are in `[-1, 1]`, positive speed drives
/// forward and positive angle steers right.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MotionCommand {
    pub speed: f32,
    pub angle: f32,
}

impl MotionCommand {
    pub fn new(speed: f32, angle: f32) -> Self {
        fn sanitize(value: f32) -> f32 {
            if value.is_finite() {
                value.clamp_num(-1.0, 1.0)
            } else {
                0.0
            }
        }
        Self {
            speed: sanitize(speed),
            angle: sanitize(angle),
        }
    }

    pub fn stop() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait VehicleDriver: Send + Sync {
    async fn send(&mut self, command: MotionCommand) -> Result<()>;

    async fn stop(&mut self) -> Result<()> {
        self.send(MotionCommand::stop()).await
    }

    /// Scale applied to the speed channel of every following command
    fn set_max_speed(&mut self, scale: f32);

    async fn read_voltage(&mut self) -> Result<Option<f32>> {
        Ok(None)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverConfig {
    /// Motor controller board speaking the framed serial protocol
    Serial(serial_driver::SerialDriverConfig),
    /// Lynxmotion smart servos for drive and steering
    Lss(lss_driver::LssDriverConfig),
    /// Dry run, commands are only logged
    #[default]
    Log,
}

pub async fn vehicle_driver_from_config(config: DriverConfig) -> Result<Box<dyn VehicleDriver>> {
    Ok(match config {
        DriverConfig::Serial(config) => {
            info!("Opening serial motor driver on {}", config.port);
            Box::new(serial_driver::SerialDriver::new(config)?)
        }
        DriverConfig::Lss(config) => {
            info!("Opening LSS driver on {}", config.port);
            Box::new(lss_driver::LssVehicleDriver::new(config).await?)
        }
        DriverConfig::Log => {
            warn!("No vehicle configured, only logging commands");
            Box::<LogDriver>::default()
        }
    })
}

#[derive(Debug)]
pub struct LogDriver {
    max_speed: f32,
    last_command: Option<MotionCommand>,
}

impl Default for LogDriver {
    fn default() -> Self {
        Self {
            max_speed: 1.0,
            last_command: None,
        }
    }
}

impl LogDriver {
    pub fn last_command(&self) -> Option<MotionCommand> {
        self.last_command
    }
}

#[async_trait]
impl VehicleDriver for LogDriver {
    async fn send(&mut self, command: MotionCommand) -> Result<()> {
        let scaled = MotionCommand::new(command.speed * self.max_speed, command.angle);
        if self.last_command != Some(scaled) {
            debug!(speed = scaled.speed, angle = scaled.angle, "Motion command");
        }
        self.last_command = Some(scaled);
        Ok(())
    }

    fn set_max_speed(&mut self, scale: f32) {
        self.max_speed = scale.clamp_num(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn command_is_clamped() {
        let command = MotionCommand::new(3.0, -1.5);
        assert_relative_eq!(command.speed, 1.0);
        assert_relative_eq!(command.angle, -1.0);
    }

    #[test]
    fn non_finite_command_stops() {
        let command = MotionCommand::new(f32::NAN, f32::INFINITY);
        assert_eq!(command, MotionCommand::stop());
    }

    #[tokio::test]
    async fn log_driver_scales_speed() {
        let mut driver = LogDriver::default();
        driver.set_max_speed(0.35);
        driver.send(MotionCommand::new(1.0, 0.5)).await.unwrap();
        let command = driver.last_command().unwrap();
        assert_relative_eq!(command.speed, 0.35);
        assert_relative_eq!(command.angle, 0.5);

        driver.stop().await.unwrap();
        assert_eq!(driver.last_command(), Some(MotionCommand::stop()));
    }

    #[test]
    fn driver_config_from_yaml() {
        let yaml = "type: lss\nport: /dev/ttyUSB0\n";
        let config: DriverConfig = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        match config {
            DriverConfig::Lss(lss) => assert_eq!(lss.port, "/dev/ttyUSB0"),
            other => panic!("unexpected driver {:?}", other),
        }
    }
}
