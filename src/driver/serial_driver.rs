use super::{DriverError, MotionCommand, VehicleDriver};
use crate::remap::Clampable;
use anyhow::Error;
use anyhow::Result;
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use futures::SinkExt;
use serde::Deserialize;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::{Decoder, Encoder};

const WIRE_MAX: f32 = 255.0;

#[derive(Deserialize, Debug, Clone)]
pub struct SerialDriverConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub drive_inverted: bool,
    #[serde(default)]
    pub steering_inverted: bool,
}

fn default_baud_rate() -> u32 {
    115200
}

/// Drive and steering channels in `[-255, 255]`
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct WireDriveCommand {
    pub drive: f32,
    pub steering: f32,
}

impl WireDriveCommand {
    fn from_motion(command: &MotionCommand, max_speed: f32, config: &SerialDriverConfig) -> Self {
        fn channel(value: f32, inverted: bool) -> f32 {
            let inversion_mul = if inverted { -1.0 } else { 1.0 };
            (value * WIRE_MAX).clamp_num(-WIRE_MAX, WIRE_MAX) * inversion_mul
        }
        Self {
            drive: channel(command.speed * max_speed, config.drive_inverted),
            steering: channel(command.angle, config.steering_inverted),
        }
    }

    /// Direction flag and magnitude per channel, COBS framed
    fn encode(&self) -> Vec<u8> {
        let buffer = vec![
            (self.drive > 0.0) as u8,
            self.drive.abs() as u8,
            (self.steering > 0.0) as u8,
            self.steering.abs() as u8,
        ];

        let mut encoded = postcard_cobs::encode_vec(&buffer);
        encoded.push(0);
        encoded
    }
}

pub struct ScoutProtocol;

impl Decoder for ScoutProtocol {
    type Item = ();
    type Error = Error;

    fn decode(&mut self, _: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(None)
    }
}

impl Encoder<WireDriveCommand> for ScoutProtocol {
    type Error = Error;

    fn encode(&mut self, data: WireDriveCommand, buf: &mut BytesMut) -> Result<(), Error> {
        let encoded_data = data.encode();
        buf.reserve(encoded_data.len());
        buf.put_slice(&encoded_data);
        Ok(())
    }
}

pub struct SerialDriver {
    framed_port: tokio_util::codec::Framed<tokio_serial::SerialStream, ScoutProtocol>,
    config: SerialDriverConfig,
    max_speed: f32,
}

impl SerialDriver {
    pub fn new(config: SerialDriverConfig) -> Result<Self> {
        let serial_port = tokio_serial::new(&config.port, config.baud_rate)
            .open_native_async()
            .map_err(|_| DriverError::FailedOpeningSerialPort)?;
        Ok(Self {
            framed_port: ScoutProtocol.framed(serial_port),
            config,
            max_speed: 1.0,
        })
    }
}

#[async_trait]
impl VehicleDriver for SerialDriver {
    async fn send(&mut self, command: MotionCommand) -> Result<()> {
        let wire_command = WireDriveCommand::from_motion(&command, self.max_speed, &self.config);
        self.framed_port
            .send(wire_command)
            .await
            .map_err(|_| DriverError::CommError)?;
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

    fn config() -> SerialDriverConfig {
        SerialDriverConfig {
            port: String::from("/dev/null"),
            baud_rate: default_baud_rate(),
            drive_inverted: false,
            steering_inverted: false,
        }
    }

    #[test]
    fn encoding_adds_trailing_zero() {
        let encoded = WireDriveCommand::default().encode();
        assert_eq!(*encoded.last().unwrap(), 0_u8);
        // no zero inside the frame
        assert!(!encoded[..encoded.len() - 1].contains(&0));
    }

    #[test]
    fn drive_forward() {
        let command = WireDriveCommand {
            drive: 255.0,
            ..Default::default()
        };
        let encoded = command.encode();
        assert_eq!(&encoded[..3], &[3_u8, 1, 255]);
    }

    #[test]
    fn drive_backward() {
        let command = WireDriveCommand {
            drive: -255.0,
            ..Default::default()
        };
        let encoded = command.encode();
        assert_eq!(&encoded[..3], &[1_u8, 2, 255]);
    }

    #[test]
    fn motion_is_scaled_and_inverted() {
        let mut config = config();
        config.steering_inverted = true;
        let wire = WireDriveCommand::from_motion(&MotionCommand::new(1.0, 0.5), 0.35, &config);
        assert_relative_eq!(wire.drive, 255.0 * 0.35);
        assert_relative_eq!(wire.steering, -127.5);
    }

    #[test]
    fn codec_writes_frame() {
        let mut buffer = BytesMut::new();
        let command = WireDriveCommand {
            drive: 100.0,
            steering: -50.0,
        };
        ScoutProtocol.encode(command, &mut buffer).unwrap();
        assert_eq!(buffer.to_vec(), command.encode());
    }
}
