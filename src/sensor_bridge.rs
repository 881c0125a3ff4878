use std::{sync::Arc, time::Duration};

use anyhow::Result;
use bytes::Buf;
use chrono::prelude::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::*;
use zenoh::{prelude::r#async::*, subscriber::FlumeSubscriber, Session, SessionDeclarations};

use crate::{
    depth::DepthFrame,
    error::ErrorWrapper,
    marker::MarkerFrame,
    session::CycleReport,
    util::{latest_value_channel, LatestReceiver, LatestSender},
    vision::{ColorFrame, Hsv},
};

pub const DEPTH_TOPIC: &str = "scout/camera/depth";
pub const COLOR_TOPIC: &str = "scout/camera/color";
pub const MARKERS_TOPIC: &str = "scout/markers";
pub const TELEMETRY_TOPIC: &str = "scout/telemetry";

/// Colour frames and lidar scans older than this are treated as missing
pub const SENSOR_TIMEOUT: Duration = Duration::from_millis(500);

// little endian u32 rows and cols, then the pixels in row-major order
const HEADER_LEN: usize = 8;
const LISTENER_RESTART_DELAY: Duration = Duration::from_secs(1);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameDecodeError {
    #[error("payload of {actual} bytes is shorter than the {expected} bytes expected")]
    TooShort { expected: usize, actual: usize },
    #[error("frame of {rows}x{cols} pixels is too large")]
    TooLarge { rows: u32, cols: u32 },
}

/// Read the frame header and check that `bytes_per_pixel` sized pixels
/// follow.
fn read_header(
    payload: &mut &[u8],
    bytes_per_pixel: usize,
) -> Result<(usize, usize), FrameDecodeError> {
    if payload.remaining() < HEADER_LEN {
        return Err(FrameDecodeError::TooShort {
            expected: HEADER_LEN,
            actual: payload.remaining(),
        });
    }
    let rows = payload.get_u32_le();
    let cols = payload.get_u32_le();
    let pixel_bytes = (rows as usize)
        .checked_mul(cols as usize)
        .and_then(|pixels| pixels.checked_mul(bytes_per_pixel))
        .ok_or(FrameDecodeError::TooLarge { rows, cols })?;
    if payload.remaining() < pixel_bytes {
        return Err(FrameDecodeError::TooShort {
            expected: HEADER_LEN + pixel_bytes,
            actual: HEADER_LEN + payload.remaining(),
        });
    }
    Ok((rows as usize, cols as usize))
}

pub fn decode_depth_frame(mut payload: &[u8]) -> Result<DepthFrame, FrameDecodeError> {
    let (rows, cols) = read_header(&mut payload, 4)?;
    let data: Vec<f32> = (0..rows * cols).map(|_| payload.get_f32_le()).collect();
    Ok(DepthFrame::from_row_slice(rows, cols, &data))
}

pub fn decode_color_frame(mut payload: &[u8]) -> Result<ColorFrame, FrameDecodeError> {
    let (rows, cols) = read_header(&mut payload, 3)?;
    let pixels = (0..rows * cols)
        .map(|_| Hsv::new(payload.get_u8(), payload.get_u8(), payload.get_u8()))
        .collect();
    ColorFrame::from_pixels(rows, cols, pixels).ok_or(FrameDecodeError::TooLarge {
        rows: rows as u32,
        cols: cols as u32,
    })
}

pub fn decode_markers(payload: &[u8]) -> Result<MarkerFrame> {
    Ok(serde_json::from_slice(payload)?)
}

/// Newest frame of every camera stream
pub struct SensorReceivers {
    pub depth: LatestReceiver<DepthFrame>,
    pub color: LatestReceiver<ColorFrame>,
    pub markers: LatestReceiver<MarkerFrame>,
}

pub async fn start_sensor_bridge(zenoh_session: Arc<Session>) -> Result<SensorReceivers> {
    let (depth_tx, depth) = latest_value_channel();
    let (color_tx, color) = latest_value_channel();
    let (markers_tx, markers) = latest_value_channel();

    start_listener(&zenoh_session, DEPTH_TOPIC, depth_tx, |payload| {
        Ok(decode_depth_frame(payload)?)
    })
    .await?;
    start_listener(&zenoh_session, COLOR_TOPIC, color_tx, |payload| {
        Ok(decode_color_frame(payload)?)
    })
    .await?;
    start_listener(&zenoh_session, MARKERS_TOPIC, markers_tx, decode_markers).await?;

    Ok(SensorReceivers {
        depth,
        color,
        markers,
    })
}

async fn start_listener<T, F>(
    zenoh_session: &Arc<Session>,
    topic: &'static str,
    sender: LatestSender<T>,
    decode: F,
) -> Result<()>
where
    T: Send + 'static,
    F: Fn(&[u8]) -> Result<T> + Send + Sync + 'static,
{
    let mut subscriber = zenoh_session
        .declare_subscriber(topic)
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?;
    info!("Listening on {}", topic);

    tokio::spawn(async move {
        loop {
            match run_listener(&mut subscriber, &sender, &decode).await {
                Ok(()) => break,
                Err(err) => {
                    error!("Listener on {} failed with {:?}", topic, err);
                    tokio::time::sleep(LISTENER_RESTART_DELAY).await;
                }
            }
        }
    });
    Ok(())
}

async fn run_listener<T, F>(
    subscriber: &mut FlumeSubscriber<'static>,
    sender: &LatestSender<T>,
    decode: &F,
) -> Result<()>
where
    F: Fn(&[u8]) -> Result<T>,
{
    loop {
        let sample = subscriber.recv_async().await?;
        let payload = sample.value.payload.contiguous();
        let value = match decode(&payload) {
            Ok(value) => value,
            Err(err) => {
                warn!("Dropping malformed frame on {}: {}", sample.key_expr, err);
                continue;
            }
        };
        if sender.send(value).is_err() {
            return Ok(());
        }
    }
}

#[derive(Serialize, Debug)]
struct Telemetry<'a> {
    time: DateTime<Utc>,
    #[serde(flatten)]
    report: &'a CycleReport,
}

pub async fn publish_telemetry(zenoh_session: &Session, report: &CycleReport) -> Result<()> {
    let message = serde_json::to_string(&Telemetry {
        time: Utc::now(),
        report,
    })?;
    zenoh_session
        .put(TELEMETRY_TOPIC, message)
        .res_async()
        .await
        .map_err(ErrorWrapper::ZenohError)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bytes::{BufMut, BytesMut};

    fn header(rows: u32, cols: u32) -> BytesMut {
        let mut buffer = BytesMut::new();
        buffer.put_u32_le(rows);
        buffer.put_u32_le(cols);
        buffer
    }

    #[test]
    fn depth_frame_is_row_major() {
        let mut buffer = header(2, 3);
        for value in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0] {
            buffer.put_f32_le(value);
        }
        let frame = decode_depth_frame(&buffer).unwrap();
        assert_eq!(frame.rows(), 2);
        assert_eq!(frame.cols(), 3);
        assert_relative_eq!(frame.get(0, 2).unwrap(), 3.0);
        assert_relative_eq!(frame.get(1, 0).unwrap(), 4.0);
    }

    #[test]
    fn color_frame_pixels() {
        let mut buffer = header(1, 2);
        buffer.put_slice(&[10, 20, 30, 110, 200, 200]);
        let frame = decode_color_frame(&buffer).unwrap();
        assert_eq!(frame.pixel(0, 0), Hsv::new(10, 20, 30));
        assert_eq!(frame.pixel(0, 1), Hsv::new(110, 200, 200));
    }

    #[test]
    fn short_payloads_are_rejected() {
        assert_eq!(
            decode_depth_frame(&[1, 0, 0]).unwrap_err(),
            FrameDecodeError::TooShort {
                expected: 8,
                actual: 3
            }
        );

        let mut buffer = header(2, 2);
        buffer.put_f32_le(1.0);
        assert_eq!(
            decode_depth_frame(&buffer).unwrap_err(),
            FrameDecodeError::TooShort {
                expected: 24,
                actual: 12
            }
        );

        let mut buffer = header(1, 2);
        buffer.put_slice(&[1, 2, 3]);
        assert!(decode_color_frame(&buffer).is_err());
    }

    #[test]
    fn huge_header_is_rejected() {
        let buffer = header(u32::MAX, u32::MAX);
        assert!(decode_color_frame(&buffer).is_err());
    }

    #[test]
    fn empty_frame_decodes() {
        let frame = decode_depth_frame(&header(0, 0)).unwrap();
        assert_eq!(frame.rows(), 0);
    }

    #[test]
    fn markers_from_json() {
        let json = br#"{"markers": [], "time": "2024-06-01T12:00:00Z"}"#;
        let frame = decode_markers(json).unwrap();
        assert!(frame.markers.is_empty());
        assert!(decode_markers(b"not json").is_err());
    }
}
