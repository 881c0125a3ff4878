use crate::util::LatestSender;
use anyhow::Result;
use rplidar_driver::{utils::sort_scan, RplidarDevice, RplidarDriver, RposError, ScanOptions};
use serde::Deserialize;
use std::time::Duration;
use tracing::*;

/// One lidar return. Angle in degrees, clockwise from straight ahead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanSample {
    pub angle: f32,
    /// cm, `0.0` means no return
    pub distance: f32,
}

impl ScanSample {
    pub fn new(angle: f32, distance: f32) -> Self {
        Self { angle, distance }
    }

    pub fn is_valid(&self) -> bool {
        self.distance.is_finite() && self.distance > 0.0
    }
}

/// Full revolution of the range sensor, ordered by angle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeScan {
    samples: Vec<ScanSample>,
}

impl RangeScan {
    pub fn new(mut samples: Vec<ScanSample>) -> Self {
        for sample in samples.iter_mut() {
            sample.angle = normalize_angle(sample.angle);
        }
        samples.sort_by(|a, b| a.angle.total_cmp(&b.angle));
        Self { samples }
    }

    pub fn samples(&self) -> &[ScanSample] {
        &self.samples
    }

    /// `None` if no valid return falls within `width` degrees of `center`.
    pub fn average_in_window(&self, center: f32, width: f32) -> Option<f32> {
        let half_width = width.abs() / 2.0;
        let (sum, count) = self
            .samples
            .iter()
            .filter(|sample| sample.is_valid())
            .filter(|sample| angle_between(sample.angle, center).abs() <= half_width)
            .fold((0.0, 0_usize), |(sum, count), sample| {
                (sum + sample.distance, count + 1)
            });
        if count == 0 {
            None
        } else {
            Some(sum / count as f32)
        }
    }
}

fn normalize_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest difference `a - b` in degrees
fn angle_between(a: f32, b: f32) -> f32 {
    (a - b + 180.0).rem_euclid(360.0) - 180.0
}

#[derive(Deserialize, Debug, Clone)]
pub struct LidarConfig {
    pub port: String,
    /// Degrees added to every sample so that 0 points forward
    #[serde(default)]
    pub angle_offset: f32,
    #[serde(default = "default_scan_mode")]
    pub scan_mode: u16,
}

fn default_scan_mode() -> u16 {
    2
}

const SCAN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Convert a raw scan (radians, metres) into a [`RangeScan`]
pub fn convert_scan(scan: &[rplidar_driver::ScanPoint], angle_offset: f32) -> RangeScan {
    RangeScan::new(
        scan.iter()
            .map(|point| {
                let distance = if point.is_valid() {
                    point.distance() * 100.0
                } else {
                    0.0
                };
                ScanSample::new(point.angle().to_degrees() + angle_offset, distance)
            })
            .collect(),
    )
}

/// Returns once the device is open and scanning.
pub fn start_lidar_thread(config: LidarConfig, sender: LatestSender<RangeScan>) -> Result<()> {
    let (started_tx, started_rx) = std::sync::mpsc::channel::<Result<()>>();

    std::thread::spawn(move || {
        let mut lidar = match open_lidar(&config) {
            Ok(lidar) => {
                let _ = started_tx.send(Ok(()));
                lidar
            }
            Err(err) => {
                let _ = started_tx.send(Err(err));
                return;
            }
        };
        loop {
            match lidar.grab_scan() {
                Ok(mut scan) => {
                    if let Err(err) = sort_scan(&mut scan) {
                        warn!("Failed to sort lidar scan {:?}", err);
                        continue;
                    }
                    let range_scan = convert_scan(&scan, config.angle_offset);
                    if sender.send(range_scan).is_err() {
                        info!("Scan receiver dropped, stopping lidar");
                        break;
                    }
                }
                Err(RposError::OperationTimeout) => continue,
                Err(err) => {
                    error!("Lidar error {:?}", err);
                    std::thread::sleep(SCAN_RETRY_DELAY);
                }
            }
        }
        if let Err(err) = lidar.stop_motor() {
            error!("Failed to stop lidar motor {:?}", err);
        }
    });

    started_rx.recv()??;
    info!("Lidar started");
    Ok(())
}

fn open_lidar(config: &LidarConfig) -> Result<Box<dyn RplidarDriver>> {
    let mut lidar = RplidarDevice::open_port(&config.port)?;
    let scan_options = ScanOptions::with_mode(config.scan_mode);
    let _ = lidar.start_scan_with_options(&scan_options)?;
    Ok(lidar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ring(distance: impl Fn(f32) -> f32) -> RangeScan {
        RangeScan::new(
            (0..720)
                .map(|step| {
                    let angle = step as f32 * 0.5;
                    ScanSample::new(angle, distance(angle))
                })
                .collect(),
        )
    }

    #[test]
    fn angles_are_normalized_and_sorted() {
        let scan = RangeScan::new(vec![
            ScanSample::new(370.0, 1.0),
            ScanSample::new(-90.0, 1.0),
            ScanSample::new(5.0, 1.0),
        ]);
        let angles: Vec<f32> = scan.samples().iter().map(|sample| sample.angle).collect();
        assert_eq!(angles, vec![5.0, 10.0, 270.0]);
    }

    #[test]
    fn window_averages_valid_samples() {
        let scan = ring(|angle| if angle < 90.0 { 40.0 } else { 60.0 });
        // 87.5..=92.5, 5 samples each side of 90 plus 90 itself
        let average = scan.average_in_window(90.0, 5.0).unwrap();
        assert_relative_eq!(average, (5.0 * 40.0 + 6.0 * 60.0) / 11.0);
    }

    #[test]
    fn window_wraps_around_zero() {
        let scan = ring(|angle| if angle > 180.0 { 30.0 } else { 50.0 });
        let average = scan.average_in_window(0.0, 4.0).unwrap();
        // 358, 358.5, 359, 359.5 on one side, 0..=2 on the other
        assert_relative_eq!(average, (4.0 * 30.0 + 5.0 * 50.0) / 9.0);
    }

    #[test]
    fn negative_center_is_left_side() {
        let scan = ring(|angle| if (260.0..280.0).contains(&angle) { 25.0 } else { 90.0 });
        assert_relative_eq!(scan.average_in_window(-90.0, 5.0).unwrap(), 25.0);
    }

    #[test]
    fn empty_window_is_none() {
        let scan = ring(|angle| if (80.0..100.0).contains(&angle) { 0.0 } else { 90.0 });
        assert!(scan.average_in_window(90.0, 5.0).is_none());
        assert!(RangeScan::default().average_in_window(0.0, 10.0).is_none());
    }
}
