use crate::{
    marker::Marker,
    remap::remap_range,
    roi::RoiFraction,
    stage::ColorChoice,
    vision::{largest_contour, ColorFrame, Contour, ContourFinder, LineColor},
};
use serde::{Deserialize, Serialize};
use tracing::*;

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct LineFollowConfig {
    pub min_contour_area: f32,
    pub roi: RoiFraction,
}

impl Default for LineFollowConfig {
    fn default() -> Self {
        Self {
            min_contour_area: 30.0,
            roi: RoiFraction {
                top: 0.75,
                ..RoiFraction::FULL
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineFollower {
    config: LineFollowConfig,
}

impl LineFollower {
    pub fn new(config: LineFollowConfig) -> Self {
        Self { config }
    }

    /// `None` when no colour in `colors` is visible
    pub fn steer(
        &self,
        colors: &[LineColor],
        frame: &ColorFrame,
        finder: &dyn ContourFinder,
    ) -> Option<f32> {
        let roi = self.config.roi.resolve(frame.rows(), frame.cols());
        colors.iter().find_map(|color| {
            let contours = finder.find_contours(frame, &roi, &color.hsv_range());
            largest_contour(contours, self.config.min_contour_area).map(|contour| {
                remap_range(
                    contour.center_column(),
                    0.0,
                    frame.cols() as f32,
                    -1.0,
                    1.0,
                    false,
                )
            })
        })
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct LaneFollowConfig {
    pub min_contour_area: f32,
    pub roi: RoiFraction,
    pub gate_marker_id: u32,
    pub primary_color: LineColor,
    pub secondary_color: LineColor,
    pub max_speed: f32,
    pub fast_speed: f32,
    pub slow_speed: f32,
    pub one_lane_turn_angle: f32,
}

impl Default for LaneFollowConfig {
    fn default() -> Self {
        Self {
            min_contour_area: 500.0,
            roi: RoiFraction {
                top: 2.0 / 3.0,
                ..RoiFraction::FULL
            },
            gate_marker_id: 1,
            primary_color: LineColor::Orange,
            secondary_color: LineColor::Purple,
            max_speed: 0.35,
            fast_speed: 1.0,
            slow_speed: 0.5,
            one_lane_turn_angle: 0.75,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneStatus {
    Waiting,
    NoLane,
    OneLane,
    TwoLanes,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneDecision {
    pub speed: f32,
    pub angle: f32,
    pub status: LaneStatus,
}

#[derive(Debug, Clone)]
pub struct LaneFollower {
    config: LaneFollowConfig,
    colors: ColorChoice,
    driving: bool,
}

impl LaneFollower {
    pub fn new(config: LaneFollowConfig) -> Self {
        let colors = ColorChoice {
            primary: config.primary_color,
            secondary: config.secondary_color,
        };
        Self {
            config,
            colors,
            driving: false,
        }
    }

    pub fn config(&self) -> &LaneFollowConfig {
        &self.config
    }

    pub fn colors(&self) -> ColorChoice {
        self.colors
    }

    pub fn driving(&self) -> bool {
        self.driving
    }

    /// Look for the gate marker. It starts the car and its colour becomes the
    /// primary lane colour.
    pub fn observe_markers(
        &mut self,
        markers: &[Marker],
        frame: Option<&ColorFrame>,
        finder: &dyn ContourFinder,
    ) {
        for marker in markers
            .iter()
            .filter(|marker| marker.id == self.config.gate_marker_id)
        {
            if !self.driving {
                info!("Gate marker found, begin driving");
                self.driving = true;
            }

            let palette = [self.colors.primary, self.colors.secondary];
            let color = match (marker.color, frame) {
                (Some(color), _) => Some(color),
                (None, Some(frame)) => marker.clone().detect_color(frame, &palette, finder),
                (None, None) => None,
            };
            if let Some(color) = color {
                if color == self.colors.secondary {
                    self.colors = ColorChoice {
                        primary: self.colors.secondary,
                        secondary: self.colors.primary,
                    };
                    info!("Primary lane color set to {}", self.colors.primary.name());
                }
            }
        }
    }

    pub fn steer(&self, frame: &ColorFrame, finder: &dyn ContourFinder) -> LaneDecision {
        if !self.driving {
            return LaneDecision {
                speed: 0.0,
                angle: 0.0,
                status: LaneStatus::Waiting,
            };
        }
        let roi = self.config.roi.resolve(frame.rows(), frame.cols());
        let lanes_of = |color: LineColor| -> Vec<Contour> {
            finder
                .find_contours(frame, &roi, &color.hsv_range())
                .into_iter()
                .filter(|contour| contour.area > self.config.min_contour_area)
                .collect()
        };

        // sharp turn colour first
        let mut speed = self.config.slow_speed;
        let mut contours = lanes_of(self.colors.secondary);
        if contours.is_empty() {
            contours = lanes_of(self.colors.primary);
            if !contours.is_empty() {
                speed = self.config.fast_speed;
            }
        }

        let width = frame.cols() as f32;
        match contours.len() {
            0 => {
                debug!("No lanes found");
                LaneDecision {
                    speed: self.config.slow_speed,
                    angle: 0.0,
                    status: LaneStatus::NoLane,
                }
            }
            1 => {
                // the missing lane must be on the other side
                let angle = if contours[0].center_column() > width / 2.0 {
                    -self.config.one_lane_turn_angle
                } else {
                    self.config.one_lane_turn_angle
                };
                LaneDecision {
                    speed,
                    angle,
                    status: LaneStatus::OneLane,
                }
            }
            _ => {
                contours.sort_by(|a, b| b.area.total_cmp(&a.area));
                let midpoint = (contours[0].center_column() + contours[1].center_column()) / 2.0;
                LaneDecision {
                    speed,
                    angle: remap_range(midpoint, 0.0, width, -1.0, 1.0, false),
                    status: LaneStatus::TwoLanes,
                }
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::{
        roi::Roi,
        vision::{ColorFrame, Contour, ContourFinder, HsvRange, LineColor},
    };
    use nalgebra as na;

    #[derive(Default)]
    pub struct CannedContours {
        pub contours: Vec<(LineColor, Vec<Contour>)>,
    }

    impl CannedContours {
        pub fn with(mut self, color: LineColor, contours: Vec<Contour>) -> Self {
            self.contours.push((color, contours));
            self
        }
    }

    impl ContourFinder for CannedContours {
        fn find_contours(&self, _: &ColorFrame, _: &Roi, color: &HsvRange) -> Vec<Contour> {
            self.contours
                .iter()
                .filter(|(line_color, _)| line_color.hsv_range() == *color)
                .flat_map(|(_, contours)| contours.clone())
                .collect()
        }
    }

    pub fn contour(column: f32, area: f32) -> Contour {
        Contour {
            area,
            centroid: na::Point2::new(column, 400.0),
            bounds: Roi::full(1, 1),
        }
    }
}
