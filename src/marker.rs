use crate::{
    roi::Roi,
    vision::{largest_contour, ColorFrame, ContourFinder, LineColor},
};
use chrono::prelude::{DateTime, Utc};
use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Which way the top edge of the marker is pointing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Up,
    Left,
    Down,
    Right,
}

impl Orientation {
    /// Corner 0 is the marker's own top-left corner.
    pub fn from_corners(corners: &[na::Point2<f32>; 4]) -> Self {
        let center = corners
            .iter()
            .fold(na::Vector2::zeros(), |sum, corner| sum + corner.coords)
            / 4.0;
        let offset = corners[0].coords - center;
        match (offset.x < 0.0, offset.y < 0.0) {
            (true, true) => Orientation::Up,
            (false, true) => Orientation::Right,
            (false, false) => Orientation::Down,
            (true, false) => Orientation::Left,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: u32,
    /// Image coordinates, x is the column
    pub corners: [na::Point2<f32>; 4],
    #[serde(default)]
    pub orientation: Option<Orientation>,
    #[serde(default)]
    pub color: Option<LineColor>,
}

impl Marker {
    pub fn new(id: u32, corners: [na::Point2<f32>; 4]) -> Self {
        Self {
            id,
            corners,
            orientation: None,
            color: None,
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
            .unwrap_or_else(|| Orientation::from_corners(&self.corners))
    }

    /// Bounding box of the corners grown by half the marker size on every
    /// side, which covers the coloured border around the marker.
    pub fn search_region(&self, rows: usize, cols: usize) -> Roi {
        let (min, max) = self.corners.iter().fold(
            (
                na::Point2::new(f32::MAX, f32::MAX),
                na::Point2::new(f32::MIN, f32::MIN),
            ),
            |(min, max), corner| (min.inf(corner), max.sup(corner)),
        );
        let margin = (max - min) / 2.0;
        // corners come off the network, clamp before converting
        let to_index = |value: f32, limit: usize| value.clamp(0.0, limit as f32) as usize;
        Roi::new(
            to_index(min.y - margin.y, rows),
            to_index(min.x - margin.x, cols),
            to_index((max.y + margin.y).ceil() + 1.0, rows),
            to_index((max.x + margin.x).ceil() + 1.0, cols),
        )
        .clipped(rows, cols)
    }

    /// The palette entry covering the most pixels around the marker wins.
    pub fn detect_color(
        &mut self,
        frame: &ColorFrame,
        palette: &[LineColor],
        finder: &dyn ContourFinder,
    ) -> Option<LineColor> {
        let region = self.search_region(frame.rows(), frame.cols());
        self.color = palette
            .iter()
            .filter_map(|color| {
                let contours = finder.find_contours(frame, &region, &color.hsv_range());
                largest_contour(contours, 1.0).map(|contour| (*color, contour.area))
            })
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(color, _)| color);
        self.color
    }
}

/// Marker list as published by the external detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerFrame {
    pub markers: Vec<Marker>,
    pub time: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) fn square_marker(id: u32, center: (f32, f32), size: f32) -> Marker {
    let (x, y) = center;
    let half = size / 2.0;
    Marker::new(
        id,
        [
            na::Point2::new(x - half, y - half),
            na::Point2::new(x + half, y - half),
            na::Point2::new(x + half, y + half),
            na::Point2::new(x - half, y + half),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::{Hsv, HsvContourFinder};

    #[test]
    fn upright_marker() {
        let marker = square_marker(3, (50.0, 50.0), 20.0);
        assert_eq!(marker.orientation(), Orientation::Up);
    }

    #[test]
    fn rotated_marker() {
        let mut marker = square_marker(3, (50.0, 50.0), 20.0);
        // top-left corner now sits in the top-right of the image
        marker.corners.rotate_left(1);
        assert_eq!(marker.orientation(), Orientation::Right);
        marker.corners.rotate_left(1);
        assert_eq!(marker.orientation(), Orientation::Down);
        marker.corners.rotate_left(1);
        assert_eq!(marker.orientation(), Orientation::Left);
    }

    #[test]
    fn reported_orientation_wins() {
        let mut marker = square_marker(3, (50.0, 50.0), 20.0);
        marker.orientation = Some(Orientation::Left);
        assert_eq!(marker.orientation(), Orientation::Left);
    }

    #[test]
    fn search_region_is_padded_and_clipped() {
        let marker = square_marker(1, (10.0, 10.0), 20.0);
        let region = marker.search_region(100, 100);
        assert_eq!(region.top, 0);
        assert_eq!(region.left, 0);
        assert_eq!(region.bottom, 31);
        assert_eq!(region.right, 31);
    }

    #[test]
    fn far_away_corners_stay_inside_frame() {
        let marker = square_marker(1, (1.0e30, 1.0e30), 20.0);
        let region = marker.search_region(100, 80);
        assert!(region.is_empty());
        assert!(region.bottom <= 100 && region.right <= 80);

        let mut marker = square_marker(1, (50.0, 50.0), 20.0);
        marker.corners[2] = na::Point2::new(f32::INFINITY, f32::INFINITY);
        let region = marker.search_region(100, 80);
        assert_eq!(region.bottom, 100);
        assert_eq!(region.right, 80);

        marker.corners[0] = na::Point2::new(f32::NAN, f32::NEG_INFINITY);
        let region = marker.search_region(100, 80);
        assert!(region.bottom <= 100 && region.right <= 80);
    }

    #[test]
    fn far_away_marker_has_no_color() {
        let frame = ColorFrame::filled(100, 100, Hsv::new(175, 220, 220));
        let mut marker = square_marker(1, (1.0e30, 1.0e30), 20.0);
        let finder = HsvContourFinder::default();
        let color = marker.detect_color(&frame, &[LineColor::Red, LineColor::Blue], &finder);
        assert!(color.is_none());
    }

    #[test]
    fn detects_border_color() {
        let mut frame = ColorFrame::filled(100, 100, Hsv::new(0, 0, 0));
        // red border with a bit of blue noise nearby
        frame.fill_rect(&Roi::new(30, 30, 70, 70), Hsv::new(175, 220, 220));
        frame.fill_rect(&Roi::new(40, 40, 60, 60), Hsv::new(0, 0, 255));
        frame.fill_rect(&Roi::new(72, 72, 74, 74), Hsv::new(110, 220, 220));

        let mut marker = square_marker(1, (50.0, 50.0), 20.0);
        let finder = HsvContourFinder::default();
        let color = marker.detect_color(&frame, &[LineColor::Red, LineColor::Blue], &finder);
        assert_eq!(color, Some(LineColor::Red));
        assert_eq!(marker.color, Some(LineColor::Red));
    }

    #[test]
    fn no_palette_color_around_marker() {
        let frame = ColorFrame::filled(100, 100, Hsv::new(0, 0, 0));
        let mut marker = square_marker(1, (50.0, 50.0), 20.0);
        let finder = HsvContourFinder::default();
        let color = marker.detect_color(&frame, &[LineColor::Red, LineColor::Blue], &finder);
        assert!(color.is_none());
    }

    #[test]
    fn marker_frame_json() {
        let json = r#"{
            "markers": [
                {"id": 7, "corners": [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]]}
            ],
            "time": "2024-06-01T12:00:00Z"
        }"#;
        let frame: MarkerFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.markers[0].id, 7);
        assert!(frame.markers[0].orientation.is_none());
        assert_eq!(frame.markers[0].orientation(), Orientation::Up);
    }
}
