use crate::roi::Roi;
use nalgebra as na;
use serde::{Deserialize, Serialize};

/// OpenCV convention, hue in `0..180`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorFrame {
    rows: usize,
    cols: usize,
    pixels: Vec<Hsv>,
}

impl ColorFrame {
    /// `pixels` in row-major order. Returns `None` if the size doesn't match.
    pub fn from_pixels(rows: usize, cols: usize, pixels: Vec<Hsv>) -> Option<Self> {
        if pixels.len() != rows * cols {
            return None;
        }
        Some(Self { rows, cols, pixels })
    }

    pub fn filled(rows: usize, cols: usize, pixel: Hsv) -> Self {
        Self {
            rows,
            cols,
            pixels: vec![pixel; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn pixel(&self, row: usize, col: usize) -> Hsv {
        self.pixels[row * self.cols + col]
    }

    pub fn fill_rect(&mut self, roi: &Roi, pixel: Hsv) {
        let roi = roi.clipped(self.rows, self.cols);
        for row in roi.top..roi.bottom {
            let start = row * self.cols;
            self.pixels[start + roi.left..start + roi.right].fill(pixel);
        }
    }
}

/// Inclusive HSV threshold. Hue wraps around when `lower.h > upper.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvRange {
    pub lower: Hsv,
    pub upper: Hsv,
}

impl HsvRange {
    pub const fn new(lower: Hsv, upper: Hsv) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, pixel: Hsv) -> bool {
        let hue = if self.lower.h <= self.upper.h {
            (self.lower.h..=self.upper.h).contains(&pixel.h)
        } else {
            pixel.h >= self.lower.h || pixel.h <= self.upper.h
        };
        hue && (self.lower.s..=self.upper.s).contains(&pixel.s)
            && (self.lower.v..=self.upper.v).contains(&pixel.v)
    }
}

/// Line and marker colours the car knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineColor {
    Red,
    Blue,
    Green,
    Orange,
    Purple,
}

impl LineColor {
    pub fn hsv_range(&self) -> HsvRange {
        match self {
            LineColor::Red => HsvRange::new(Hsv::new(170, 50, 50), Hsv::new(10, 255, 255)),
            LineColor::Blue => HsvRange::new(Hsv::new(100, 150, 150), Hsv::new(120, 255, 255)),
            LineColor::Green => HsvRange::new(Hsv::new(40, 50, 50), Hsv::new(80, 255, 255)),
            LineColor::Orange => HsvRange::new(Hsv::new(10, 100, 100), Hsv::new(25, 255, 255)),
            LineColor::Purple => HsvRange::new(Hsv::new(125, 100, 100), Hsv::new(150, 255, 255)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LineColor::Red => "red",
            LineColor::Blue => "blue",
            LineColor::Green => "green",
            LineColor::Orange => "orange",
            LineColor::Purple => "purple",
        }
    }
}

/// Connected region of pixels matching a colour threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub area: f32,
    /// x is the column, y is the row, both in frame coordinates
    pub centroid: na::Point2<f32>,
    pub bounds: Roi,
}

impl Contour {
    pub fn center_column(&self) -> f32 {
        self.centroid.x
    }
}

pub trait ContourFinder: Send + Sync {
    fn find_contours(&self, frame: &ColorFrame, roi: &Roi, color: &HsvRange) -> Vec<Contour>;
}

pub fn largest_contour(contours: Vec<Contour>, min_area: f32) -> Option<Contour> {
    contours
        .into_iter()
        .filter(|contour| contour.area >= min_area)
        .max_by(|a, b| a.area.total_cmp(&b.area))
}

/// Thresholds the frame and labels 4-connected components.
#[derive(Debug, Clone, Default)]
pub struct HsvContourFinder {
    /// Components smaller than this are dropped as noise
    pub min_pixels: usize,
}

impl HsvContourFinder {
    pub fn new(min_pixels: usize) -> Self {
        Self { min_pixels }
    }
}

#[derive(Default)]
struct Component {
    count: usize,
    row_sum: usize,
    col_sum: usize,
    top: usize,
    left: usize,
    bottom: usize,
    right: usize,
}

impl Component {
    fn starting_at(row: usize, col: usize) -> Self {
        Self {
            top: row,
            left: col,
            bottom: row,
            right: col,
            ..Default::default()
        }
    }

    fn add(&mut self, row: usize, col: usize) {
        self.count += 1;
        self.row_sum += row;
        self.col_sum += col;
        self.top = self.top.min(row);
        self.left = self.left.min(col);
        self.bottom = self.bottom.max(row);
        self.right = self.right.max(col);
    }

    fn into_contour(self, roi: &Roi) -> Contour {
        let count = self.count as f32;
        Contour {
            area: count,
            centroid: na::Point2::new(
                roi.left as f32 + self.col_sum as f32 / count,
                roi.top as f32 + self.row_sum as f32 / count,
            ),
            bounds: Roi::new(
                roi.top + self.top,
                roi.left + self.left,
                roi.top + self.bottom + 1,
                roi.left + self.right + 1,
            ),
        }
    }
}

impl ContourFinder for HsvContourFinder {
    fn find_contours(&self, frame: &ColorFrame, roi: &Roi, color: &HsvRange) -> Vec<Contour> {
        let roi = roi.clipped(frame.rows(), frame.cols());
        let (height, width) = (roi.height(), roi.width());
        if roi.is_empty() {
            return vec![];
        }

        let mut mask: Vec<bool> = (0..height * width)
            .map(|index| {
                color.contains(frame.pixel(roi.top + index / width, roi.left + index % width))
            })
            .collect();

        let mut contours = vec![];
        let mut stack = vec![];
        for start in 0..mask.len() {
            if !mask[start] {
                continue;
            }
            mask[start] = false;
            stack.push(start);
            let mut component = Component::starting_at(start / width, start % width);

            while let Some(index) = stack.pop() {
                let (row, col) = (index / width, index % width);
                component.add(row, col);

                let neighbours = [
                    (row > 0).then(|| index - width),
                    (row + 1 < height).then(|| index + width),
                    (col > 0).then(|| index - 1),
                    (col + 1 < width).then(|| index + 1),
                ];
                for neighbour in neighbours.into_iter().flatten() {
                    if mask[neighbour] {
                        mask[neighbour] = false;
                        stack.push(neighbour);
                    }
                }
            }

            if component.count >= self.min_pixels.max(1) {
                contours.push(component.into_contour(&roi));
            }
        }
        contours
    }
}
