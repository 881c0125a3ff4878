use crate::roi::Roi;
use nalgebra as na;

/// Depth image in centimetres. A value of `0.0` means the sensor has no data
/// for that pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    pixels: na::DMatrix<f32>,
}

impl DepthFrame {
    pub fn from_matrix(pixels: na::DMatrix<f32>) -> Self {
        Self { pixels }
    }

    pub fn from_row_slice(rows: usize, cols: usize, data: &[f32]) -> Self {
        Self {
            pixels: na::DMatrix::from_row_slice(rows, cols, data),
        }
    }

    pub fn filled(rows: usize, cols: usize, distance: f32) -> Self {
        Self {
            pixels: na::DMatrix::from_element(rows, cols, distance),
        }
    }

    pub fn rows(&self) -> usize {
        self.pixels.nrows()
    }

    pub fn cols(&self) -> usize {
        self.pixels.ncols()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.pixels.get((row, col)).copied()
    }

    pub fn pixels_mut(&mut self) -> &mut na::DMatrix<f32> {
        &mut self.pixels
    }

    /// Location of the nearest valid pixel inside `roi`, in frame coordinates.
    pub fn closest_pixel(&self, roi: &Roi) -> Option<(usize, usize)> {
        let roi = roi.clipped(self.rows(), self.cols());
        if roi.is_empty() {
            return None;
        }
        let window = self
            .pixels
            .view((roi.top, roi.left), (roi.height(), roi.width()));

        let mut closest: Option<((usize, usize), f32)> = None;
        for col in 0..window.ncols() {
            for row in 0..window.nrows() {
                let depth = window[(row, col)];
                if !is_valid_depth(depth) {
                    continue;
                }
                match closest {
                    Some((_, best)) if best <= depth => {}
                    _ => closest = Some(((row + roi.top, col + roi.left), depth)),
                }
            }
        }
        closest.map(|(location, _)| location)
    }

    pub fn average_around(&self, row: usize, col: usize, kernel: usize) -> Option<f32> {
        let half = kernel.max(1) / 2;
        let roi = Roi::new(
            row.saturating_sub(half),
            col.saturating_sub(half),
            row + half + 1,
            col + half + 1,
        )
        .clipped(self.rows(), self.cols());

        let (sum, count) = (roi.top..roi.bottom)
            .flat_map(|r| (roi.left..roi.right).map(move |c| (r, c)))
            .map(|(r, c)| self.pixels[(r, c)])
            .filter(|depth| is_valid_depth(*depth))
            .fold((0.0, 0_usize), |(sum, count), depth| (sum + depth, count + 1));

        if count == 0 {
            None
        } else {
            Some(sum / count as f32)
        }
    }

    /// `None` when the region holds no valid depth at all.
    pub fn distance_sample(&self, roi: &Roi, kernel: usize) -> Option<f32> {
        let (row, col) = self.closest_pixel(roi)?;
        if kernel <= 1 {
            self.get(row, col)
        } else {
            self.average_around(row, col, kernel)
        }
    }
}

fn is_valid_depth(depth: f32) -> bool {
    depth.is_finite() && depth > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zero_pixels_are_ignored() {
        let mut frame = DepthFrame::filled(4, 4, 0.0);
        frame.pixels_mut()[(2, 1)] = 42.0;
        let roi = Roi::full(4, 4);
        assert_eq!(frame.closest_pixel(&roi), Some((2, 1)));
        assert_relative_eq!(frame.distance_sample(&roi, 1).unwrap(), 42.0);
    }

    #[test]
    fn empty_frame_has_no_distance() {
        let frame = DepthFrame::filled(4, 4, 0.0);
        assert!(frame.distance_sample(&Roi::full(4, 4), 1).is_none());
    }

    #[test]
    fn only_roi_is_searched() {
        let mut frame = DepthFrame::filled(4, 6, 100.0);
        // closer object outside of the window
        frame.pixels_mut()[(0, 0)] = 5.0;
        frame.pixels_mut()[(1, 3)] = 60.0;
        let roi = Roi::new(0, 2, 4, 5);
        assert_eq!(frame.closest_pixel(&roi), Some((1, 3)));
        assert_relative_eq!(frame.distance_sample(&roi, 1).unwrap(), 60.0);
    }

    #[test]
    fn kernel_averages_valid_neighbours() {
        let data = [
            10.0, 30.0, 0.0, //
            30.0, 30.0, 30.0, //
            0.0, 30.0, 30.0,
        ];
        let frame = DepthFrame::from_row_slice(3, 3, &data);
        let roi = Roi::full(3, 3);
        assert_eq!(frame.closest_pixel(&roi), Some((0, 0)));
        // 3x3 kernel centred on (0, 0) covers (0..2, 0..2)
        assert_relative_eq!(frame.distance_sample(&roi, 3).unwrap(), 25.0);
    }
}
