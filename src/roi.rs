use serde::{Deserialize, Serialize};

/// Pixel rectangle of a frame, `bottom` and `right` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl Roi {
    pub fn new(top: usize, left: usize, bottom: usize, right: usize) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    pub fn full(rows: usize, cols: usize) -> Self {
        Self::new(0, 0, rows, cols)
    }

    /// Limit the rectangle to a `rows` x `cols` frame
    pub fn clipped(&self, rows: usize, cols: usize) -> Self {
        let bottom = self.bottom.min(rows);
        let right = self.right.min(cols);
        Self {
            top: self.top.min(bottom),
            left: self.left.min(right),
            bottom,
            right,
        }
    }

    pub fn height(&self) -> usize {
        self.bottom.saturating_sub(self.top)
    }

    pub fn width(&self) -> usize {
        self.right.saturating_sub(self.left)
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0 || self.width() == 0
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.top && row < self.bottom && col >= self.left && col < self.right
    }
}

/// Region of interest expressed as fractions of the frame size.
///
/// Configuration uses fractions so the same settings work for every camera
/// resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiFraction {
    pub top: f32,
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
}

impl RoiFraction {
    pub const FULL: RoiFraction = RoiFraction {
        top: 0.0,
        left: 0.0,
        bottom: 1.0,
        right: 1.0,
    };

    pub fn resolve(&self, rows: usize, cols: usize) -> Roi {
        let scale = |fraction: f32, size: usize| (fraction.clamp(0.0, 1.0) * size as f32) as usize;
        Roi::new(
            scale(self.top, rows),
            scale(self.left, cols),
            scale(self.bottom, rows),
            scale(self.right, cols),
        )
        .clipped(rows, cols)
    }
}

impl Default for RoiFraction {
    fn default() -> Self {
        Self::FULL
    }
}
