use crate::{marker::Marker, marker::Orientation, vision::LineColor};
use serde::{Deserialize, Serialize};
use tracing::*;

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct CourseConfig {
    pub reference_marker_id: u32,
    pub color_candidates: Vec<LineColor>,
    pub default_line_color: LineColor,
    pub fallback_line_color: LineColor,
    pub explore_speed: f32,
    pub wall_follow_speed: f32,
    pub line_follow_speed: f32,
}

impl Default for CourseConfig {
    fn default() -> Self {
        Self {
            reference_marker_id: 1,
            color_candidates: vec![LineColor::Red, LineColor::Blue],
            default_line_color: LineColor::Blue,
            fallback_line_color: LineColor::Green,
            explore_speed: 0.4,
            wall_follow_speed: 0.5,
            line_follow_speed: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStage {
    #[default]
    None,
    MarkerId,
    Orientation,
    Color,
}

impl MissionStage {
    /// Stage entered on the next new marker, `None` once terminal
    pub fn next(self) -> Option<MissionStage> {
        match self {
            MissionStage::None => Some(MissionStage::MarkerId),
            MissionStage::MarkerId => Some(MissionStage::Orientation),
            MissionStage::Orientation => Some(MissionStage::Color),
            MissionStage::Color => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn sign(&self) -> f32 {
        match self {
            Direction::Left => -1.0,
            Direction::Right => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorChoice {
    pub primary: LineColor,
    pub secondary: LineColor,
}

impl ColorChoice {
    pub fn priority(&self) -> [LineColor; 2] {
        [self.primary, self.secondary]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageTransition {
    pub from: MissionStage,
    pub to: MissionStage,
    pub marker_id: u32,
}

#[derive(Debug, Clone)]
pub struct StageMachine {
    config: CourseConfig,
    stage: MissionStage,
    last_marker_id: Option<u32>,
    direction: Option<Direction>,
    colors: Option<ColorChoice>,
}

impl StageMachine {
    pub fn new(config: CourseConfig) -> Self {
        Self {
            config,
            stage: MissionStage::None,
            last_marker_id: None,
            direction: None,
            colors: None,
        }
    }

    pub fn config(&self) -> &CourseConfig {
        &self.config
    }

    pub fn stage(&self) -> MissionStage {
        self.stage
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn colors(&self) -> Option<ColorChoice> {
        self.colors
    }

    pub fn last_marker_id(&self) -> Option<u32> {
        self.last_marker_id
    }

    pub fn is_novel(&self, marker: &Marker) -> bool {
        self.stage.next().is_some() && self.last_marker_id != Some(marker.id)
    }

    /// `resolve_color` is only called when entering the colour stage.
    pub fn observe<F>(
        &mut self,
        marker: Option<&Marker>,
        resolve_color: F,
    ) -> Option<StageTransition>
    where
        F: FnOnce(&Marker) -> Option<LineColor>,
    {
        let marker = marker?;
        if !self.is_novel(marker) {
            return None;
        }
        let from = self.stage;
        let to = from.next()?;

        match to {
            MissionStage::None => {}
            MissionStage::MarkerId => {
                self.direction = Some(if marker.id == self.config.reference_marker_id {
                    Direction::Right
                } else {
                    Direction::Left
                });
            }
            MissionStage::Orientation => {
                self.direction = Some(if marker.orientation() == Orientation::Right {
                    Direction::Right
                } else {
                    Direction::Left
                });
            }
            MissionStage::Color => {
                let detected = resolve_color(marker)
                    .filter(|color| self.config.color_candidates.contains(color));
                self.colors = Some(ColorChoice {
                    primary: detected.unwrap_or(self.config.default_line_color),
                    secondary: self.config.fallback_line_color,
                });
            }
        }

        self.stage = to;
        self.last_marker_id = Some(marker.id);
        info!(
            marker_id = marker.id,
            "Stage {:?} -> {:?}, direction {:?}, colors {:?}",
            from,
            to,
            self.direction,
            self.colors
        );
        Some(StageTransition {
            from,
            to,
            marker_id: marker.id,
        })
    }

    pub fn reset(&mut self) {
        self.stage = MissionStage::None;
        self.last_marker_id = None;
        self.direction = None;
        self.colors = None;
    }
}
