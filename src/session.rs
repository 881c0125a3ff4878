use crate::{
    depth::DepthFrame,
    driver::MotionCommand,
    lidar::RangeScan,
    line_follow::{
        LaneDecision, LaneFollowConfig, LaneFollower, LaneStatus, LineFollowConfig, LineFollower,
    },
    marker::Marker,
    roi::RoiFraction,
    safety::{override_speed, SafetyAdvisory, SafetyConfig, SafetyEnvelope},
    speed_estimator::SpeedEstimator,
    stage::{ColorChoice, CourseConfig, Direction, MissionStage, StageMachine, StageTransition},
    vision::{ColorFrame, ContourFinder},
    wall_follow::{WallFollowConfig, WallFollower},
};
use serde::{Deserialize, Serialize};
use tracing::*;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    #[default]
    Manual,
    MarkerCourse,
    LaneFollow,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct ControlConfig {
    pub mode: DriveMode,
    pub rate_hz: f32,
    pub min_elapsed: f32,
    pub depth_roi: RoiFraction,
    pub depth_kernel: usize,
    pub max_speed: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            mode: DriveMode::default(),
            rate_hz: 20.0,
            min_elapsed: 0.01,
            depth_roi: RoiFraction {
                top: 0.0,
                left: 0.3,
                bottom: 0.65,
                right: 0.6,
            },
            depth_kernel: 1,
            max_speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub control: ControlConfig,
    pub safety: SafetyConfig,
    pub wall_follow: WallFollowConfig,
    pub line_follow: LineFollowConfig,
    pub course: CourseConfig,
    pub lane_follow: LaneFollowConfig,
}

/// Buttons are levels, the session reacts to presses.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OperatorInput {
    pub throttle: f32,
    pub steering: f32,
    pub bypass: bool,
    pub report: bool,
    pub restart: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SensorFrame {
    pub depth: Option<DepthFrame>,
    pub color: Option<ColorFrame>,
    pub scan: Option<RangeScan>,
    pub markers: Vec<Marker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleSource {
    Operator,
    Straight,
    WallFollow,
    LineFollow,
    Lanes,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub mode: DriveMode,
    pub command: MotionCommand,
    pub requested_speed: f32,
    pub angle_source: AngleSource,
    pub advisory: Option<SafetyAdvisory>,
    pub distance: Option<f32>,
    pub speed_estimate: f32,
    pub envelope: SafetyEnvelope,
    pub stage: MissionStage,
    pub transition: Option<StageTransition>,
    pub direction: Option<Direction>,
    pub colors: Option<ColorChoice>,
    pub lane_status: Option<LaneStatus>,
}

pub struct ControlSession {
    config: SessionConfig,
    estimator: SpeedEstimator,
    stages: StageMachine,
    wall_follower: WallFollower,
    line_follower: LineFollower,
    lanes: LaneFollower,
    finder: Box<dyn ContourFinder>,
    previous_input: OperatorInput,
    /// seconds since the last distance sample
    sample_elapsed: f32,
}

impl ControlSession {
    pub fn new(config: SessionConfig, finder: Box<dyn ContourFinder>) -> Self {
        Self {
            estimator: SpeedEstimator::new(config.safety.smoothing),
            stages: StageMachine::new(config.course.clone()),
            wall_follower: WallFollower::new(config.wall_follow.clone()),
            line_follower: LineFollower::new(config.line_follow.clone()),
            lanes: LaneFollower::new(config.lane_follow.clone()),
            finder,
            previous_input: OperatorInput::default(),
            sample_elapsed: 0.0,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn mode(&self) -> DriveMode {
        self.config.control.mode
    }

    pub fn stage(&self) -> MissionStage {
        self.stages.stage()
    }

    pub fn speed_estimate(&self) -> f32 {
        self.estimator.speed()
    }

    pub fn max_speed(&self) -> f32 {
        match self.config.control.mode {
            DriveMode::LaneFollow => self.config.lane_follow.max_speed,
            _ => self.config.control.max_speed,
        }
    }

    pub fn restart(&mut self) {
        info!("Restarting control session");
        self.estimator.reset();
        self.sample_elapsed = 0.0;
        self.stages.reset();
        self.lanes.reset();
    }

    /// `elapsed` is the time since the previous cycle in seconds.
    pub fn update(
        &mut self,
        frame: &SensorFrame,
        input: &OperatorInput,
        elapsed: f32,
    ) -> CycleReport {
        if input.restart && !self.previous_input.restart {
            self.restart();
        }
        let report_requested = input.report && !self.previous_input.report;
        self.previous_input = *input;

        let distance = frame.depth.as_ref().and_then(|depth| {
            let roi = self
                .config
                .control
                .depth_roi
                .resolve(depth.rows(), depth.cols());
            depth.distance_sample(&roi, self.config.control.depth_kernel)
        });
        // the estimator needs the time between samples, not between cycles
        self.sample_elapsed += elapsed;
        let speed_estimate = if distance.is_some() {
            let sample_elapsed = self.sample_elapsed.max(self.config.control.min_elapsed);
            self.sample_elapsed = 0.0;
            self.estimator.update(distance, sample_elapsed)
        } else {
            self.estimator.speed()
        };
        let envelope = SafetyEnvelope::with_config(speed_estimate, &self.config.safety);

        let mut transition = None;
        let mut lane_status = None;
        let (requested_speed, angle, angle_source) = match self.config.control.mode {
            DriveMode::Manual => (input.throttle, input.steering, AngleSource::Operator),
            DriveMode::MarkerCourse => {
                transition = self.observe_marker(frame);
                self.course_control(frame)
            }
            DriveMode::LaneFollow => {
                let decision = self.lane_control(frame);
                lane_status = Some(decision.status);
                (decision.speed, decision.angle, AngleSource::Lanes)
            }
        };

        let (speed, advisory) =
            override_speed(requested_speed, distance, &envelope, input.bypass);
        let command = MotionCommand::new(speed, angle);

        let report = CycleReport {
            mode: self.config.control.mode,
            command,
            requested_speed,
            angle_source,
            advisory,
            distance,
            speed_estimate,
            envelope,
            stage: self.stages.stage(),
            transition,
            direction: self.stages.direction(),
            colors: self.stages.colors(),
            lane_status,
        };
        if report_requested {
            info!(?report, "Operator requested report");
        }
        report
    }

    fn observe_marker(&mut self, frame: &SensorFrame) -> Option<StageTransition> {
        let finder = self.finder.as_ref();
        let candidates = &self.config.course.color_candidates;
        // only the first visible marker counts
        self.stages.observe(frame.markers.first(), |marker| {
            marker.color.or_else(|| {
                frame.color.as_ref().and_then(|color_frame| {
                    marker
                        .clone()
                        .detect_color(color_frame, candidates, finder)
                })
            })
        })
    }

    fn course_control(&self, frame: &SensorFrame) -> (f32, f32, AngleSource) {
        let course = &self.config.course;
        match self.stages.stage() {
            MissionStage::None => (course.explore_speed, 0.0, AngleSource::Straight),
            MissionStage::MarkerId | MissionStage::Orientation => self.wall_control(frame),
            MissionStage::Color => {
                let colors = self.stages.colors().map(|colors| colors.priority());
                let line_angle = colors.zip(frame.color.as_ref()).and_then(|(colors, color_frame)| {
                    self.line_follower
                        .steer(&colors, color_frame, self.finder.as_ref())
                });
                match line_angle {
                    Some(angle) => (course.line_follow_speed, angle, AngleSource::LineFollow),
                    None => {
                        debug!("Line not found, following wall");
                        self.wall_control(frame)
                    }
                }
            }
        }
    }

    fn wall_control(&self, frame: &SensorFrame) -> (f32, f32, AngleSource) {
        let speed = self.config.course.wall_follow_speed;
        let side = self.stages.direction().unwrap_or(Direction::Right);
        match frame
            .scan
            .as_ref()
            .and_then(|scan| self.wall_follower.steer(scan, side))
        {
            Some(angle) => (speed, angle, AngleSource::WallFollow),
            None => (speed, 0.0, AngleSource::Straight),
        }
    }

    fn lane_control(&mut self, frame: &SensorFrame) -> LaneDecision {
        self.lanes
            .observe_markers(&frame.markers, frame.color.as_ref(), self.finder.as_ref());
        match frame.color.as_ref() {
            Some(color_frame) => self.lanes.steer(color_frame, self.finder.as_ref()),
            None if self.lanes.driving() => LaneDecision {
                speed: self.config.lane_follow.slow_speed,
                angle: 0.0,
                status: LaneStatus::NoLane,
            },
            None => LaneDecision {
                speed: 0.0,
                angle: 0.0,
                status: LaneStatus::Waiting,
            },
        }
    }
}
