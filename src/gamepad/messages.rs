use chrono::prelude::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State of every gamepad attached to the remote
#[derive(Debug, Deserialize, Serialize)]
pub struct InputMessage {
    pub gamepads: BTreeMap<usize, GamepadMessage>,
    pub time: DateTime<Utc>,
}

impl InputMessage {
    /// Gamepad with the lowest id
    pub fn first_gamepad(&self) -> Option<&GamepadMessage> {
        self.gamepads.values().next()
    }
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct GamepadMessage {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub button_down: BTreeMap<Button, bool>,
    #[serde(default)]
    pub axis_state: BTreeMap<Axis, f32>,
}

impl GamepadMessage {
    pub fn axis(&self, axis: Axis) -> f32 {
        self.axis_state.get(&axis).copied().unwrap_or_default()
    }

    pub fn is_down(&self, button: Button) -> bool {
        self.button_down.get(&button).copied().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Copy)]
pub enum Button {
    South,
    East,
    North,
    West,
    C,
    Z,
    LeftTrigger,
    LeftTrigger2,
    RightTrigger,
    RightTrigger2,
    Select,
    Start,
    Mode,
    LeftThumb,
    RightThumb,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    Unknown,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Copy)]
pub enum Axis {
    LeftStickX,
    LeftStickY,
    LeftZ,
    RightStickX,
    RightStickY,
    RightZ,
    DPadX,
    DPadY,
    Unknown,
}
