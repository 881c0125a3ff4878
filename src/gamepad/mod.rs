pub mod messages;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use tracing::*;
use zenoh::{prelude::r#async::*, subscriber::FlumeSubscriber, Session, SessionDeclarations};

use crate::{error::ErrorWrapper, session::OperatorInput, util::LatestSender};
use messages::{Axis, Button, GamepadMessage, InputMessage};

pub const GAMEPAD_TOPIC: &str = "remote-control/gamepad";

/// Operator input older than this is ignored
pub const USER_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

const DEADZONE: f32 = 0.07;
const LISTENER_RESTART_DELAY: Duration = Duration::from_secs(1);

/// Operator input with the time it arrived
#[derive(Debug, Clone, Copy)]
pub struct OperatorCommand {
    pub input: OperatorInput,
    pub received: Instant,
}

impl OperatorCommand {
    /// Input if it is still fresh at `now`, neutral otherwise
    pub fn input_at(command: Option<&OperatorCommand>, now: Instant) -> OperatorInput {
        command
            .filter(|command| now.saturating_duration_since(command.received) < USER_COMMAND_TIMEOUT)
            .map(|command| command.input)
            .unwrap_or_default()
    }
}

pub async fn start_gamepad_loop(
    zenoh_session: Arc<Session>,
    sender: LatestSender<OperatorCommand>,
) -> Result<()> {
    let mut gamepad_subscriber = zenoh_session
        .declare_subscriber(GAMEPAD_TOPIC)
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?;

    tokio::spawn(async move {
        while let Err(err) = run_gamepad_listener(&mut gamepad_subscriber, &sender).await {
            error!("Gamepad listener failed with {:?}", err);
            tokio::time::sleep(LISTENER_RESTART_DELAY).await;
        }
    });
    Ok(())
}

async fn run_gamepad_listener(
    subscriber: &mut FlumeSubscriber<'_>,
    sender: &LatestSender<OperatorCommand>,
) -> Result<()> {
    loop {
        let sample = subscriber.recv_async().await?;
        let message: String = sample.value.try_into()?;
        let message: InputMessage = serde_json::from_str(&message)?;

        let input = message
            .first_gamepad()
            .map(operator_input)
            .unwrap_or_default();
        let command = OperatorCommand {
            input,
            received: Instant::now(),
        };
        if sender.send(command).is_err() {
            info!("Control loop stopped, closing gamepad listener");
            return Ok(());
        }
    }
}

/// Triggers drive, the left stick steers.
pub fn operator_input(gamepad: &GamepadMessage) -> OperatorInput {
    if !gamepad.connected {
        return OperatorInput::default();
    }
    let throttle = gamepad.axis(Axis::RightZ) - gamepad.axis(Axis::LeftZ);
    OperatorInput {
        throttle: apply_deadzone(throttle).clamp(-1.0, 1.0),
        steering: apply_deadzone(gamepad.axis(Axis::LeftStickX)).clamp(-1.0, 1.0),
        bypass: gamepad.is_down(Button::RightTrigger),
        report: gamepad.is_down(Button::West),
        restart: gamepad.is_down(Button::Start),
    }
}

fn apply_deadzone(value: f32) -> f32 {
    if value.abs() < DEADZONE {
        0.0
    } else {
        value
    }
}
