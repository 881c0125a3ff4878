use anyhow::Result;
use clap::Parser;
use scout::{
    configuration,
    driver::vehicle_driver_from_config,
    error::ErrorWrapper,
    gamepad::{start_gamepad_loop, OperatorCommand},
    lidar::start_lidar_thread,
    logging,
    sensor_bridge::{publish_telemetry, start_sensor_bridge, SENSOR_TIMEOUT},
    session::{ControlSession, SensorFrame},
    util::latest_value_channel,
    vision::HsvContourFinder,
};
use std::{
    path::PathBuf,
    time::{Duration, Instant},
};
use tracing::*;
use zenoh::prelude::r#async::*;

const VOLTAGE_CHECK_PERIOD: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(
    version,
    author = "David M. Weis <dweis7@gmail.com>",
    about = "Scout"
)]
struct Args {
    /// path to config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbosity: u8,

    /// Log as json
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup_tracing(args.verbosity, args.json_logs);

    let app_config = configuration::AppConfig::load_config(&args.config)?;

    let mut session = ControlSession::new(
        app_config.session_config(),
        Box::<HsvContourFinder>::default(),
    );
    info!("Starting in {:?} mode", session.mode());

    let (scan_tx, scan_rx) = latest_value_channel();
    if let Some(lidar_config) = &app_config.lidar {
        start_lidar_thread(lidar_config.clone(), scan_tx)?;
    } else {
        warn!("No lidar configured, wall following goes straight");
    }

    let mut driver = vehicle_driver_from_config(app_config.driver.clone()).await?;
    driver.set_max_speed(session.max_speed());

    // zenoh
    let zenoh_config = app_config.zenoh.get_zenoh_config()?;
    let zenoh_session = zenoh::open(zenoh_config)
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?
        .into_arc();

    let (operator_tx, operator_rx) = latest_value_channel::<OperatorCommand>();
    start_gamepad_loop(zenoh_session.clone(), operator_tx).await?;
    let sensors = start_sensor_bridge(zenoh_session.clone()).await?;

    let period = Duration::from_secs_f32(1.0 / app_config.control.rate_hz.max(1.0));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut last_cycle = Instant::now();
    let mut last_voltage_check = Instant::now();

    loop {
        // cycles follow the depth camera, the configured rate is the fallback
        let depth = tokio::select! {
            _ = &mut ctrl_c => break,
            depth = tokio::time::timeout(period, sensors.depth.recv()) => match depth {
                Ok(Ok(depth)) => Some(depth),
                Ok(Err(_)) => {
                    tokio::time::sleep(period).await;
                    None
                }
                Err(_) => None,
            },
        };

        let now = Instant::now();
        let elapsed = now.duration_since(last_cycle).as_secs_f32();
        last_cycle = now;

        let frame = SensorFrame {
            depth,
            color: sensors.color.latest_at(now, SENSOR_TIMEOUT),
            scan: scan_rx.latest_at(now, SENSOR_TIMEOUT),
            markers: sensors
                .markers
                .take()
                .map(|frame| frame.markers)
                .unwrap_or_default(),
        };
        let input = OperatorCommand::input_at(operator_rx.latest().as_ref(), now);
        let report = session.update(&frame, &input, elapsed);

        if let Err(err) = driver.send(report.command).await {
            error!("Failed to send motion command {:?}", err);
        }
        if let Err(err) = publish_telemetry(&zenoh_session, &report).await {
            warn!("Failed to publish telemetry {:?}", err);
        }

        if last_voltage_check.elapsed() > VOLTAGE_CHECK_PERIOD {
            last_voltage_check = Instant::now();
            match driver.read_voltage().await {
                Ok(Some(voltage)) => debug!("Battery at {:.2}V", voltage),
                Ok(None) => (),
                Err(err) => warn!("Failed to read voltage {:?}", err),
            }
        }
    }

    info!("Stopping vehicle");
    driver.stop().await?;
    Ok(())
}
