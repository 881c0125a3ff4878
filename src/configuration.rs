use config::{builder::DefaultState, Config, ConfigBuilder};
use serde::Deserialize;
use std::{path::PathBuf, str};
use tracing::*;

use crate::{
    driver::DriverConfig,
    error::ErrorWrapper,
    lidar::LidarConfig,
    line_follow::{LaneFollowConfig, LineFollowConfig},
    safety::SafetyConfig,
    session::{ControlConfig, SessionConfig},
    stage::CourseConfig,
    wall_follow::WallFollowConfig,
};

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub wall_follow: WallFollowConfig,
    #[serde(default)]
    pub line_follow: LineFollowConfig,
    #[serde(default)]
    pub course: CourseConfig,
    #[serde(default)]
    pub lane_follow: LaneFollowConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub lidar: Option<LidarConfig>,
    #[serde(default)]
    pub zenoh: ScoutZenohConfig,
}

impl AppConfig {
    pub fn load_config(config: &Option<PathBuf>) -> anyhow::Result<Self> {
        let builder = if let Some(config) = config {
            info!("Using configuration from {:?}", config);
            Config::builder().add_source(config::File::with_name(
                config
                    .to_str()
                    .ok_or_else(|| anyhow::anyhow!("Failed to convert path"))?,
            ))
        } else {
            info!("Using dev configuration");
            Config::builder()
                .add_source(config::File::with_name("config/settings"))
                .add_source(config::File::with_name("config/dev_settings").required(false))
        };

        Self::from_sources(builder, environment())
    }

    fn from_sources(
        files: ConfigBuilder<DefaultState>,
        environment: config::Environment,
    ) -> anyhow::Result<Self> {
        // environment goes last so it overrides the files
        let settings = files.add_source(environment).build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Tunables of the control session
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            control: self.control.clone(),
            safety: self.safety.clone(),
            wall_follow: self.wall_follow.clone(),
            line_follow: self.line_follow.clone(),
            course: self.course.clone(),
            lane_follow: self.lane_follow.clone(),
        }
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("APP")
        .prefix_separator("_")
        .separator("__")
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ScoutZenohConfig {
    #[serde(default)]
    pub connect: Vec<zenoh_config::EndPoint>,
    #[serde(default)]
    pub listen: Vec<zenoh_config::EndPoint>,
    #[serde(default)]
    pub config_path: Option<String>,
}

impl ScoutZenohConfig {
    pub fn get_zenoh_config(&self) -> anyhow::Result<zenoh::config::Config> {
        let mut config = if let Some(conf_file) = &self.config_path {
            zenoh::config::Config::from_file(conf_file).map_err(ErrorWrapper::ZenohError)?
        } else {
            zenoh::config::Config::default()
        };
        if !self.connect.is_empty() {
            config.connect.endpoints.clone_from(&self.connect);
        }
        if !self.listen.is_empty() {
            config.listen.endpoints.clone_from(&self.listen);
        }
        Ok(config)
    }
}
