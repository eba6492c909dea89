//! Daemon configuration.
//!
//! Values are layered: built-in defaults, then the optional config file at
//! `~/.config/caldav-notify/config.toml`, then `CALDAV_*` environment
//! variables (e.g. `CALDAV_NOTIFY_BEFORE_MINUTES=10`).

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use serde::Deserialize;

use crate::error::{NotifyError, NotifyResult};
use crate::source::{CommandSource, DEFAULT_FETCH_COMMAND};

const ENV_PREFIX: &str = "CALDAV";

fn default_notify_before_minutes() -> u64 {
    5
}

fn default_refresh_period_minutes() -> u64 {
    10
}

fn default_fetch_command() -> String {
    DEFAULT_FETCH_COMMAND.to_string()
}

fn default_fetch_timeout_seconds() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// How long before an event's start to notify
    #[serde(default = "default_notify_before_minutes")]
    pub notify_before_minutes: u64,

    #[serde(default = "default_refresh_period_minutes")]
    pub refresh_period_minutes: u64,

    /// Offset of the calendar server's zone from UTC. Zero means "same zone
    /// as this machine".
    #[serde(default)]
    pub server_offset_hours: i64,

    #[serde(default)]
    pub notify_icon: String,

    #[serde(default)]
    pub notify_with_sound: bool,

    #[serde(default = "default_fetch_command")]
    pub fetch_command: String,

    #[serde(default)]
    pub fetch_args: Vec<String>,

    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,

    /// Abort pending notifications for events that vanish upstream
    #[serde(default)]
    pub cancel_removed: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        NotifyConfig {
            notify_before_minutes: default_notify_before_minutes(),
            refresh_period_minutes: default_refresh_period_minutes(),
            server_offset_hours: 0,
            notify_icon: String::new(),
            notify_with_sound: false,
            fetch_command: default_fetch_command(),
            fetch_args: Vec::new(),
            fetch_timeout_seconds: default_fetch_timeout_seconds(),
            cancel_removed: false,
        }
    }
}

impl NotifyConfig {
    pub fn config_path() -> NotifyResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| NotifyError::Config("Could not determine config directory".into()))?
            .join("caldav-notify");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from `path` (or the default location) and the environment.
    ///
    /// A missing file is fine; a malformed one or an unparsable variable is
    /// not.
    pub fn load(path: Option<&Path>) -> NotifyResult<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let builder = Config::builder()
            .add_source(File::from(config_path).required(path.is_some()))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        Self::from_builder(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> NotifyResult<Self> {
        builder
            .build()
            .map_err(|e| NotifyError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| NotifyError::Config(e.to_string()))
    }

    pub fn lead_time(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.notify_before_minutes as i64)
    }

    pub fn refresh_period(&self) -> StdDuration {
        StdDuration::from_secs(self.refresh_period_minutes * 60)
    }

    pub fn server_offset(&self) -> chrono::Duration {
        chrono::Duration::hours(self.server_offset_hours)
    }

    pub fn command_source(&self) -> CommandSource {
        CommandSource::new(self.fetch_command.clone(), self.fetch_args.clone())
            .with_timeout(StdDuration::from_secs(self.fetch_timeout_seconds))
    }
}
