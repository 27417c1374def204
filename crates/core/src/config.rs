use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

pub const ENV_FRAME_BUDGET_MS: &str = "FRAMESCHED_FRAME_BUDGET_MS";
pub const ENV_FRAME_INTERVAL_US: &str = "FRAMESCHED_FRAME_INTERVAL_US";
pub const ENV_MAX_FRAMES_PER_DRIVE: &str = "FRAMESCHED_MAX_FRAMES_PER_DRIVE";

/// Frame scheduler configuration, typically parsed from TOML.
///
/// The defaults leave roughly 2.6 ms of a 60 Hz frame to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Wall-clock budget of one drain pass, in milliseconds.
    #[serde(default = "default_frame_budget_ms")]
    pub frame_budget_ms: u64,
    /// Spacing between host frames, in microseconds.
    #[serde(default = "default_frame_interval_us")]
    pub frame_interval_us: u64,
    /// Upper bound on frames a host driver runs before returning. 0 = unbounded.
    #[serde(default)]
    pub max_frames_per_drive: u64,
}

fn default_frame_budget_ms() -> u64 { 14 }
fn default_frame_interval_us() -> u64 { 16_667 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_budget_ms: default_frame_budget_ms(),
            frame_interval_us: default_frame_interval_us(),
            max_frames_per_drive: 0,
        }
    }
}

impl SchedulerConfig {
    /// Parse config from a TOML string, then apply environment overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults plus environment overrides (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// - `FRAMESCHED_FRAME_BUDGET_MS` -> `frame_budget_ms`
    /// - `FRAMESCHED_FRAME_INTERVAL_US` -> `frame_interval_us`
    /// - `FRAMESCHED_MAX_FRAMES_PER_DRIVE` -> `max_frames_per_drive`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(env_opt);
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) but reads keys through `lookup`.
    /// Unparseable values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read_u64 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(v) = read_u64(ENV_FRAME_BUDGET_MS) {
            self.frame_budget_ms = v;
        }
        if let Some(v) = read_u64(ENV_FRAME_INTERVAL_US) {
            self.frame_interval_us = v;
        }
        if let Some(v) = read_u64(ENV_MAX_FRAMES_PER_DRIVE) {
            self.max_frames_per_drive = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_budget_ms == 0 {
            return Err(ConfigError::Invalid("frame_budget_ms must be greater than 0".into()));
        }
        if self.frame_interval_us == 0 {
            return Err(ConfigError::Invalid("frame_interval_us must be greater than 0".into()));
        }
        if self.frame_budget() > self.frame_interval() {
            return Err(ConfigError::Invalid(format!(
                "frame_budget_ms ({}) exceeds the frame interval ({}us)",
                self.frame_budget_ms, self.frame_interval_us
            )));
        }
        Ok(())
    }

    pub fn frame_budget(&self) -> Duration {
        Duration::from_millis(self.frame_budget_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(self.frame_interval_us)
    }

    /// `None` when the driver should keep running until shutdown.
    pub fn frame_limit(&self) -> Option<u64> {
        (self.max_frames_per_drive > 0).then_some(self.max_frames_per_drive)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Scheduler config loaded:");
        tracing::info!("  frame_budget:    {:?}", self.frame_budget());
        tracing::info!("  frame_interval:  {:?}", self.frame_interval());
        match self.frame_limit() {
            Some(n) => tracing::info!("  frame_limit:     {}", n),
            None => tracing::info!("  frame_limit:     unbounded"),
        }
    }
}
