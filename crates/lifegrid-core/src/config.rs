//! Configuration loading and typed config structures for Lifegrid.
//!
//! The configuration lives in `lifegrid-config.yaml`. This module defines
//! strongly-typed structs that mirror the YAML structure, and provides a
//! loader that reads and validates the file. The `params` section is
//! required; every other section has defaults.

use std::path::Path;
use std::time::Duration;

use lifegrid_types::{Params, ParamsError};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The run parameters are invalid.
    #[error("invalid run parameters: {source}")]
    Params {
        /// The violated constraint.
        #[from]
        source: ParamsError,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `lifegrid-config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LifegridConfig {
    /// Grid size, turn count, and worker count.
    pub params: ParamsConfig,

    /// Control loop and event stream settings.
    #[serde(default)]
    pub control: ControlConfig,

    /// Image directories.
    #[serde(default)]
    pub io: IoConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LifegridConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for image directories:
    /// - `LIFEGRID_INPUT_DIR` overrides `io.input_dir`
    /// - `LIFEGRID_OUTPUT_DIR` overrides `io.output_dir`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Params`] if the run parameters are invalid.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.io.apply_env_overrides();
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Params`] if the run parameters are invalid.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.params().validate()?;
        Ok(config)
    }

    /// The validated run parameters.
    pub const fn params(&self) -> Params {
        Params {
            width: self.params.width,
            height: self.params.height,
            turns: self.params.turns,
            workers: self.params.workers,
        }
    }
}

/// Run parameters. All fields are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ParamsConfig {
    /// Grid width in cells.
    pub width: usize,
    /// Grid height in cells.
    pub height: usize,
    /// Number of turns to execute.
    pub turns: u32,
    /// Number of band workers per turn.
    pub workers: usize,
}

/// Control loop and event stream settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ControlConfig {
    /// Milliseconds between alive-cell reports.
    #[serde(default = "default_ticker_interval_ms")]
    pub ticker_interval_ms: u64,

    /// Capacity of the event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Capacity of the key input channel.
    #[serde(default = "default_key_buffer")]
    pub key_buffer: usize,
}

impl ControlConfig {
    /// The alive-cell report interval.
    pub const fn ticker_interval(&self) -> Duration {
        Duration::from_millis(self.ticker_interval_ms)
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            ticker_interval_ms: default_ticker_interval_ms(),
            event_buffer: default_event_buffer(),
            key_buffer: default_key_buffer(),
        }
    }
}

/// Image directories used by the file-backed image store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IoConfig {
    /// Directory holding input images.
    #[serde(default = "default_input_dir")]
    pub input_dir: String,

    /// Directory snapshots are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl IoConfig {
    /// Apply environment variable overrides for image directories.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("LIFEGRID_INPUT_DIR") {
            self.input_dir = dir;
        }
        if let Ok(dir) = std::env::var("LIFEGRID_OUTPUT_DIR") {
            self.output_dir = dir;
        }
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Print every event as a JSON line on stdout.
    #[serde(default)]
    pub json_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_events: false,
        }
    }
}

const fn default_ticker_interval_ms() -> u64 {
    2000
}

const fn default_event_buffer() -> usize {
    1024
}

const fn default_key_buffer() -> usize {
    16
}

fn default_input_dir() -> String {
    "images".to_owned()
}

fn default_output_dir() -> String {
    "out".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}
