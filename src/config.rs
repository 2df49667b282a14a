//! # Chamber run configuration
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [chamber]
//! driver = "espec"
//! interface = "/dev/ttyUSB0"
//!
//! [serial]
//! baud_rate = 9600
//! stop_bits = 1
//!
//! [waveform]
//! shape = "sine"
//! min_temp = "5C"
//! max_temp = "40C"
//! rise_time = "2h"
//!
//! [control]
//! cadence = "1min"
//! cycles = 3
//! ```
//!
//! Every section is optional. Command line options override file values.

// src/config.rs - Single configuration file
use crate::control::RunOptions;
use crate::hardware::serial::SerialConfig;
use crate::scheduler::{TimeSpec, WaveformConfig, WaveformOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Waveform(#[from] crate::scheduler::WaveformError),
}

/// Main configuration struct for the chamber, serial link, waveform and control loop.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub chamber: ChamberConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub waveform: WaveformOptions,
    #[serde(default)]
    pub control: ControlConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    #[default]
    Sim,
    Espec,
}

/// Which chamber to drive.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ChamberConfig {
    #[serde(default)]
    pub driver: DriverKind,
    /// Serial device, e.g. `/dev/ttyUSB0` or `COM7`.
    #[serde(default)]
    pub interface: Option<String>,
}

/// Control loop pacing.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ControlConfig {
    #[serde(default = "default_cadence")]
    pub cadence: TimeSpec,
    #[serde(default)]
    pub duration: Option<TimeSpec>,
    #[serde(default)]
    pub cycles: Option<u32>,
    #[serde(default)]
    pub start_temp: Option<f64>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            cadence: default_cadence(),
            duration: None,
            cycles: None,
            start_temp: None,
        }
    }
}

fn default_cadence() -> TimeSpec {
    TimeSpec::from_secs(60.0).unwrap_or_default()
}

impl Config {
    /// Build the validated waveform.
    pub fn waveform(&self) -> Result<WaveformConfig, ConfigError> {
        Ok(self.waveform.build()?)
    }

    /// Control loop options for `waveform`.
    ///
    /// `cycles` converts to a duration of whole waveform periods. When both are
    /// given the shorter one wins.
    pub fn run_options(&self, waveform: &WaveformConfig) -> Result<RunOptions, ConfigError> {
        let control = &self.control;
        let cadence = control.cadence.as_duration();
        if cadence.is_zero() {
            return Err(ConfigError::Invalid(format!(
                "cadence {} is too short",
                control.cadence
            )));
        }

        let by_cycles = match control.cycles {
            Some(cycles) => {
                let period = waveform.period();
                if period <= 0.0 {
                    return Err(ConfigError::Invalid(
                        "cycles need a periodic waveform".to_string(),
                    ));
                }
                let total = Duration::try_from_secs_f64(period * cycles as f64).map_err(|_| {
                    ConfigError::Invalid(format!(
                        "{} cycles of {} secs are out of range",
                        cycles, period
                    ))
                })?;
                Some(total)
            }
            None => None,
        };
        let duration = match (control.duration.map(|d| d.as_duration()), by_cycles) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let interface = match self.chamber.driver {
            DriverKind::Sim => None,
            DriverKind::Espec => self.chamber.interface.clone(),
        };

        Ok(RunOptions {
            interface,
            cadence,
            duration,
            start_temp: control.start_temp,
        })
    }
}

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}
