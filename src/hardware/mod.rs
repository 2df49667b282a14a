// src/hardware/mod.rs - Chamber abstraction shared by the simulator and real drivers
pub mod espec;
pub mod serial;
pub mod simulated;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChamberError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Timeout after {0:?} waiting for chamber response")]
    Timeout(std::time::Duration),
    #[error("Chamber interface not open")]
    NotOpen,
    #[error("Chamber '{0}' unknown")]
    UnknownChamber(String),
    #[error("Chamber reported error '{0}'")]
    ErrorResponse(String),
    #[error("Malformed chamber response '{0}'")]
    Malformed(String),
    #[error("Expected {expected} fields in response '{response}'")]
    FieldCount { expected: usize, response: String },
    #[error("Chamber rejected {parameter}: status '{status}'")]
    Rejected { parameter: String, status: String },
    #[error("Response for '{received}' while setting '{expected}'")]
    WrongParameter { expected: String, received: String },
    #[error("Chamber did not acknowledge {parameter}: set='{requested}' ack='{acknowledged}'")]
    ValueMismatch {
        parameter: String,
        requested: String,
        acknowledged: String,
    },
    #[error("No temperature set value provided")]
    MissingTemperature,
}

/// Fractional digits the chamber resolves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fracs {
    pub temperature: u8,
    pub humidity: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureRating {
    pub min: f64,
    pub max: f64,
    pub unit: &'static str,
}

/// Allowed change rate; `fall` is negative.
#[derive(Debug, Clone, PartialEq)]
pub struct SlewRate {
    pub rise: f64,
    pub fall: f64,
    pub unit: &'static str,
}

/// Static capabilities of a chamber.
#[derive(Debug, Clone, PartialEq)]
pub struct ChamberInfo {
    pub name: String,
    pub fracs: Fracs,
    pub temperature: TemperatureRating,
    pub slew_rate: SlewRate,
}

/// Measured or commanded climate.
///
/// `temperature` is optional so a set request without one can be rejected.
/// `humidity` is `NaN` when the chamber does not support it.
#[derive(Debug, Clone, Copy)]
pub struct ClimaState {
    pub temperature: Option<f64>,
    pub humidity: f64,
}

impl ClimaState {
    pub fn with_temperature(temperature: f64) -> Self {
        Self {
            temperature: Some(temperature),
            humidity: f64::NAN,
        }
    }
}

impl Default for ClimaState {
    fn default() -> Self {
        Self {
            temperature: None,
            humidity: f64::NAN,
        }
    }
}

/// Uniform control contract for climate chambers.
///
/// Every operation is used through `&mut self`, so a second command can never be
/// issued while a response is still being read.
#[async_trait]
pub trait Chamber: Send {
    /// Establish the control channel. `interface` overrides the configured one.
    async fn open(&mut self, interface: Option<&str>) -> Result<(), ChamberError>;
    async fn close(&mut self) -> Result<(), ChamberError>;
    /// Enter active control, optionally at `temperature`.
    async fn start(&mut self, temperature: Option<f64>) -> Result<(), ChamberError>;
    /// Setpoint `start(temperature)` commands, if it commands one.
    fn start_temperature(&self, temperature: Option<f64>) -> Option<f64> {
        temperature
    }
    /// Return to standby.
    async fn stop(&mut self) -> Result<(), ChamberError>;
    /// Callable at any time, including before `open`.
    fn info(&self) -> ChamberInfo;
    async fn get_clima(&mut self) -> Result<ClimaState, ChamberError>;
    async fn set_clima(&mut self, clima: &ClimaState) -> Result<(), ChamberError>;
}
