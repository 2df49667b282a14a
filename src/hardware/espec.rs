// src/hardware/espec.rs - ESPEC SH-641 climate chamber over its serial command protocol
//!
//! Every request is one ASCII line, every answer one line, both ended by CR LF.
//!
//! | request          | answer                          |
//! |------------------|---------------------------------|
//! | `TYPE?`          | `<controller>,SH-641,...`       |
//! | `TEMP?`          | `measured,setpoint,upper,lower` |
//! | `TEMP,S25.0`     | `OK:TEMP,S25.0`                 |
//! | `POWER,ON`       | `OK:POWER,ON`                   |
//! | `MODE,STANDBY`   | `OK:MODE,STANDBY`               |
//!
//! A failing request is answered with `NA:CMD ERR` or `NA:PARA ERR`.

use super::serial::{Connect, LineLink, SerialConfig, SerialConnector, SerialStats};
use super::{Chamber, ChamberError, ChamberInfo, ClimaState, Fracs, SlewRate, TemperatureRating};
use async_trait::async_trait;
use std::fmt;

pub const LINE_END: &str = "\r\n";
pub const ERR_COMMAND: &str = "CMD ERR";
pub const ERR_PARAMETER: &str = "PARA ERR";
pub const RSP_OK: &str = "OK";
/// Token the type query answer must contain.
pub const CHAMBER_ID: &str = "SH-641";

pub const CMD_GET_TYPE: &str = "TYPE?";
pub const CMD_GET_TEMP: &str = "TEMP?";
pub const CMD_SET_TEMP: &str = "TEMP,S";
pub const CMD_SET_POWER: &str = "POWER,";
pub const CMD_SET_MODE: &str = "MODE,";

/// Smallest temperature step the chamber acknowledges.
pub const TEMP_RESOLUTION: f64 = 0.1;
/// Digits after the decimal point matching `TEMP_RESOLUTION`.
pub const TEMP_FRACS: usize = 1;
/// Setpoint used while starting and stopping.
pub const SAFE_TEMPERATURE: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Power {
    On,
    Off,
}

impl Power {
    pub fn as_str(&self) -> &'static str {
        match self {
            Power::On => "ON",
            Power::Off => "OFF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Constant,
    Standby,
    Off,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Constant => "CONSTANT",
            Mode::Standby => "STANDBY",
            Mode::Off => "OFF",
        }
    }
}

/// Parsed acknowledgment of a set command, e.g. `OK:TEMP,S25.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetResponse {
    pub status: String,
    pub parameter: String,
    /// Value fields joined with `,`.
    pub value: String,
}

impl SetResponse {
    pub fn parse(msg: &str) -> Result<Self, ChamberError> {
        let (status, payload) = msg
            .split_once(':')
            .ok_or_else(|| ChamberError::Malformed(msg.to_string()))?;
        let mut fields = payload.split(',');
        let parameter = fields.next().unwrap_or_default();
        if parameter.is_empty() {
            return Err(ChamberError::Malformed(msg.to_string()));
        }
        let value = fields.collect::<Vec<_>>().join(",");
        Ok(Self {
            status: status.trim().to_string(),
            parameter: parameter.trim().to_string(),
            value: value.trim().to_string(),
        })
    }

    /// Check status and parameter class, hand back the value.
    fn into_value(self, parameter: &str) -> Result<String, ChamberError> {
        if self.status != RSP_OK {
            tracing::error!("Chamber rejected {}: {:?}", parameter, self);
            return Err(ChamberError::Rejected {
                parameter: parameter.to_string(),
                status: self.status,
            });
        }
        if self.parameter != parameter {
            tracing::error!("Response type '{}' while setting '{}'", self.parameter, parameter);
            return Err(ChamberError::WrongParameter {
                expected: parameter.to_string(),
                received: self.parameter,
            });
        }
        Ok(self.value)
    }
}

/// Answer of `TEMP?`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureReading {
    pub measured: f64,
    pub setpoint: f64,
    pub upper_alarm: f64,
    pub lower_alarm: f64,
}

impl TemperatureReading {
    pub fn parse(msg: &str) -> Result<Self, ChamberError> {
        let fields: Vec<&str> = msg.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            tracing::error!("Uncomplete Temperature Response '{}'", msg);
            return Err(ChamberError::FieldCount {
                expected: 4,
                response: msg.to_string(),
            });
        }
        let mut values = [0.0; 4];
        for (slot, field) in values.iter_mut().zip(&fields) {
            *slot = field
                .parse()
                .map_err(|_| ChamberError::Malformed(msg.to_string()))?;
        }
        Ok(Self {
            measured: values[0],
            setpoint: values[1],
            upper_alarm: values[2],
            lower_alarm: values[3],
        })
    }
}

/// Both error tokens mark a refused request.
fn check_error(msg: &str) -> Result<(), ChamberError> {
    if msg.contains(ERR_COMMAND) || msg.contains(ERR_PARAMETER) {
        tracing::error!("Error: Chamber Reponse '{}'", msg);
        return Err(ChamberError::ErrorResponse(msg.to_string()));
    }
    Ok(())
}

/// Parameter class of a set command, `"POWER,"` -> `"POWER"`.
fn class_of(command: &str) -> &str {
    command.split(',').next().unwrap_or(command)
}

fn format_temp(temperature: f64) -> String {
    format!("{:.*}", TEMP_FRACS, temperature)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Idle,
    Running,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Closed => "closed",
            State::Idle => "idle",
            State::Running => "running",
        };
        f.write_str(s)
    }
}

/// Driver for the ESPEC SH-641.
pub struct EspecChamber<C: Connect = SerialConnector> {
    config: SerialConfig,
    connector: C,
    link: Option<LineLink<C::Port>>,
    state: State,
    /// Last temperature the chamber acknowledged, `None` until the first write.
    last_write_temp: Option<f64>,
}

impl EspecChamber<SerialConnector> {
    pub fn new(config: SerialConfig) -> Self {
        Self::with_connector(config, SerialConnector)
    }
}

impl<C: Connect> EspecChamber<C> {
    pub fn with_connector(config: SerialConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            link: None,
            state: State::Closed,
            last_write_temp: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state != State::Closed
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    pub fn stats(&self) -> Option<&SerialStats> {
        self.link.as_ref().map(|l| l.stats())
    }

    /// Send one request and return its error checked answer.
    async fn request(&mut self, command: &str) -> Result<String, ChamberError> {
        let link = self.link.as_mut().ok_or(ChamberError::NotOpen)?;
        link.write_line(command).await?;
        let msg = link.read_line().await?;
        check_error(&msg)?;
        Ok(msg)
    }

    fn ensure_open(&self) -> Result<(), ChamberError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ChamberError::NotOpen)
        }
    }

    pub async fn get_temp(&mut self) -> Result<TemperatureReading, ChamberError> {
        self.ensure_open()?;
        let msg = self.request(CMD_GET_TEMP).await?;
        TemperatureReading::parse(&msg)
    }

    /// Set a new temperature.
    ///
    /// Requests that format to the last acknowledged value at `TEMP_RESOLUTION`
    /// are not sent.
    pub async fn set_temp(&mut self, temperature: f64) -> Result<(), ChamberError> {
        self.ensure_open()?;
        let requested = format_temp(temperature);
        if let Some(last) = self.last_write_temp {
            if format_temp(last) == requested {
                tracing::trace!("Skip temperature write {} (last {})", temperature, last);
                return Ok(());
            }
        }

        let msg = self.request(&format!("{}{}", CMD_SET_TEMP, requested)).await?;
        let value = SetResponse::parse(&msg)?.into_value(class_of(CMD_SET_TEMP))?;
        // S25.0 -> 25.0
        let acknowledged = value
            .strip_prefix('S')
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(format_temp)
            .ok_or_else(|| ChamberError::Malformed(msg.clone()))?;
        if acknowledged != requested {
            tracing::error!(
                "Chamber not acknowledge new temperature set={} ack={}",
                requested,
                acknowledged
            );
            return Err(ChamberError::ValueMismatch {
                parameter: class_of(CMD_SET_TEMP).to_string(),
                requested,
                acknowledged,
            });
        }
        self.last_write_temp = Some(temperature);
        Ok(())
    }

    async fn set_enum(&mut self, command: &str, value: &str) -> Result<(), ChamberError> {
        self.ensure_open()?;
        let msg = self.request(&format!("{}{}", command, value)).await?;
        let acknowledged = SetResponse::parse(&msg)?.into_value(class_of(command))?;
        if acknowledged != value {
            tracing::error!("Setting failed, set='{}' ack='{}'", value, acknowledged);
            return Err(ChamberError::ValueMismatch {
                parameter: class_of(command).to_string(),
                requested: value.to_string(),
                acknowledged,
            });
        }
        Ok(())
    }

    pub async fn set_power(&mut self, power: Power) -> Result<(), ChamberError> {
        self.set_enum(CMD_SET_POWER, power.as_str()).await
    }

    pub async fn set_mode(&mut self, mode: Mode) -> Result<(), ChamberError> {
        self.set_enum(CMD_SET_MODE, mode.as_str()).await
    }
}

#[async_trait]
impl<C: Connect> Chamber for EspecChamber<C> {
    async fn open(&mut self, interface: Option<&str>) -> Result<(), ChamberError> {
        if self.is_open() {
            return Err(ChamberError::Configuration("chamber already open".to_string()));
        }
        if let Some(interface) = interface {
            self.config.port_name = interface.to_string();
        }
        self.config.validate()?;

        let port = self.connector.connect(&self.config)?;
        self.link = Some(LineLink::new(port, LINE_END, self.config.read_timeout()));

        let identity = match self.request(CMD_GET_TYPE).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::error!("Error: {} failed: {}", CMD_GET_TYPE, e);
                self.link = None;
                return Err(e);
            }
        };
        if !identity.contains(CHAMBER_ID) {
            tracing::error!("Error: Chamber '{}' unknown", identity);
            self.link = None;
            return Err(ChamberError::UnknownChamber(identity));
        }

        self.last_write_temp = None;
        self.state = State::Idle;
        tracing::info!("Chamber '{}' on {} is {}", identity, self.config.port_name, self.state);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ChamberError> {
        self.ensure_open()?;
        self.link = None;
        self.state = State::Closed;
        self.last_write_temp = None;
        tracing::info!("Chamber on {} is {}", self.config.port_name, self.state);
        Ok(())
    }

    async fn start(&mut self, temperature: Option<f64>) -> Result<(), ChamberError> {
        self.ensure_open()?;
        self.set_temp(temperature.unwrap_or(SAFE_TEMPERATURE)).await?;
        self.set_power(Power::On).await?;
        self.set_mode(Mode::Constant).await?;
        self.state = State::Running;
        tracing::info!("Chamber is {}", self.state);
        Ok(())
    }

    fn start_temperature(&self, temperature: Option<f64>) -> Option<f64> {
        Some(temperature.unwrap_or(SAFE_TEMPERATURE))
    }

    async fn stop(&mut self) -> Result<(), ChamberError> {
        self.ensure_open()?;
        self.set_temp(SAFE_TEMPERATURE).await?;
        self.set_mode(Mode::Standby).await?;
        self.set_power(Power::Off).await?;
        self.state = State::Idle;
        tracing::info!("Chamber is {}", self.state);
        Ok(())
    }

    fn info(&self) -> ChamberInfo {
        ChamberInfo {
            name: "ESPEC SH-641".to_string(),
            fracs: Fracs {
                temperature: TEMP_FRACS as u8,
                humidity: 0,
            },
            temperature: TemperatureRating {
                min: -40.0,
                max: 150.0,
                unit: "c",
            },
            slew_rate: SlewRate {
                rise: 2.0,
                fall: -1.0,
                unit: "c/min",
            },
        }
    }

    async fn get_clima(&mut self) -> Result<ClimaState, ChamberError> {
        let reading = self.get_temp().await?;
        Ok(ClimaState::with_temperature(reading.measured))
    }

    async fn set_clima(&mut self, clima: &ClimaState) -> Result<(), ChamberError> {
        let temperature = clima.temperature.ok_or(ChamberError::MissingTemperature)?;
        self.set_temp(temperature).await
    }
}

impl<C: Connect> fmt::Debug for EspecChamber<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EspecChamber")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("last_write_temp", &self.last_write_temp)
            .finish()
    }
}
