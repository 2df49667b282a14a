// src/hardware/serial.rs - Serial transport and line framing for chamber protocols
use super::ChamberError;
use serde::{Deserialize, Serialize};
use serial2_tokio::{CharSize, Parity, SerialPort, Settings, StopBits};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Longest response line accepted before giving up on a frame.
const MAX_FRAME_LEN: usize = 256;

/// Serial connection configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: String,
    /// Response timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: default_port_name(),
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: "none".to_string(),
            timeout_ms: 2000,
        }
    }
}

#[cfg(windows)]
fn default_port_name() -> String {
    "COM1".to_string()
}

#[cfg(not(windows))]
fn default_port_name() -> String {
    "/dev/ttyUSB0".to_string()
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Only 8N1 and 8N2 are supported.
    pub fn validate(&self) -> Result<(), ChamberError> {
        if self.stop_bits != 1 && self.stop_bits != 2 {
            return Err(ChamberError::Configuration(format!(
                "stopbits={} unsupported",
                self.stop_bits
            )));
        }
        if !self.parity.eq_ignore_ascii_case("none") {
            return Err(ChamberError::Configuration(format!(
                "parity={} unsupported",
                self.parity
            )));
        }
        if self.data_bits != 8 {
            return Err(ChamberError::Configuration(format!(
                "databit={} unsupported",
                self.data_bits
            )));
        }
        if self.baud_rate == 0 {
            return Err(ChamberError::Configuration("baudrate must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Opens the byte stream a driver talks over.
pub trait Connect: Send {
    type Port: AsyncRead + AsyncWrite + Unpin + Send;

    fn connect(&mut self, config: &SerialConfig) -> Result<Self::Port, ChamberError>;
}

/// Opens a real serial device.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

impl Connect for SerialConnector {
    type Port = SerialPort;

    fn connect(&mut self, config: &SerialConfig) -> Result<SerialPort, ChamberError> {
        config.validate()?;
        let stop_bits = if config.stop_bits == 2 {
            StopBits::Two
        } else {
            StopBits::One
        };
        let baud_rate = config.baud_rate;
        let port = SerialPort::open(&config.port_name, move |mut settings: Settings| {
            settings.set_raw();
            settings.set_baud_rate(baud_rate)?;
            settings.set_char_size(CharSize::Bits8);
            settings.set_stop_bits(stop_bits);
            settings.set_parity(Parity::None);
            Ok(settings)
        })
        .map_err(|e| {
            tracing::error!("Failed open COM interface {}: {}", config.port_name, e);
            ChamberError::Io(e)
        })?;
        tracing::info!("Opened {} at {} baud", config.port_name, config.baud_rate);
        Ok(port)
    }
}

/// Any closure returning a port works as a connector.
impl<F, P> Connect for F
where
    F: FnMut(&SerialConfig) -> Result<P, ChamberError> + Send,
    P: AsyncRead + AsyncWrite + Unpin + Send,
{
    type Port = P;

    fn connect(&mut self, config: &SerialConfig) -> Result<P, ChamberError> {
        self(config)
    }
}

/// Serial connection statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SerialStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub commands_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
}

/// Line oriented request/response link.
pub struct LineLink<P> {
    port: P,
    terminator: &'static str,
    read_timeout: Duration,
    stats: SerialStats,
}

impl<P: AsyncRead + AsyncWrite + Unpin + Send> LineLink<P> {
    pub fn new(port: P, terminator: &'static str, read_timeout: Duration) -> Self {
        Self {
            port,
            terminator,
            read_timeout,
            stats: SerialStats::default(),
        }
    }

    /// Write `line` followed by the terminator.
    pub async fn write_line(&mut self, line: &str) -> Result<(), ChamberError> {
        let frame = format!("{}{}", line, self.terminator);
        tracing::debug!("Serial TX: {}", line);
        let result = async {
            self.port.write_all(frame.as_bytes()).await?;
            self.port.flush().await
        }
        .await;
        if let Err(e) = result {
            self.stats.errors += 1;
            tracing::error!("Serial write error: {}", e);
            return Err(ChamberError::Io(e));
        }
        self.stats.commands_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        Ok(())
    }

    /// Read bytes until the terminator, then strip it and surrounding blanks.
    pub async fn read_line(&mut self) -> Result<String, ChamberError> {
        match timeout(self.read_timeout, self.read_frame()).await {
            Ok(Ok(line)) => {
                self.stats.responses_received += 1;
                tracing::debug!("Serial RX: {}", line);
                Ok(line)
            }
            Ok(Err(e)) => {
                self.stats.errors += 1;
                tracing::error!("Serial read error: {}", e);
                Err(e)
            }
            Err(_) => {
                self.stats.timeouts += 1;
                tracing::warn!("Timeout after {:?} waiting for response", self.read_timeout);
                Err(ChamberError::Timeout(self.read_timeout))
            }
        }
    }

    async fn read_frame(&mut self) -> Result<String, ChamberError> {
        let end = self.terminator.as_bytes();
        let mut buf: Vec<u8> = Vec::with_capacity(32);
        while !buf.ends_with(end) {
            if buf.len() >= MAX_FRAME_LEN {
                return Err(ChamberError::Malformed(String::from_utf8_lossy(&buf).into_owned()));
            }
            let byte = self.port.read_u8().await?;
            self.stats.bytes_received += 1;
            buf.push(byte);
        }
        buf.truncate(buf.len() - end.len());
        let text = String::from_utf8(buf).map_err(|e| {
            ChamberError::Malformed(String::from_utf8_lossy(e.as_bytes()).into_owned())
        })?;
        Ok(text.trim().to_string())
    }

    pub fn stats(&self) -> &SerialStats {
        &self.stats
    }

    pub fn into_inner(self) -> P {
        self.port
    }
}

impl<P> std::fmt::Debug for LineLink<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineLink")
            .field("read_timeout", &self.read_timeout)
            .field("stats", &self.stats)
            .finish()
    }
}
