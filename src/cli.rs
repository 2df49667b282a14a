// src/cli.rs - Command line options
use crate::config::{Config, DriverKind};
use crate::scheduler::{TimeSpec, WaveformKind, WaveformOptions};
use clap::{ArgGroup, Parser};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "atwg",
    version,
    about = "Arbitrary temperature waveform generator for climate chambers"
)]
#[command(group(ArgGroup::new("shape").args(["sine", "trapezoid", "constant"])))]
pub struct Cli {
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<String>,

    /// Run against the simulated chamber
    #[arg(long, conflicts_with = "port")]
    pub sim: bool,

    /// Serial port of the chamber (selects the ESPEC driver)
    #[arg(long)]
    pub port: Option<String>,

    #[arg(long)]
    pub baud: Option<u32>,

    /// Sine between minTemp and maxTemp
    #[arg(long)]
    pub sine: bool,

    /// Rise, hold, fall, hold between minTemp and maxTemp
    #[arg(long)]
    pub trapezoid: bool,

    /// Hold maxTemp
    #[arg(long = "const")]
    pub constant: bool,

    /// Lower temperature, e.g. 5C
    #[arg(long = "minTemp", allow_hyphen_values = true)]
    pub min_temp: Option<String>,

    /// Upper temperature, e.g. 40C
    #[arg(long = "maxTemp", allow_hyphen_values = true)]
    pub max_temp: Option<String>,

    /// Time from minTemp to maxTemp, e.g. 2h or 1:30:00
    #[arg(long = "riseTime")]
    pub rise_time: Option<TimeSpec>,

    /// Dwell at each trapezoid plateau
    #[arg(long = "holdTime")]
    pub hold_time: Option<TimeSpec>,

    /// Sine period
    #[arg(long)]
    pub period: Option<TimeSpec>,

    /// Time per degree, e.g. 2min/K; used when riseTime is absent
    #[arg(long)]
    pub gradient: Option<String>,

    /// Time between setpoint updates
    #[arg(long)]
    pub cadence: Option<TimeSpec>,

    /// Total run time
    #[arg(long)]
    pub duration: Option<TimeSpec>,

    /// Number of waveform periods to run
    #[arg(long)]
    pub cycles: Option<u32>,

    /// More output, repeat for trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    fn shape(&self) -> Option<WaveformKind> {
        if self.sine {
            Some(WaveformKind::Sine)
        } else if self.trapezoid {
            Some(WaveformKind::Trapezoid)
        } else if self.constant {
            Some(WaveformKind::Constant)
        } else {
            None
        }
    }

    pub fn waveform_options(&self) -> WaveformOptions {
        WaveformOptions {
            shape: self.shape(),
            min_temp: self.min_temp.clone(),
            max_temp: self.max_temp.clone(),
            rise_time: self.rise_time,
            hold_time: self.hold_time,
            period: self.period,
            gradient: self.gradient.clone(),
        }
    }

    /// Overlay command line options on `config`.
    pub fn apply(&self, config: &mut Config) {
        if self.sim {
            config.chamber.driver = DriverKind::Sim;
        }
        if let Some(port) = &self.port {
            config.chamber.driver = DriverKind::Espec;
            config.chamber.interface = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        config.waveform.merge(self.waveform_options());
        if let Some(cadence) = self.cadence {
            config.control.cadence = cadence;
        }
        if self.duration.is_some() {
            config.control.duration = self.duration;
        }
        if self.cycles.is_some() {
            config.control.cycles = self.cycles;
        }
    }

    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            return tracing::Level::WARN;
        }
        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
