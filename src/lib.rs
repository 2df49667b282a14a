//! Arbitrary temperature waveform generator.
//!
//! Drives a climate chamber, real or simulated, along a time varying setpoint
//! waveform while honoring the chamber's resolution and slew rate.

pub mod cli;
pub mod config;
pub mod control;
pub mod hardware;
pub mod scheduler;

pub use hardware::{Chamber, ChamberError, ChamberInfo, ClimaState};
pub use scheduler::{TimeSpec, WaveformConfig, WaveformEngine};
