// src/scheduler/mod.rs - Time expressions and setpoint waveforms
pub mod timespec;
pub mod waveform;

pub use timespec::{TimeSpec, TimeSpecError, format_seconds, parse_seconds, parse_temperature};
pub use waveform::{
    WaveformConfig, WaveformEngine, WaveformError, WaveformKind, WaveformOptions, gradient_to_time,
};
