// src/scheduler/waveform.rs - Setpoint generation over elapsed time
use crate::hardware::ChamberInfo;
use crate::scheduler::timespec::{SECS_PER_MINUTE, TimeSpec, TimeSpecError, parse_seconds};
use serde::{Deserialize, Deserializer, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WaveformError {
    #[error(transparent)]
    TimeSpec(#[from] TimeSpecError),
    #[error("min_temp {min} is above max_temp {max}")]
    InvertedRange { min: f64, max: f64 },
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("Missing waveform parameter '{0}'")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformKind {
    #[default]
    Constant,
    Sine,
    Trapezoid,
}

/// Validated waveform parameters, fixed for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformConfig {
    pub kind: WaveformKind,
    pub min_temp: f64,
    pub max_temp: f64,
    /// Seconds from `min_temp` to `max_temp`.
    pub rise_time: f64,
    /// Dwell at each plateau of a trapezoid.
    pub hold_time: f64,
    /// Full period of a sine. Defaults to twice the rise time.
    pub period: Option<f64>,
}

impl WaveformConfig {
    /// Constant setpoint at `temperature`.
    pub fn constant(temperature: f64) -> Self {
        Self {
            kind: WaveformKind::Constant,
            min_temp: temperature,
            max_temp: temperature,
            rise_time: 0.0,
            hold_time: 0.0,
            period: None,
        }
    }

    pub fn validate(&self) -> Result<(), WaveformError> {
        if self.min_temp > self.max_temp {
            return Err(WaveformError::InvertedRange {
                min: self.min_temp,
                max: self.max_temp,
            });
        }
        if self.hold_time < 0.0 {
            return Err(WaveformError::TimeSpec(TimeSpecError::Negative(self.hold_time)));
        }
        match self.kind {
            WaveformKind::Constant => {}
            WaveformKind::Sine => {
                if self.period() <= 0.0 {
                    return Err(WaveformError::NotPositive("period"));
                }
            }
            WaveformKind::Trapezoid => {
                if self.rise_time <= 0.0 {
                    return Err(WaveformError::NotPositive("rise_time"));
                }
            }
        }
        Ok(())
    }

    /// Length of one waveform cycle in seconds; zero for a constant.
    pub fn period(&self) -> f64 {
        match self.kind {
            WaveformKind::Constant => 0.0,
            WaveformKind::Sine => self.period.unwrap_or(2.0 * self.rise_time),
            WaveformKind::Trapezoid => 2.0 * (self.rise_time + self.hold_time),
        }
    }

    /// Steepest slope of the waveform in degrees per minute.
    pub fn max_slope(&self) -> f64 {
        let amplitude = self.max_temp - self.min_temp;
        let per_sec = match self.kind {
            WaveformKind::Constant => 0.0,
            WaveformKind::Sine => {
                let period = self.period();
                if period > 0.0 {
                    PI * amplitude / period
                } else {
                    0.0
                }
            }
            WaveformKind::Trapezoid => {
                if self.rise_time > 0.0 {
                    amplitude / self.rise_time
                } else {
                    0.0
                }
            }
        };
        per_sec * SECS_PER_MINUTE
    }

    /// Unclamped, unpaced target at `elapsed` seconds.
    pub fn profile(&self, elapsed: f64) -> f64 {
        let elapsed = elapsed.max(0.0);
        let amplitude = self.max_temp - self.min_temp;
        match self.kind {
            WaveformKind::Constant => self.max_temp,
            WaveformKind::Sine => {
                let period = self.period();
                let phase = 2.0 * PI * elapsed / period;
                // starts at min_temp
                self.min_temp + amplitude * (1.0 - phase.cos()) / 2.0
            }
            WaveformKind::Trapezoid => {
                let t = elapsed % self.period();
                let rise = self.rise_time;
                let hold = self.hold_time;
                if t < rise {
                    self.min_temp + amplitude * t / rise
                } else if t < rise + hold {
                    self.max_temp
                } else if t < 2.0 * rise + hold {
                    self.max_temp - amplitude * (t - rise - hold) / rise
                } else {
                    self.min_temp
                }
            }
        }
    }
}

/// Seconds needed to traverse `delta_temp` at `gradient` (time per degree).
///
/// The gradient may carry a per-degree suffix (`"5min/K"`). Without a delta a
/// single degree is assumed.
pub fn gradient_to_time(
    gradient: Option<&str>,
    delta_temp: Option<f64>,
) -> Result<f64, TimeSpecError> {
    let gradient = gradient.ok_or(TimeSpecError::MissingGradient)?;
    let per_degree = match gradient.trim().split_once('/') {
        Some((time, unit)) => {
            if !matches!(unit.trim(), "K" | "k" | "C" | "c") {
                return Err(TimeSpecError::Syntax(gradient.to_string()));
            }
            parse_seconds(time)?
        }
        None => parse_seconds(gradient)?,
    };
    Ok(per_degree * delta_temp.unwrap_or(1.0).abs())
}

/// Raw waveform options as they come from the command line or config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WaveformOptions {
    pub shape: Option<WaveformKind>,
    #[serde(deserialize_with = "number_or_text")]
    pub min_temp: Option<String>,
    #[serde(deserialize_with = "number_or_text")]
    pub max_temp: Option<String>,
    pub rise_time: Option<TimeSpec>,
    pub hold_time: Option<TimeSpec>,
    pub period: Option<TimeSpec>,
    #[serde(deserialize_with = "number_or_text")]
    pub gradient: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumberOrText {
    Number(f64),
    Text(String),
}

// `max_temp = 10` and `max_temp = "10C"` are both accepted, likewise `gradient`
fn number_or_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawNumberOrText>::deserialize(deserializer)?.map(|raw| match raw {
        RawNumberOrText::Number(value) => value.to_string(),
        RawNumberOrText::Text(text) => text,
    }))
}

impl WaveformOptions {
    /// Overlay every option set in `other`.
    pub fn merge(&mut self, other: WaveformOptions) {
        if other.shape.is_some() {
            self.shape = other.shape;
        }
        if other.min_temp.is_some() {
            self.min_temp = other.min_temp;
        }
        if other.max_temp.is_some() {
            self.max_temp = other.max_temp;
        }
        if other.rise_time.is_some() {
            self.rise_time = other.rise_time;
        }
        if other.hold_time.is_some() {
            self.hold_time = other.hold_time;
        }
        if other.period.is_some() {
            self.period = other.period;
        }
        if other.gradient.is_some() {
            self.gradient = other.gradient;
        }
    }

    pub fn build(&self) -> Result<WaveformConfig, WaveformError> {
        use crate::scheduler::timespec::parse_temperature;

        let kind = self.shape.unwrap_or_default();
        let min_temp = self.min_temp.as_deref().map(parse_temperature).transpose()?;
        let max_temp = self.max_temp.as_deref().map(parse_temperature).transpose()?;

        let config = match kind {
            WaveformKind::Constant => {
                let temperature = max_temp.or(min_temp).ok_or(WaveformError::Missing("max_temp"))?;
                WaveformConfig::constant(temperature)
            }
            WaveformKind::Sine | WaveformKind::Trapezoid => {
                let min_temp = min_temp.ok_or(WaveformError::Missing("min_temp"))?;
                let max_temp = max_temp.ok_or(WaveformError::Missing("max_temp"))?;
                let rise_time = match (&self.rise_time, &self.gradient) {
                    (Some(rise), _) => rise.as_secs(),
                    (None, Some(gradient)) => {
                        gradient_to_time(Some(gradient), Some(max_temp - min_temp))?
                    }
                    (None, None) if kind == WaveformKind::Sine && self.period.is_some() => 0.0,
                    (None, None) => return Err(WaveformError::Missing("rise_time")),
                };
                WaveformConfig {
                    kind,
                    min_temp,
                    max_temp,
                    rise_time,
                    hold_time: self.hold_time.map(|t| t.as_secs()).unwrap_or(0.0),
                    period: self.period.map(|t| t.as_secs()),
                }
            }
        };
        config.validate()?;
        Ok(config)
    }
}

/// Slack for values that land a hair below a resolution step.
const GRID_EPSILON: f64 = 1e-9;

/// Turns elapsed run time into setpoints the chamber can follow.
///
/// Pacing runs on the unrounded value; only the emitted setpoint is snapped to
/// the chamber resolution, always toward the previous setpoint. Over any time
/// window the emitted setpoints thus never change by more than the slew rate
/// allows, rounded down to whole resolution steps.
#[derive(Debug, Clone)]
pub struct WaveformEngine {
    config: WaveformConfig,
    info: ChamberInfo,
    /// (elapsed, paced value before rounding)
    paced: Option<(f64, f64)>,
    emitted: Option<f64>,
}

impl WaveformEngine {
    pub fn new(config: WaveformConfig, info: ChamberInfo) -> Self {
        let slope = config.max_slope();
        let limit = info.slew_rate.rise.min(-info.slew_rate.fall);
        if slope > limit {
            tracing::warn!(
                "Waveform slope {:.3} {} exceeds chamber '{}' slew rate {:.3}, setpoints will lag",
                slope,
                info.slew_rate.unit,
                info.name,
                limit
            );
        }
        Self {
            config,
            info,
            paced: None,
            emitted: None,
        }
    }

    pub fn config(&self) -> &WaveformConfig {
        &self.config
    }

    fn scale(&self) -> f64 {
        10f64.powi(self.info.fracs.temperature as i32)
    }

    /// Snap `value` onto the resolution grid, never overshooting it when
    /// moving away from `previous`.
    fn snap(&self, value: f64, previous: Option<f64>) -> f64 {
        let scale = self.scale();
        let steps = match previous {
            Some(prev) if value > prev => (value * scale + GRID_EPSILON).floor(),
            Some(prev) if value < prev => (value * scale - GRID_EPSILON).ceil(),
            Some(prev) => (prev * scale).round(),
            None => (value * scale).round(),
        };
        let rating = &self.info.temperature;
        (steps / scale).clamp(rating.min, rating.max)
    }

    /// Setpoint for `elapsed` seconds since the waveform started.
    pub fn setpoint(&mut self, elapsed: f64) -> f64 {
        let rating = &self.info.temperature;
        let mut target = self.config.profile(elapsed).clamp(rating.min, rating.max);

        if let Some((prev_elapsed, prev)) = self.paced {
            let minutes = (elapsed - prev_elapsed).max(0.0) / SECS_PER_MINUTE;
            let max_up = self.info.slew_rate.rise * minutes;
            let max_down = self.info.slew_rate.fall * minutes;
            let delta = target - prev;
            if delta > max_up {
                target = prev + max_up;
            } else if delta < max_down {
                target = prev + max_down;
            }
        }
        self.paced = Some((elapsed, target));

        let setpoint = self.snap(target, self.emitted);
        self.emitted = Some(setpoint);
        setpoint
    }

    /// Forget pacing history; the next setpoint follows the waveform directly.
    pub fn reset(&mut self) {
        self.paced = None;
        self.emitted = None;
    }

    /// Restart pacing from `setpoint`, as if it had been emitted at `elapsed`.
    pub fn reset_at(&mut self, elapsed: f64, setpoint: f64) {
        self.paced = Some((elapsed, setpoint));
        self.emitted = Some(self.snap(setpoint, None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Chamber;
    use crate::hardware::espec::EspecChamber;
    use crate::hardware::serial::SerialConfig;
    use crate::hardware::simulated::SimChamber;

    fn sine(min: f64, max: f64, rise: f64) -> WaveformConfig {
        WaveformConfig {
            kind: WaveformKind::Sine,
            min_temp: min,
            max_temp: max,
            rise_time: rise,
            hold_time: 0.0,
            period: None,
        }
    }

    #[test]
    fn test_gradient_to_time() {
        assert_eq!(gradient_to_time(Some("5sec"), None).unwrap(), 5.0);
        assert_eq!(gradient_to_time(Some("1min/K"), Some(-10.0)).unwrap(), 600.0);
        assert_eq!(gradient_to_time(None, Some(3.0)), Err(TimeSpecError::MissingGradient));
        assert!(gradient_to_time(Some("1min/F"), None).is_err());
    }

    #[test]
    fn test_sine_profile() {
        let wave = sine(5.0, 10.0, 300.0);
        assert_eq!(wave.period(), 600.0);
        assert!((wave.profile(0.0) - 5.0).abs() < 1e-9);
        assert!((wave.profile(300.0) - 10.0).abs() < 1e-9);
        assert!((wave.profile(150.0) - 7.5).abs() < 1e-9);
        assert!((wave.profile(600.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_trapezoid_profile() {
        let wave = WaveformConfig {
            kind: WaveformKind::Trapezoid,
            min_temp: 0.0,
            max_temp: 100.0,
            rise_time: 100.0,
            hold_time: 50.0,
            period: None,
        };
        assert_eq!(wave.period(), 300.0);
        assert_eq!(wave.profile(50.0), 50.0);
        assert_eq!(wave.profile(120.0), 100.0);
        assert_eq!(wave.profile(200.0), 50.0);
        assert_eq!(wave.profile(280.0), 0.0);
        assert_eq!(wave.profile(350.0), 50.0);
    }

    #[test]
    fn test_engine_respects_slew_rate_and_rating() {
        let mut info = SimChamber::new().info();
        info.slew_rate.rise = 1.0;
        info.slew_rate.fall = -2.0;
        info.temperature.max = 50.0;
        let mut engine = WaveformEngine::new(WaveformConfig::constant(80.0), info);
        assert_eq!(engine.setpoint(0.0), 50.0);

        let mut info = SimChamber::new().info();
        info.slew_rate.rise = 1.0;
        info.slew_rate.fall = -2.0;
        let mut engine = WaveformEngine::new(sine(20.0, 60.0, 60.0), info);
        assert_eq!(engine.setpoint(0.0), 20.0);
        // one minute later the sine is at 60, the chamber may only rise 1 degree
        assert_eq!(engine.setpoint(60.0), 21.0);
        assert_eq!(engine.setpoint(90.0), 21.5);
    }

    /// Setpoints at `cadence` seconds up to `end`, as (elapsed, setpoint).
    fn drive(engine: &mut WaveformEngine, cadence: u32, end: u32) -> Vec<(f64, f64)> {
        (0..=end)
            .step_by(cadence as usize)
            .map(|t| (t as f64, engine.setpoint(t as f64)))
            .collect()
    }

    /// Largest change over any one minute window.
    fn worst_minute(points: &[(f64, f64)]) -> f64 {
        let mut worst: f64 = 0.0;
        for (i, &(t0, sp0)) in points.iter().enumerate() {
            for &(t1, sp1) in &points[i + 1..] {
                if t1 - t0 > SECS_PER_MINUTE {
                    break;
                }
                worst = worst.max((sp1 - sp0).abs());
            }
        }
        worst
    }

    #[test]
    fn test_engine_keeps_pace_below_resolution() {
        let info = EspecChamber::new(SerialConfig::default()).info();
        let slow = sine(20.0, 60.0, 3600.0);
        for cadence in [1, 2] {
            let mut engine = WaveformEngine::new(slow.clone(), info.clone());
            let points = drive(&mut engine, cadence, 1200);
            let (_, at_600) = points[600 / cadence as usize];
            assert!(
                (at_600 - slow.profile(600.0)).abs() < 0.1 + 1e-9,
                "cadence {}: {} vs {}",
                cadence,
                at_600,
                slow.profile(600.0)
            );
            assert!(worst_minute(&points) <= info.slew_rate.rise + 1e-9);
        }
    }

    #[test]
    fn test_engine_limits_rate_at_fine_cadence() {
        let info = EspecChamber::new(SerialConfig::default()).info();
        let steep = WaveformConfig {
            kind: WaveformKind::Trapezoid,
            min_temp: 20.0,
            max_temp: 100.0,
            rise_time: 60.0,
            hold_time: 3600.0,
            period: None,
        };
        for cadence in [1, 2, 5] {
            let mut engine = WaveformEngine::new(steep.clone(), info.clone());
            let points = drive(&mut engine, cadence, 1200);
            // rise limited to 2 c/min: 40 C after 20 minutes
            let (_, last) = points[points.len() - 1];
            assert!(
                last >= 60.0 - 0.1 - 1e-9 && last <= 60.0 + 1e-9,
                "cadence {}: {}",
                cadence,
                last
            );
            assert!(
                worst_minute(&points) <= info.slew_rate.rise + 1e-9,
                "cadence {}",
                cadence
            );
            for &(_, sp) in &points {
                assert!((sp * 10.0 - (sp * 10.0).round()).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_engine_falls_at_fall_rate() {
        let info = EspecChamber::new(SerialConfig::default()).info();
        let mut engine = WaveformEngine::new(WaveformConfig::constant(10.0), info.clone());
        engine.reset_at(0.0, 25.0);
        let points = drive(&mut engine, 1, 600);
        assert_eq!(points[0].1, 25.0);
        // falls 1 c/min
        let (_, after_10min) = points[600];
        assert!((after_10min - 15.0).abs() < 0.1 + 1e-9, "{}", after_10min);
        assert!(worst_minute(&points) <= -info.slew_rate.fall + 1e-9);
    }

    #[test]
    fn test_engine_rounds_to_resolution() {
        let mut info = SimChamber::new().info();
        info.fracs.temperature = 1;
        let mut engine = WaveformEngine::new(sine(0.0, 10.0, 100.0), info);
        let sp = engine.setpoint(33.0);
        assert_eq!(sp, (sp * 10.0).round() / 10.0);
    }

    #[test]
    fn test_options_build() {
        let opts = WaveformOptions {
            shape: Some(WaveformKind::Sine),
            min_temp: Some("5C".into()),
            max_temp: Some("10c".into()),
            rise_time: Some("5sec".parse().unwrap()),
            ..Default::default()
        };
        let cfg = opts.build().unwrap();
        assert_eq!(cfg.min_temp, 5.0);
        assert_eq!(cfg.max_temp, 10.0);
        assert_eq!(cfg.rise_time, 5.0);

        let from_gradient = WaveformOptions {
            shape: Some(WaveformKind::Trapezoid),
            min_temp: Some("20C".into()),
            max_temp: Some("30C".into()),
            gradient: Some("2min/K".into()),
            ..Default::default()
        };
        assert_eq!(from_gradient.build().unwrap().rise_time, 1200.0);

        let inverted = WaveformOptions {
            shape: Some(WaveformKind::Sine),
            min_temp: Some("30C".into()),
            max_temp: Some("20C".into()),
            rise_time: Some("1h".parse().unwrap()),
            ..Default::default()
        };
        assert!(matches!(inverted.build(), Err(WaveformError::InvertedRange { .. })));
    }
}
