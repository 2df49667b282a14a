// src/control.rs - Drives a chamber along a waveform
use crate::hardware::{Chamber, ChamberError, ClimaState};
use crate::scheduler::WaveformEngine;
use crate::scheduler::format_seconds;
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to open chamber: {0}")]
    Open(#[source] ChamberError),
    #[error("Failed to start chamber: {0}")]
    Start(#[source] ChamberError),
    #[error("Failed to apply setpoint: {0}")]
    Setpoint(#[source] ChamberError),
    #[error("Failed to read clima: {0}")]
    Clima(#[source] ChamberError),
    #[error("Failed to stop chamber: {0}")]
    Stop(#[source] ChamberError),
    #[error("Failed to close chamber: {0}")]
    Close(#[source] ChamberError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Interface handed to `Chamber::open`.
    pub interface: Option<String>,
    /// Time between setpoint updates.
    pub cadence: Duration,
    /// Stop after this much run time; `None` runs until shutdown.
    pub duration: Option<Duration>,
    /// Setpoint used when starting the chamber.
    pub start_temp: Option<f64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            interface: None,
            cadence: Duration::from_secs(60),
            duration: None,
            start_temp: None,
        }
    }
}

/// Samples kept in `RunSummary`; older ones are dropped.
pub const SAMPLE_HISTORY: usize = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    Shutdown,
    Failed,
}

/// One control tick.
#[derive(Debug, Clone, Copy)]
pub struct ClimaSample {
    pub elapsed: Duration,
    pub setpoint: f64,
    pub clima: ClimaState,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub ticks: u64,
    pub last_setpoint: Option<f64>,
    pub reason: StopReason,
    /// The last `SAMPLE_HISTORY` ticks.
    pub samples: VecDeque<ClimaSample>,
}

/// Open, start, follow the waveform until `shutdown` resolves or the run
/// duration is over, then stop and close.
///
/// `shutdown` is only polled between ticks, never while a command is in flight.
pub async fn run<F>(
    chamber: &mut dyn Chamber,
    engine: &mut WaveformEngine,
    options: &RunOptions,
    shutdown: F,
) -> Result<RunSummary, RunError>
where
    F: Future<Output = ()>,
{
    let info = chamber.info();
    tracing::info!("Opening chamber '{}'", info.name);
    chamber.open(options.interface.as_deref()).await.map_err(RunError::Open)?;

    if let Err(e) = chamber.start(options.start_temp).await {
        tracing::error!("Start of '{}' failed: {}", info.name, e);
        if let Err(close_err) = chamber.close().await {
            tracing::warn!("Close after failed start: {}", close_err);
        }
        return Err(RunError::Start(e));
    }

    let mut summary = RunSummary {
        started_at: Local::now(),
        ticks: 0,
        last_setpoint: None,
        reason: StopReason::Completed,
        samples: VecDeque::with_capacity(SAMPLE_HISTORY),
    };
    tracing::info!("Run started at {}", summary.started_at.format("%Y-%m-%d %H:%M:%S"));

    match chamber.start_temperature(options.start_temp) {
        Some(temperature) => engine.reset_at(0.0, temperature),
        None => engine.reset(),
    }
    let failure = follow(chamber, engine, options, shutdown, &mut summary).await;
    if failure.is_some() {
        summary.reason = StopReason::Failed;
    }

    let stopped = chamber.stop().await;
    let closed = chamber.close().await;

    if let Some(e) = failure {
        if let Err(stop_err) = stopped {
            tracing::error!("Stop after failure: {}", stop_err);
        }
        if let Err(close_err) = closed {
            tracing::error!("Close after failure: {}", close_err);
        }
        return Err(e);
    }
    stopped.map_err(RunError::Stop)?;
    closed.map_err(RunError::Close)?;

    tracing::info!(
        "Run finished after {} ticks ({:?})",
        summary.ticks,
        summary.reason
    );
    Ok(summary)
}

async fn follow<F>(
    chamber: &mut dyn Chamber,
    engine: &mut WaveformEngine,
    options: &RunOptions,
    shutdown: F,
    summary: &mut RunSummary,
) -> Option<RunError>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let begin = Instant::now();
    let mut ticker = tokio::time::interval(options.cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested");
                summary.reason = StopReason::Shutdown;
                return None;
            }
            _ = ticker.tick() => {}
        }

        let elapsed = begin.elapsed();
        if let Some(limit) = options.duration {
            if elapsed > limit {
                summary.reason = StopReason::Completed;
                return None;
            }
        }

        let setpoint = engine.setpoint(elapsed.as_secs_f64());
        if let Err(e) = chamber.set_clima(&ClimaState::with_temperature(setpoint)).await {
            tracing::error!("Setpoint {:.2} rejected: {}", setpoint, e);
            return Some(RunError::Setpoint(e));
        }
        let clima = match chamber.get_clima().await {
            Ok(clima) => clima,
            Err(e) => {
                tracing::error!("Reading clima failed: {}", e);
                return Some(RunError::Clima(e));
            }
        };

        let stamp = format_seconds(elapsed.as_secs() as f64, None).unwrap_or_default();
        tracing::info!(
            "[{}] setpoint={:.2} measured={:.2}",
            stamp,
            setpoint,
            clima.temperature.unwrap_or(f64::NAN)
        );

        summary.ticks += 1;
        summary.last_setpoint = Some(setpoint);
        if summary.samples.len() == SAMPLE_HISTORY {
            summary.samples.pop_front();
        }
        summary.samples.push_back(ClimaSample {
            elapsed,
            setpoint,
            clima,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::simulated::SimChamber;
    use crate::scheduler::WaveformConfig;

    #[tokio::test(start_paused = true)]
    async fn test_constant_run_completes() {
        let mut sim = SimChamber::new();
        let mut engine = WaveformEngine::new(WaveformConfig::constant(42.0), sim.info());
        let options = RunOptions {
            cadence: Duration::from_secs(10),
            duration: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let summary = run(&mut sim, &mut engine, &options, std::future::pending())
            .await
            .unwrap();
        assert_eq!(summary.reason, StopReason::Completed);
        // ticks at 0, 10, ..., 60
        assert_eq!(summary.ticks, 7);
        assert_eq!(summary.last_setpoint, Some(42.0));
        assert_eq!(sim.get_clima().await.unwrap().temperature, Some(42.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_keep_recent_history() {
        let mut sim = SimChamber::new();
        let mut engine = WaveformEngine::new(WaveformConfig::constant(42.0), sim.info());
        let options = RunOptions {
            cadence: Duration::from_secs(1),
            ..Default::default()
        };
        let shutdown = tokio::time::sleep(Duration::from_millis(2_000_500));
        let summary = run(&mut sim, &mut engine, &options, shutdown).await.unwrap();
        assert_eq!(summary.reason, StopReason::Shutdown);
        assert_eq!(summary.ticks, 2001);
        assert_eq!(summary.samples.len(), SAMPLE_HISTORY);
        let newest = summary.samples.back().unwrap();
        assert_eq!(newest.elapsed, Duration::from_secs(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_aborts_before_loop() {
        let mut sim = SimChamber::new();
        let mut engine = WaveformEngine::new(WaveformConfig::constant(42.0), sim.info());
        let options = RunOptions {
            interface: Some("COM7".to_string()),
            ..Default::default()
        };
        let result = run(&mut sim, &mut engine, &options, std::future::pending()).await;
        assert!(matches!(result, Err(RunError::Open(ChamberError::Configuration(_)))));
        assert_eq!(sim.get_clima().await.unwrap().temperature, Some(20.0));
    }
}
