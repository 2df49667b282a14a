// src/main.rs - Waveform generator entry point
use atwg_rs::cli::Cli;
use atwg_rs::config::{self, Config, DriverKind};
use atwg_rs::control::{self, StopReason};
use atwg_rs::hardware::Chamber;
use atwg_rs::hardware::espec::EspecChamber;
use atwg_rs::hardware::simulated::SimChamber;
use atwg_rs::scheduler::{WaveformEngine, format_seconds};
use clap::Parser;
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .init();

    tracing::info!("Starting ATWG {}", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            config::load_config(path)?
        }
        None => Config::default(),
    };
    cli.apply(&mut config);

    let waveform = config.waveform()?;
    let options = config.run_options(&waveform)?;

    let mut chamber: Box<dyn Chamber> = match config.chamber.driver {
        DriverKind::Sim => Box::new(SimChamber::new()),
        DriverKind::Espec => Box::new(EspecChamber::new(config.serial.clone())),
    };

    let info = chamber.info();
    tracing::info!(
        "Chamber: {} ({} .. {} {}, +{}/{} {})",
        info.name,
        info.temperature.min,
        info.temperature.max,
        info.temperature.unit,
        info.slew_rate.rise,
        info.slew_rate.fall,
        info.slew_rate.unit
    );
    tracing::info!(
        "Waveform: {:?} {} .. {} C, period {}",
        waveform.kind,
        waveform.min_temp,
        waveform.max_temp,
        format_seconds(waveform.period(), None)?
    );
    if let Some(duration) = options.duration {
        tracing::info!("Run time: {}", format_seconds(duration.as_secs_f64(), None)?);
    }

    let mut engine = WaveformEngine::new(waveform, info);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let summary = control::run(chamber.as_mut(), &mut engine, &options, shutdown).await?;
    if summary.reason == StopReason::Shutdown {
        tracing::info!("Stopped by user after {} ticks", summary.ticks);
    }
    Ok(())
}
