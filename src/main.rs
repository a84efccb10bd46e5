// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the weather station daemon
use anyhow::Result;
use clap::Parser;
use log::info;
use rust_weather_station::config::{self, Config, StationType};
use rust_weather_station::daemon::{Daemon, StationStats, StationTask};
use rust_weather_station::station::{create_station_driver, StationContext};
use rust_weather_station::storage::{ArchiveStore, FileArchiveStore};

use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

/// Weather station data acquisition daemon
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Station driver
    #[arg(long, value_enum)]
    station_type: Option<StationType>,

    /// Serial device or hidraw node of the console
    #[arg(long)]
    device: Option<String>,

    /// Datafeed server enabled
    #[arg(long)]
    datafeed_enabled: Option<bool>,

    /// Datafeed server port
    #[arg(long)]
    datafeed_port: Option<u16>,

    /// Archive file location
    #[arg(long)]
    archive: Option<String>,

    /// Print the first reading as JSON and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

/// Start the station, print its first reading and stop.
async fn print_first_reading(config: &Config) -> Result<()> {
    let store: Arc<dyn ArchiveStore> = Arc::new(FileArchiveStore::open(&config.storage.archive_path)?);
    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let (context, events) = StationContext::channel(store.clone(), running.clone());
    let driver = create_station_driver(&config.station, &config.calibration, context)?;
    let (feed, _) = broadcast::channel(1);

    let task = StationTask::new(
        driver,
        events,
        store,
        feed,
        running,
        Arc::new(StationStats::default()),
        config.station.archive_interval,
        &config.daemon,
    );
    let reading = task.first_reading().await?;
    println!("{}", serde_json::to_string_pretty(&reading)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger with appropriate level based on verbose and quiet flags
    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    // Check if --show-config-schema flag is set
    if args.show_config_schema {
        return config::output_config_schema();
    }

    // Validate configuration file if --validate-config is set
    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }

        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    // Apply command line overrides
    config.apply_args(
        args.station_type,
        args.device.clone(),
        args.datafeed_enabled,
        args.datafeed_port,
        args.archive.clone(),
    );
    config.validate()?;

    if args.once {
        return print_first_reading(&config).await;
    }

    info!("Starting in daemon mode");
    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    // Wait for termination signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal, terminating daemon");
            daemon.shutdown();
            daemon.join().await?;
        }
        Err(err) => {
            eprintln!("Error waiting for shutdown signal: {}", err);
        }
    }

    Ok(())
}
