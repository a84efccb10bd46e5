// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Module
//!
//! Runs the background services of the weather station: the station event
//! loop, the datafeed server and a heartbeat monitor.
//!
//! ## Components
//!
//! * **Launch Daemon**: starts, monitors and gracefully shuts down the tasks
//! * **Station Task**: drives the station and persists its archive records
//! * **Computed Data**: rain and ET totals, storm tracking, interval averages
//! * **Archive Builder**: archive records for stations without a data logger
//!
//! ## Usage
//!
//! ```no_run
//! use rust_weather_station::{config::Config, daemon::Daemon};
//!
//! async fn run() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!
//!     daemon.shutdown();
//!     daemon.join().await?;
//!     Ok(())
//! }
//! ```

pub mod archive_builder;
pub mod computed;
pub mod launch_daemon;
pub mod station_task;

pub use launch_daemon::Daemon;
pub use station_task::{StationStats, StationTask};
