// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust weather station library
//!
//! Data acquisition core of a weather station daemon: transports to reach
//! the console, station drivers (Davis Vantage Pro, a virtual station fed
//! by another daemon, a simulator), the canonical wire codec of readings
//! and archive records, archive storage and the datafeed server.

pub mod accumulator;
pub mod codec;
pub mod config;
pub mod daemon;
pub mod datafeed;
pub mod records;
pub mod station;
pub mod storage;
pub mod transport;
pub mod weather;
