//! Command-line front end and periodic scheduler for the Paddock rollup engine.
//!
//! This crate provides a service that:
//! - Imports sensor readings from CSV into the local database
//! - Runs backfill or incremental aggregation on demand
//! - Runs incremental aggregation on a fixed interval as a daemon
//! - Exports rollups as JSON or CSV and reports high-water marks
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/paddock/service.toml`:
//!
//! ```toml
//! [storage]
//! path = "~/.local/share/paddock/paddock.db"
//!
//! [engine]
//! granularities = ["HOURLY", "DAILY", "WEEKLY", "MONTHLY", "YEARLY"]
//! workers = 16
//! unit_timeout_secs = 30
//! interval_secs = 300
//!
//! [engine.retry]
//! max_retries = 3
//! initial_delay_ms = 100
//! max_delay_ms = 5000
//! backoff_multiplier = 2.0
//! jitter = true
//!
//! [summaries]
//! AirHumidity = "max"
//!
//! [logging]
//! json = false
//! level = "info"
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod runner;

pub use app::{App, MarkStatus, Status};
pub use config::{
    Config, ConfigError, EngineConfig, LoggingConfig, RetrySettings, StorageConfig,
    ValidationError,
};
pub use error::{Error, Result};
pub use runner::Runner;
