//! Rollup aggregation engine for environmental sensor readings.
//!
//! This crate turns an append-only store of timestamped, unit-tagged
//! readings into one summary record per (bucket, sensor, quantity,
//! granularity), and keeps those records current as late data arrives.
//!
//! # Features
//!
//! - **Unit normalization**: Every reading is converted to its quantity's
//!   canonical unit before any arithmetic
//! - **Per-quantity summaries**: Sum for rainfall, circular mean for wind
//!   direction, mean for most others, overridable per quantity
//! - **Idempotent upserts**: Recomputing a bucket replaces its record wholesale
//! - **Incremental runs**: Only buckets touched by newly ingested readings are
//!   recomputed, tracked by a high-water mark per granularity
//! - **Bounded parallelism**: Work units run on a semaphore-limited worker pool
//!   with per-unit timeout, retry and cooperative cancellation
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use paddock_core::{Aggregator, Driver, DriverConfig, RunMode, SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(SqliteBackend::open("paddock.db")?);
//!     let driver = Driver::with_backend(backend, Aggregator::default(), DriverConfig::default())?;
//!
//!     let report = driver.run(RunMode::Incremental).await?;
//!     println!("{} written, {} failed", report.written(), report.failed());
//!
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod backend;
pub mod driver;
pub mod error;
pub mod mock;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod summary;
pub mod traits;
pub mod units;

pub use aggregator::{Aggregator, UnitOutcome};
pub use backend::SqliteBackend;
pub use driver::{Driver, DriverConfig};
pub use error::{Error, Result};
pub use mock::MemoryBackend;
pub use report::{GranularityReport, RunReport};
pub use retry::{RetryConfig, with_retry};
pub use scheduler::{GranularityPlan, Plan, RunMode, WorkUnit};
pub use summary::{SummaryFn, SummaryTable};
pub use traits::{ReadingSource, RollupSink, WatermarkStore};
pub use units::UnitRegistry;

// Re-export the domain types so callers need only this crate
pub use paddock_types::{
    AggregateRecord, Bucket, Granularity, Quantity, Reading, RollupKey, Unit,
};
