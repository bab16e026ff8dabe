//! Domain types for Paddock environmental-sensor rollups.
//!
//! This crate provides the types shared by the store, the aggregation engine
//! and the service binary.
//!
//! # Features
//!
//! - Quantity catalogue and unit symbols
//! - Calibrated readings and rollup records
//! - Granularities with canonical UTC bucket boundaries
//! - Error types for parsing and bucket validation
//!
//! # Example
//!
//! ```
//! use paddock_types::{Bucket, Granularity, Quantity, Reading, Unit};
//! use time::macros::datetime;
//!
//! let reading = Reading::new(
//!     "S1",
//!     Quantity::RainfallHourly,
//!     datetime!(2024-03-01 14:00 UTC),
//!     1.5,
//!     Unit::Millimeter,
//! );
//! let bucket = Bucket::containing(Granularity::Daily, reading.timestamp)?;
//! assert_eq!(bucket.start(), datetime!(2024-03-01 00:00 UTC));
//! # Ok::<(), paddock_types::ParseError>(())
//! ```

pub mod error;
pub mod granularity;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use granularity::{Bucket, Granularity};
pub use types::{AggregateRecord, Quantity, Reading, RollupKey, Unit};
