//! Local persistence for Paddock readings and rollups.
//!
//! This crate provides SQLite-based storage for calibrated sensor readings,
//! the rollup records computed from them, and the high-water marks that
//! drive incremental aggregation.
//!
//! # Features
//!
//! - Append-only readings with `(sensor, quantity, timestamp)` deduplication
//! - Nanosecond ingest times for late-data detection
//! - Rollup upsert by merge key
//! - Query by sensor, quantity, granularity and time range, with pagination
//! - CSV import and export
//!
//! # Example
//!
//! ```no_run
//! use paddock_store::{Store, RollupQuery};
//! use paddock_types::Granularity;
//!
//! let store = Store::open_default()?;
//!
//! let query = RollupQuery::new()
//!     .sensor("S1")
//!     .granularity(Granularity::Daily)
//!     .limit(30);
//! let rollups = store.query_rollups(&query)?;
//! # Ok::<(), paddock_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;
mod transfer;

pub use error::{Error, Result};
pub use models::{Footprint, HighWaterMark, StoredReading};
pub use queries::{ReadingQuery, RollupQuery};
pub use store::{Store, StoreStats};
pub use transfer::ImportResult;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/paddock/paddock.db`
/// - macOS: `~/Library/Application Support/paddock/paddock.db`
/// - Windows: `C:\Users\<user>\AppData\Local\paddock\paddock.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("paddock")
        .join("paddock.db")
}
