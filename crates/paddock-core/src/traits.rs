//! Trait abstractions over the stores the engine reads from and writes to.
//!
//! The driver only sees these traits, so the same aggregation code runs
//! against SQLite ([`SqliteBackend`](crate::SqliteBackend)) and against the
//! in-memory [`MemoryBackend`](crate::MemoryBackend) used in tests.

use async_trait::async_trait;
use time::OffsetDateTime;

use paddock_store::{Footprint, RollupQuery};
use paddock_types::{AggregateRecord, Granularity, Quantity, Reading};

use crate::error::Result;

/// Read side of the Reading Store.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Readings of one series with `start <= timestamp < end`, ordered by
    /// timestamp ascending.
    ///
    /// Each call is a fresh query, so a failed read can simply be repeated.
    async fn readings(
        &self,
        sensor: &str,
        quantity: Quantity,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Reading>>;

    /// Hour footprints of readings ingested in `(after, until]`.
    ///
    /// `after = None` selects everything ingested up to `until`.
    async fn footprints(
        &self,
        after: Option<OffsetDateTime>,
        until: OffsetDateTime,
    ) -> Result<Vec<Footprint>>;

    /// Ingest time of the newest stored reading.
    async fn latest_recorded_at(&self) -> Result<Option<OffsetDateTime>>;
}

/// Write side of the Rollup Store.
#[async_trait]
pub trait RollupSink: Send + Sync {
    /// Insert or wholesale replace the record under its merge key.
    async fn upsert(&self, record: &AggregateRecord) -> Result<()>;

    /// Query stored records.
    async fn rollups(&self, query: &RollupQuery) -> Result<Vec<AggregateRecord>>;
}

/// Persistent high-water marks, one per granularity.
///
/// A mark is an ingest time: every reading ingested at or before it has been
/// aggregated at that granularity.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn mark(&self, granularity: Granularity) -> Result<Option<OffsetDateTime>>;

    async fn set_mark(&self, granularity: Granularity, mark: OffsetDateTime) -> Result<()>;
}
