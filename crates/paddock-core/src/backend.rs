//! SQLite-backed implementation of the engine traits.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use paddock_store::{Footprint, RollupQuery, Store};
use paddock_types::{AggregateRecord, Granularity, Quantity, Reading};

use crate::error::Result;
use crate::traits::{ReadingSource, RollupSink, WatermarkStore};

/// Scope prefix for high-water marks in the `high_water_marks` table.
const MARK_SCOPE_PREFIX: &str = "rollup:";

/// Reading source, rollup sink and mark store over one SQLite [`Store`].
///
/// Clones share the same connection. Every call holds the connection lock
/// for its whole query, so worker tasks over this backend take turns at the
/// database: the pool overlaps their scheduling and summaries, not their SQL.
#[derive(Clone)]
pub struct SqliteBackend {
    store: Arc<Mutex<Store>>,
}

impl SqliteBackend {
    /// Wrap an open store.
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Store::open(path)?))
    }

    /// An in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Store::open_in_memory()?))
    }

    /// Shared handle to the underlying store, for ingest and status queries.
    pub fn store(&self) -> Arc<Mutex<Store>> {
        Arc::clone(&self.store)
    }

    fn scope(granularity: Granularity) -> String {
        format!("{MARK_SCOPE_PREFIX}{granularity}")
    }
}

#[async_trait]
impl ReadingSource for SqliteBackend {
    async fn readings(
        &self,
        sensor: &str,
        quantity: Quantity,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Reading>> {
        let store = self.store.lock().await;
        Ok(store.readings_in_range(sensor, quantity, start, end)?)
    }

    async fn footprints(
        &self,
        after: Option<OffsetDateTime>,
        until: OffsetDateTime,
    ) -> Result<Vec<Footprint>> {
        let store = self.store.lock().await;
        Ok(store.footprints(after, until)?)
    }

    async fn latest_recorded_at(&self) -> Result<Option<OffsetDateTime>> {
        let store = self.store.lock().await;
        Ok(store.latest_recorded_at()?)
    }
}

#[async_trait]
impl RollupSink for SqliteBackend {
    async fn upsert(&self, record: &AggregateRecord) -> Result<()> {
        let store = self.store.lock().await;
        Ok(store.upsert_rollup(record)?)
    }

    async fn rollups(&self, query: &RollupQuery) -> Result<Vec<AggregateRecord>> {
        let store = self.store.lock().await;
        Ok(store.query_rollups(query)?)
    }
}

#[async_trait]
impl WatermarkStore for SqliteBackend {
    async fn mark(&self, granularity: Granularity) -> Result<Option<OffsetDateTime>> {
        let store = self.store.lock().await;
        Ok(store
            .get_high_water_mark(&Self::scope(granularity))?
            .map(|m| m.mark))
    }

    async fn set_mark(&self, granularity: Granularity, mark: OffsetDateTime) -> Result<()> {
        let store = self.store.lock().await;
        Ok(store.set_high_water_mark(&Self::scope(granularity), mark)?)
    }
}
