//! In-memory backend for testing.
//!
//! [`MemoryBackend`] implements every engine trait without a database and
//! supports:
//!
//! - **Ingest control**: Insert readings with an explicit ingest time
//! - **Failure injection**: Fail the next N operations, every operation, or
//!   only upserts of one granularity
//! - **Latency simulation**: Delay every read
//! - **Call counting**: Count reads and upserts

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use paddock_store::{Footprint, RollupQuery};
use paddock_types::{AggregateRecord, Granularity, Quantity, Reading, RollupKey};

use crate::error::{Error, Result};
use crate::traits::{ReadingSource, RollupSink, WatermarkStore};

#[derive(Debug, Clone)]
struct StoredReading {
    reading: Reading,
    recorded_at: OffsetDateTime,
}

/// An in-memory reading store, rollup store and mark store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    readings: RwLock<Vec<StoredReading>>,
    rollups: RwLock<BTreeMap<RollupKey, AggregateRecord>>,
    marks: RwLock<BTreeMap<Granularity, OffsetDateTime>>,
    should_fail: AtomicBool,
    /// Number of operations still to fail before succeeding.
    remaining_failures: AtomicU32,
    /// Upserts of this granularity always fail.
    failing_granularity: RwLock<Option<Granularity>>,
    /// Simulated read latency in milliseconds (0 = no delay).
    read_latency_ms: AtomicU64,
    read_count: AtomicU32,
    upsert_count: AtomicU32,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert readings ingested now.
    pub async fn insert(&self, readings: impl IntoIterator<Item = Reading>) -> usize {
        self.insert_at(readings, OffsetDateTime::now_utc()).await
    }

    /// Insert readings with an explicit ingest time.
    ///
    /// Readings already stored under the same `(sensor, quantity, timestamp)`
    /// are ignored. Returns the number inserted.
    pub async fn insert_at(
        &self,
        readings: impl IntoIterator<Item = Reading>,
        recorded_at: OffsetDateTime,
    ) -> usize {
        let mut stored = self.readings.write().await;
        let mut inserted = 0;
        for reading in readings {
            let duplicate = stored.iter().any(|s| {
                s.reading.sensor == reading.sensor
                    && s.reading.quantity == reading.quantity
                    && s.reading.timestamp == reading.timestamp
            });
            if !duplicate {
                stored.push(StoredReading {
                    reading,
                    recorded_at,
                });
                inserted += 1;
            }
        }
        inserted
    }

    /// Snapshot of every stored rollup, in key order.
    pub async fn all_rollups(&self) -> Vec<AggregateRecord> {
        self.rollups.read().await.values().cloned().collect()
    }

    /// The stored record for a key.
    pub async fn rollup(&self, key: &RollupKey) -> Option<AggregateRecord> {
        self.rollups.read().await.get(key).cloned()
    }

    // --- Test control methods ---

    /// Make every operation fail until cleared.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` operations, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Number of injected failures not yet consumed.
    pub fn remaining_failures(&self) -> u32 {
        self.remaining_failures.load(Ordering::Relaxed)
    }

    /// Make upserts of one granularity fail permanently.
    pub async fn set_failing_granularity(&self, granularity: Option<Granularity>) {
        *self.failing_granularity.write().await = granularity;
    }

    /// Set simulated read latency.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_read_latency(&self, latency: Duration) {
        self.read_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of `readings` calls served or attempted.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }

    /// Number of successful upserts.
    pub fn upsert_count(&self) -> u32 {
        self.upsert_count.load(Ordering::Relaxed)
    }

    fn check_should_fail(&self, operation: &str) -> Result<()> {
        // Check for transient failures first
        let transient = self
            .remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();

        if transient || self.should_fail.load(Ordering::Relaxed) {
            Err(Error::StoreUnavailable(format!("mock {operation} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ReadingSource for MemoryBackend {
    async fn readings(
        &self,
        sensor: &str,
        quantity: Quantity,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Reading>> {
        self.read_count.fetch_add(1, Ordering::Relaxed);

        let latency = self.read_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.check_should_fail("read")?;

        let mut readings: Vec<Reading> = self
            .readings
            .read()
            .await
            .iter()
            .map(|s| &s.reading)
            .filter(|r| {
                r.sensor == sensor
                    && r.quantity == quantity
                    && r.timestamp >= start
                    && r.timestamp < end
            })
            .cloned()
            .collect();
        readings.sort_by_key(|r| r.timestamp);
        Ok(readings)
    }

    async fn footprints(
        &self,
        after: Option<OffsetDateTime>,
        until: OffsetDateTime,
    ) -> Result<Vec<Footprint>> {
        self.check_should_fail("footprints")?;

        let mut footprints = Vec::new();
        for stored in self.readings.read().await.iter() {
            let ingested = after.is_none_or(|a| stored.recorded_at > a) && stored.recorded_at <= until;
            if ingested {
                footprints.push(Footprint {
                    sensor: stored.reading.sensor.clone(),
                    quantity: stored.reading.quantity,
                    hour: Granularity::Hourly.bucket_start(stored.reading.timestamp)?,
                });
            }
        }
        footprints.sort();
        footprints.dedup();
        Ok(footprints)
    }

    async fn latest_recorded_at(&self) -> Result<Option<OffsetDateTime>> {
        self.check_should_fail("latest_recorded_at")?;
        Ok(self.readings.read().await.iter().map(|s| s.recorded_at).max())
    }
}

#[async_trait]
impl RollupSink for MemoryBackend {
    async fn upsert(&self, record: &AggregateRecord) -> Result<()> {
        self.check_should_fail("upsert")?;
        if *self.failing_granularity.read().await == Some(record.granularity) {
            return Err(Error::StoreUnavailable(format!(
                "mock upsert failure for {}",
                record.granularity
            )));
        }

        self.rollups
            .write()
            .await
            .insert(record.key(), record.clone());
        self.upsert_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn rollups(&self, query: &RollupQuery) -> Result<Vec<AggregateRecord>> {
        let mut records: Vec<AggregateRecord> = self
            .rollups
            .read()
            .await
            .values()
            .filter(|r| {
                query.sensor.as_deref().is_none_or(|s| r.sensor == s)
                    && query.quantity.is_none_or(|q| r.quantity == q)
                    && query.granularity.is_none_or(|g| r.granularity == g)
                    && query.since.is_none_or(|t| r.bucket_start >= t)
                    && query.until.is_none_or(|t| r.bucket_start < t)
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| a.bucket_start.cmp(&b.bucket_start).then_with(|| a.key().cmp(&b.key())));
        if query.newest_first {
            records.reverse();
        }
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl WatermarkStore for MemoryBackend {
    async fn mark(&self, granularity: Granularity) -> Result<Option<OffsetDateTime>> {
        Ok(self.marks.read().await.get(&granularity).copied())
    }

    async fn set_mark(&self, granularity: Granularity, mark: OffsetDateTime) -> Result<()> {
        self.marks.write().await.insert(granularity, mark);
        Ok(())
    }
}
