//! Main store implementation.

use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};

use paddock_types::{AggregateRecord, Granularity, Quantity, Reading, RollupKey, Unit};

use crate::error::{Error, Result};
use crate::models::{Footprint, HighWaterMark, StoredReading};
use crate::queries::{ReadingQuery, RollupQuery};
use crate::schema;

/// SQLite-based store for readings, rollups and high-water marks.
pub struct Store {
    conn: Connection,
}

/// Row counts and time span of the stored data.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub readings: u64,
    pub rollups: u64,
    pub sensors: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub oldest_reading: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub newest_reading: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub latest_recorded_at: Option<OffsetDateTime>,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Row counts and data span, for status output.
    pub fn stats(&self) -> Result<StoreStats> {
        let (readings, sensors, oldest, newest, recorded): (
            i64,
            i64,
            Option<i64>,
            Option<i64>,
            Option<i64>,
        ) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT sensor), MIN(timestamp), MAX(timestamp),
                    MAX(recorded_at)
             FROM readings",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

        Ok(StoreStats {
            readings: readings as u64,
            rollups: self.count_rollups(None)?,
            sensors: sensors as u64,
            oldest_reading: oldest.map(from_unix_nanos).transpose()?,
            newest_reading: newest.map(from_unix_nanos).transpose()?,
            latest_recorded_at: recorded.map(from_unix_nanos).transpose()?,
        })
    }
}

// Reading operations
impl Store {
    /// Insert readings, ignoring any already stored under the same
    /// `(sensor, quantity, timestamp)`.
    ///
    /// The batch is stamped with an ingest time later than any already
    /// stored, so a reader that has seen ingest time `t` sees every later
    /// batch as `> t`. Returns the number of rows actually inserted. The
    /// whole batch is rejected if any reading fails validation.
    pub fn insert_readings(&self, readings: &[Reading]) -> Result<usize> {
        self.insert_batch(readings, None)
    }

    /// Insert readings with an explicit ingest time.
    ///
    /// `recorded_at` is what incremental aggregation tracks, so replaying a
    /// backlog with an old ingest time hides it from the next incremental run.
    pub fn insert_readings_at(
        &self,
        readings: &[Reading],
        recorded_at: OffsetDateTime,
    ) -> Result<usize> {
        self.insert_batch(readings, Some(recorded_at))
    }

    fn insert_batch(&self, readings: &[Reading], recorded_at: Option<OffsetDateTime>) -> Result<usize> {
        for reading in readings {
            validate_reading(reading)?;
        }

        // IMMEDIATE takes the write lock up front, so ingest times follow commit order
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let recorded_at = match recorded_at {
            Some(time) => unix_nanos(time)?,
            None => {
                let latest: Option<i64> =
                    tx.query_row("SELECT MAX(recorded_at) FROM readings", [], |row| row.get(0))?;
                let now = unix_nanos(OffsetDateTime::now_utc())?;
                latest.map_or(now, |latest| now.max(latest.saturating_add(1)))
            }
        };

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO readings (sensor, quantity, timestamp, value, unit, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for reading in readings {
                inserted += stmt.execute(rusqlite::params![
                    reading.sensor,
                    reading.quantity.as_str(),
                    unix_nanos(reading.timestamp)?,
                    reading.value,
                    reading.unit.symbol(),
                    recorded_at,
                ])?;
            }
        }
        tx.commit()?;

        debug!(
            "Inserted {} of {} readings ({} duplicates ignored)",
            inserted,
            readings.len(),
            readings.len() - inserted
        );
        Ok(inserted)
    }

    /// Query readings with filters.
    pub fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<StoredReading>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let readings = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(StoredReading {
                    id: row.get(0)?,
                    sensor: row.get(1)?,
                    quantity: parse_column(row, 2)?,
                    timestamp: nanos_column(row, 3)?,
                    value: row.get(4)?,
                    unit: parse_column(row, 5)?,
                    recorded_at: nanos_column(row, 6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(readings)
    }

    /// Readings of one series in `[start, end)`, oldest first.
    pub fn readings_in_range(
        &self,
        sensor: &str,
        quantity: Quantity,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Reading>> {
        let query = ReadingQuery::new()
            .sensor(sensor)
            .quantity(quantity)
            .since(start)
            .until(end)
            .oldest_first();
        Ok(self
            .query_readings(&query)?
            .iter()
            .map(StoredReading::to_reading)
            .collect())
    }

    /// Count readings, optionally for one sensor.
    pub fn count_readings(&self, sensor: Option<&str>) -> Result<u64> {
        let count: i64 = match sensor {
            Some(sensor) => self.conn.query_row(
                "SELECT COUNT(*) FROM readings WHERE sensor = ?",
                [sensor],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }

    /// Hour footprints of readings ingested in `(after, until]`.
    ///
    /// With `after` set to `None` every reading ingested up to `until`
    /// contributes, which is what a backfill wants.
    pub fn footprints(
        &self,
        after: Option<OffsetDateTime>,
        until: OffsetDateTime,
    ) -> Result<Vec<Footprint>> {
        let after = after.map(unix_nanos).transpose()?.unwrap_or(i64::MIN);
        let until = unix_nanos(until)?;

        // Floor to the hour, also for timestamps before 1970
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT sensor, quantity,
                    timestamp - (((timestamp % ?3) + ?3) % ?3) AS hour
             FROM readings
             WHERE recorded_at > ?1 AND recorded_at <= ?2
             ORDER BY sensor, quantity, hour",
        )?;
        let footprints = stmt
            .query_map([after, until, NANOS_PER_HOUR], |row| {
                Ok(Footprint {
                    sensor: row.get(0)?,
                    quantity: parse_column(row, 1)?,
                    hour: nanos_column(row, 2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!("Found {} dirty hour footprints", footprints.len());
        Ok(footprints)
    }

    /// The most recent ingest time, if any reading is stored.
    pub fn latest_recorded_at(&self) -> Result<Option<OffsetDateTime>> {
        let nanos: Option<i64> =
            self.conn
                .query_row("SELECT MAX(recorded_at) FROM readings", [], |row| row.get(0))?;
        nanos.map(from_unix_nanos).transpose()
    }
}

// Rollup operations
impl Store {
    /// Insert a rollup, replacing any record under the same key.
    pub fn upsert_rollup(&self, record: &AggregateRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO rollups (bucket_start, sensor, quantity, granularity, value, unit, sample_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(bucket_start, sensor, quantity, granularity) DO UPDATE SET
                value = excluded.value,
                unit = excluded.unit,
                sample_count = excluded.sample_count",
            rusqlite::params![
                record.bucket_start.unix_timestamp(),
                record.sensor,
                record.quantity.as_str(),
                record.granularity.as_str(),
                record.value,
                record.unit.symbol(),
                record.sample_count,
            ],
        )?;
        Ok(())
    }

    /// Fetch the record stored under a key.
    pub fn get_rollup(&self, key: &RollupKey) -> Result<Option<AggregateRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT bucket_start, granularity, sensor, quantity, value, unit, sample_count
             FROM rollups
             WHERE bucket_start = ?1 AND sensor = ?2 AND quantity = ?3 AND granularity = ?4",
        )?;

        let record = stmt
            .query_row(
                rusqlite::params![
                    key.bucket_start.unix_timestamp(),
                    key.sensor,
                    key.quantity.as_str(),
                    key.granularity.as_str(),
                ],
                rollup_from_row,
            )
            .optional()?;

        Ok(record)
    }

    /// Query rollups with filters.
    pub fn query_rollups(&self, query: &RollupQuery) -> Result<Vec<AggregateRecord>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_ref.as_slice(), rollup_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Count rollups, optionally for one granularity.
    pub fn count_rollups(&self, granularity: Option<Granularity>) -> Result<u64> {
        let count: i64 = match granularity {
            Some(g) => self.conn.query_row(
                "SELECT COUNT(*) FROM rollups WHERE granularity = ?",
                [g.as_str()],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM rollups", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }
}

// High-water mark operations
impl Store {
    /// Get the mark for a scope.
    pub fn get_high_water_mark(&self, scope: &str) -> Result<Option<HighWaterMark>> {
        let mut stmt = self
            .conn
            .prepare("SELECT scope, mark, updated_at FROM high_water_marks WHERE scope = ?")?;

        let mark = stmt.query_row([scope], mark_from_row).optional()?;
        Ok(mark)
    }

    /// Set the mark for a scope.
    pub fn set_high_water_mark(&self, scope: &str, mark: OffsetDateTime) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        self.conn.execute(
            "INSERT INTO high_water_marks (scope, mark, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(scope) DO UPDATE SET
                mark = ?2,
                updated_at = ?3",
            rusqlite::params![scope, unix_nanos(mark)?, now],
        )?;

        debug!("Updated high-water mark for {} to {}", scope, mark);
        Ok(())
    }

    /// All stored marks, ordered by scope.
    pub fn list_high_water_marks(&self) -> Result<Vec<HighWaterMark>> {
        let mut stmt = self
            .conn
            .prepare("SELECT scope, mark, updated_at FROM high_water_marks ORDER BY scope")?;

        let marks = stmt
            .query_map([], mark_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(marks)
    }
}

pub(crate) fn validate_reading(reading: &Reading) -> Result<()> {
    if reading.sensor.trim().is_empty() {
        return Err(Error::InvalidReading {
            sensor: reading.sensor.clone(),
            reason: "sensor identifier is empty".to_string(),
        });
    }
    if !reading.value.is_finite() {
        return Err(Error::InvalidReading {
            sensor: reading.sensor.clone(),
            reason: format!("{} value {} is not finite", reading.quantity, reading.value),
        });
    }
    unix_nanos(reading.timestamp)?;
    Ok(())
}

fn rollup_from_row(row: &Row<'_>) -> rusqlite::Result<AggregateRecord> {
    Ok(AggregateRecord {
        bucket_start: timestamp_column(row, 0)?,
        granularity: parse_column(row, 1)?,
        sensor: row.get(2)?,
        quantity: parse_column(row, 3)?,
        value: row.get(4)?,
        unit: parse_column::<Unit>(row, 5)?,
        sample_count: row.get(6)?,
    })
}

fn mark_from_row(row: &Row<'_>) -> rusqlite::Result<HighWaterMark> {
    Ok(HighWaterMark {
        scope: row.get(0)?,
        mark: nanos_column(row, 1)?,
        updated_at: timestamp_column(row, 2)?,
    })
}

/// Parse a TEXT column through `FromStr`.
fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = paddock_types::ParseError>,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let secs: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn nanos_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let nanos: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp_nanos(nanos as i128)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn from_unix_nanos(nanos: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(nanos as i128)
        .map_err(|e| Error::InvalidTimestamp(e.to_string()))
}

const NANOS_PER_HOUR: i64 = 3_600_000_000_000;

/// Nanoseconds since the epoch as stored in `timestamp`, `recorded_at` and `mark`.
fn unix_nanos(time: OffsetDateTime) -> Result<i64> {
    i64::try_from(time.unix_timestamp_nanos())
        .map_err(|_| Error::InvalidTimestamp(format!("{time} is outside the storable range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn rain(sensor: &str, timestamp: OffsetDateTime, value: f64) -> Reading {
        Reading::new(sensor, Quantity::RainfallHourly, timestamp, value, Unit::Millimeter)
    }

    fn daily(value: f64, sample_count: u32) -> AggregateRecord {
        AggregateRecord {
            bucket_start: datetime!(2024-03-01 00:00 UTC),
            granularity: Granularity::Daily,
            sensor: "S1".to_string(),
            quantity: Quantity::RainfallHourly,
            value,
            unit: Unit::Millimeter,
            sample_count,
        }
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.count_readings(None).unwrap(), 0);
        assert_eq!(store.count_rollups(None).unwrap(), 0);
    }

    #[test]
    fn test_open_on_disk_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("paddock.db");

        let store = Store::open(&path).unwrap();
        store
            .insert_readings(&[rain("S1", datetime!(2024-03-01 02:00 UTC), 2.0)])
            .unwrap();
        drop(store);

        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.count_readings(None).unwrap(), 1);
    }

    #[test]
    fn test_insert_and_query_readings() {
        let store = Store::open_in_memory().unwrap();
        let readings = [
            rain("S1", datetime!(2024-03-01 14:00 UTC), 1.5),
            rain("S1", datetime!(2024-03-01 02:00 UTC), 2.0),
            rain("S2", datetime!(2024-03-01 03:00 UTC), 9.0),
        ];
        assert_eq!(store.insert_readings(&readings).unwrap(), 3);

        let found = store
            .readings_in_range(
                "S1",
                Quantity::RainfallHourly,
                datetime!(2024-03-01 00:00 UTC),
                datetime!(2024-03-02 00:00 UTC),
            )
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].value, 2.0);
        assert_eq!(found[1].value, 1.5);
        assert_eq!(found[0].unit, Unit::Millimeter);
    }

    #[test]
    fn test_range_end_is_exclusive() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_readings(&[
                rain("S1", datetime!(2024-03-01 00:00 UTC), 1.0),
                rain("S1", datetime!(2024-03-02 00:00 UTC), 1.0),
            ])
            .unwrap();

        let found = store
            .readings_in_range(
                "S1",
                Quantity::RainfallHourly,
                datetime!(2024-03-01 00:00 UTC),
                datetime!(2024-03-02 00:00 UTC),
            )
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].timestamp, datetime!(2024-03-01 00:00 UTC));
    }

    #[test]
    fn test_insert_deduplication() {
        let store = Store::open_in_memory().unwrap();
        let reading = rain("S1", datetime!(2024-03-01 02:00 UTC), 2.0);

        assert_eq!(store.insert_readings(&[reading.clone()]).unwrap(), 1);
        assert_eq!(store.insert_readings(&[reading]).unwrap(), 0);
        assert_eq!(store.count_readings(Some("S1")).unwrap(), 1);
    }

    #[test]
    fn test_insert_rejects_non_finite_batch() {
        let store = Store::open_in_memory().unwrap();
        let result = store.insert_readings(&[
            rain("S1", datetime!(2024-03-01 02:00 UTC), 2.0),
            rain("S1", datetime!(2024-03-01 03:00 UTC), f64::NAN),
        ]);

        assert!(matches!(result, Err(Error::InvalidReading { .. })));
        assert_eq!(store.count_readings(None).unwrap(), 0);
    }

    #[test]
    fn test_footprints_by_ingest_window() {
        let store = Store::open_in_memory().unwrap();
        let first = datetime!(2024-03-02 00:00 UTC);
        let second = datetime!(2024-03-03 00:00 UTC);

        store
            .insert_readings_at(
                &[
                    rain("S1", datetime!(2024-03-01 02:10 UTC), 2.0),
                    rain("S1", datetime!(2024-03-01 02:40 UTC), 1.0),
                    rain("S1", datetime!(2024-03-01 14:00 UTC), 1.5),
                ],
                first,
            )
            .unwrap();
        // Late reading for an old hour
        store
            .insert_readings_at(&[rain("S1", datetime!(2024-03-01 20:00 UTC), 0.5)], second)
            .unwrap();

        let all = store.footprints(None, second).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].hour, datetime!(2024-03-01 02:00 UTC));

        let late = store.footprints(Some(first), second).unwrap();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].hour, datetime!(2024-03-01 20:00 UTC));

        // Readings ingested after `until` are not visible yet
        assert!(store.footprints(None, first - time::Duration::SECOND).unwrap().is_empty());
        assert_eq!(store.latest_recorded_at().unwrap(), Some(second));
    }

    #[test]
    fn test_ingest_time_is_monotonic() {
        let store = Store::open_in_memory().unwrap();
        // An ingest time ahead of the wall clock
        let ahead = OffsetDateTime::now_utc() + time::Duration::hours(1);
        store
            .insert_readings_at(&[rain("S1", datetime!(2024-03-01 02:00 UTC), 2.0)], ahead)
            .unwrap();
        store
            .insert_readings(&[rain("S1", datetime!(2024-03-01 03:00 UTC), 1.0)])
            .unwrap();

        let latest = store.latest_recorded_at().unwrap().unwrap();
        assert!(latest > ahead);
        assert_eq!(store.footprints(Some(ahead), latest).unwrap().len(), 1);
    }

    #[test]
    fn test_footprint_floors_pre_epoch_timestamps() {
        let store = Store::open_in_memory().unwrap();
        let now = OffsetDateTime::now_utc();
        store
            .insert_readings_at(&[rain("S1", datetime!(1969-12-31 23:30 UTC), 1.0)], now)
            .unwrap();

        let footprints = store.footprints(None, now).unwrap();
        assert_eq!(footprints[0].hour, datetime!(1969-12-31 23:00 UTC));
    }

    #[test]
    fn test_readings_within_one_second_stay_distinct() {
        let store = Store::open_in_memory().unwrap();
        let inserted = store
            .insert_readings(&[
                rain("S1", datetime!(2024-03-01 14:00:00.2 UTC), 1.0),
                rain("S1", datetime!(2024-03-01 14:00:00.7 UTC), 2.0),
            ])
            .unwrap();
        assert_eq!(inserted, 2);

        let found = store
            .readings_in_range(
                "S1",
                Quantity::RainfallHourly,
                datetime!(2024-03-01 14:00:00.5 UTC),
                datetime!(2024-03-01 15:00 UTC),
            )
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].timestamp, datetime!(2024-03-01 14:00:00.7 UTC));

        // Same instant is still a duplicate
        let again = store
            .insert_readings(&[rain("S1", datetime!(2024-03-01 14:00:00.7 UTC), 5.0)])
            .unwrap();
        assert_eq!(again, 0);
    }

    #[test]
    fn test_sub_second_pre_epoch_reading_keeps_its_hour() {
        let store = Store::open_in_memory().unwrap();
        let now = OffsetDateTime::now_utc();
        store
            .insert_readings_at(&[rain("S1", datetime!(1969-12-31 23:59:59.5 UTC), 1.0)], now)
            .unwrap();

        let footprints = store.footprints(None, now).unwrap();
        assert_eq!(footprints[0].hour, datetime!(1969-12-31 23:00 UTC));
        let found = store
            .readings_in_range(
                "S1",
                Quantity::RainfallHourly,
                datetime!(1970-01-01 00:00 UTC),
                datetime!(1970-01-02 00:00 UTC),
            )
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_out_of_range_timestamp_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let result = store.insert_readings(&[rain("S1", datetime!(2300-01-01 00:00 UTC), 1.0)]);
        assert!(matches!(result, Err(Error::InvalidTimestamp(_))));
        assert_eq!(store.count_readings(None).unwrap(), 0);
    }

    #[test]
    fn test_upsert_rollup_replaces_wholesale() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_rollup(&daily(3.5, 2)).unwrap();
        store.upsert_rollup(&daily(4.0, 3)).unwrap();

        assert_eq!(store.count_rollups(None).unwrap(), 1);
        let stored = store.get_rollup(&daily(0.0, 0).key()).unwrap().unwrap();
        assert_eq!(stored, daily(4.0, 3));
    }

    #[test]
    fn test_query_rollups_filters_granularity() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_rollup(&daily(3.5, 2)).unwrap();
        store
            .upsert_rollup(&AggregateRecord {
                granularity: Granularity::Monthly,
                ..daily(3.5, 2)
            })
            .unwrap();

        let monthly = store
            .query_rollups(&RollupQuery::new().granularity(Granularity::Monthly))
            .unwrap();
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].granularity, Granularity::Monthly);
        assert_eq!(store.count_rollups(Some(Granularity::Daily)).unwrap(), 1);
    }

    #[test]
    fn test_high_water_marks() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_high_water_mark("DAILY").unwrap().is_none());

        let mark = datetime!(2024-03-02 00:00:00.000000123 UTC);
        store.set_high_water_mark("DAILY", mark).unwrap();
        store
            .set_high_water_mark("HOURLY", datetime!(2024-03-01 00:00 UTC))
            .unwrap();

        let stored = store.get_high_water_mark("DAILY").unwrap().unwrap();
        assert_eq!(stored.mark, mark);

        let marks = store.list_high_water_marks().unwrap();
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].scope, "DAILY");
    }

    #[test]
    fn test_stats() {
        let store = Store::open_in_memory().unwrap();
        let empty = store.stats().unwrap();
        assert_eq!(empty.readings, 0);
        assert!(empty.oldest_reading.is_none());

        store
            .insert_readings(&[
                rain("S1", datetime!(2024-03-01 02:00 UTC), 2.0),
                rain("S2", datetime!(2024-03-05 02:00 UTC), 2.0),
            ])
            .unwrap();
        store.upsert_rollup(&daily(2.0, 1)).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.readings, 2);
        assert_eq!(stats.sensors, 2);
        assert_eq!(stats.rollups, 1);
        assert_eq!(stats.oldest_reading, Some(datetime!(2024-03-01 02:00 UTC)));
        assert_eq!(stats.newest_reading, Some(datetime!(2024-03-05 02:00 UTC)));
        assert!(stats.latest_recorded_at.is_some());
    }
}
