//! Query builders for readings and rollups.
//!
//! This module provides fluent query builders for filtering and paginating
//! stored data. Both [`ReadingQuery`] and [`RollupQuery`] follow the builder
//! pattern and treat time ranges as half-open: `since` is inclusive and
//! `until` is exclusive, matching rollup bucket boundaries.
//!
//! # Example
//!
//! ```
//! use paddock_store::{Store, ReadingQuery, RollupQuery};
//! use paddock_types::{Granularity, Quantity};
//! use time::macros::datetime;
//!
//! let store = Store::open_in_memory()?;
//!
//! // One day of rainfall, chronological
//! let query = ReadingQuery::new()
//!     .sensor("S1")
//!     .quantity(Quantity::RainfallHourly)
//!     .since(datetime!(2024-03-01 00:00 UTC))
//!     .until(datetime!(2024-03-02 00:00 UTC))
//!     .oldest_first();
//! let readings = store.query_readings(&query)?;
//!
//! // Daily rainfall rollups for March
//! let rollups = RollupQuery::new()
//!     .sensor("S1")
//!     .quantity(Quantity::RainfallHourly)
//!     .granularity(Granularity::Daily)
//!     .since(datetime!(2024-03-01 00:00 UTC))
//!     .until(datetime!(2024-04-01 00:00 UTC));
//! let records = store.query_rollups(&rollups)?;
//! # Ok::<(), paddock_store::Error>(())
//! ```

use time::OffsetDateTime;

use paddock_types::{Granularity, Quantity};

/// Fluent query builder for readings.
///
/// Use this to construct queries for [`Store::query_readings`](crate::Store::query_readings).
/// All filter methods are optional and can be chained in any order.
///
/// By default, queries return results ordered by `timestamp` descending
/// (newest first).
#[derive(Debug, Default, Clone)]
pub struct ReadingQuery {
    /// Filter by sensor.
    pub sensor: Option<String>,
    /// Filter by quantity.
    pub quantity: Option<Quantity>,
    /// Include readings taken at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Include readings taken strictly before this time.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by timestamp descending (newest first).
    pub newest_first: bool,
}

impl ReadingQuery {
    /// Create a new query with default settings.
    ///
    /// Default behavior:
    /// - No sensor or quantity filter
    /// - No time range filter
    /// - No limit (all matching records)
    /// - Ordered by newest first
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter by sensor.
    pub fn sensor(mut self, sensor: &str) -> Self {
        self.sensor = Some(sensor.to_string());
        self
    }

    /// Filter by quantity.
    pub fn quantity(mut self, quantity: Quantity) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Filter to readings taken at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to readings taken strictly before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    ///
    /// Use with `limit()` for pagination. For example, to get page 2
    /// with 50 items per page: `.limit(50).offset(50)`.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results by oldest first (ascending by `timestamp`).
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref sensor) = self.sensor {
            conditions.push("sensor = ?");
            params.push(Box::new(sensor.clone()));
        }

        if let Some(quantity) = self.quantity {
            conditions.push("quantity = ?");
            params.push(Box::new(quantity.as_str()));
        }

        if let Some(since) = self.since {
            conditions.push("timestamp >= ?");
            params.push(Box::new(unix_nanos_saturating(since)));
        }

        if let Some(until) = self.until {
            conditions.push("timestamp < ?");
            params.push(Box::new(unix_nanos_saturating(until)));
        }

        (where_clause(&conditions), params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, sensor, quantity, timestamp, value, unit, recorded_at \
             FROM readings {} ORDER BY timestamp {}, id {}",
            where_clause, order, order
        );
        push_pagination(&mut sql, self.limit, self.offset);
        sql
    }
}

/// Fluent query builder for rollup records.
///
/// Use this to construct queries for [`Store::query_rollups`](crate::Store::query_rollups).
///
/// By default, queries return results ordered by `bucket_start` ascending
/// (chronological), which is what chart rendering wants.
#[derive(Debug, Default, Clone)]
pub struct RollupQuery {
    pub sensor: Option<String>,
    pub quantity: Option<Quantity>,
    pub granularity: Option<Granularity>,
    /// Include buckets starting at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Include buckets starting strictly before this time.
    pub until: Option<OffsetDateTime>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub newest_first: bool,
}

impl RollupQuery {
    /// Create a new query with default settings (everything, oldest first).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sensor(mut self, sensor: &str) -> Self {
        self.sensor = Some(sensor.to_string());
        self
    }

    pub fn quantity(mut self, quantity: Quantity) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = Some(granularity);
        self
    }

    /// Filter to buckets starting at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to buckets starting strictly before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results by newest bucket first.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref sensor) = self.sensor {
            conditions.push("sensor = ?");
            params.push(Box::new(sensor.clone()));
        }

        if let Some(quantity) = self.quantity {
            conditions.push("quantity = ?");
            params.push(Box::new(quantity.as_str()));
        }

        if let Some(granularity) = self.granularity {
            conditions.push("granularity = ?");
            params.push(Box::new(granularity.as_str()));
        }

        if let Some(since) = self.since {
            conditions.push("bucket_start >= ?");
            params.push(Box::new(since.unix_timestamp()));
        }

        if let Some(until) = self.until {
            conditions.push("bucket_start < ?");
            params.push(Box::new(until.unix_timestamp()));
        }

        (where_clause(&conditions), params)
    }

    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        // Secondary ordering keeps output stable across granularities and sensors
        let mut sql = format!(
            "SELECT bucket_start, granularity, sensor, quantity, value, unit, sample_count \
             FROM rollups {} ORDER BY bucket_start {}, sensor, quantity, granularity",
            where_clause, order
        );
        push_pagination(&mut sql, self.limit, self.offset);
        sql
    }
}

fn where_clause(conditions: &[&str]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

fn push_pagination(sql: &mut String, limit: Option<u32>, offset: Option<u32>) {
    // SQLite requires LIMIT before OFFSET
    match (limit, offset) {
        (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
        (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
        (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
        (None, None) => {}
    }
}

/// Reading timestamps are stored as `i64` unix nanoseconds. Bounds outside
/// that range clamp to it, which keeps the half-open comparison intact.
fn unix_nanos_saturating(time: OffsetDateTime) -> i64 {
    time.unix_timestamp_nanos()
        .clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    // ==================== ReadingQuery Tests ====================

    #[test]
    fn test_reading_query_new_defaults() {
        let query = ReadingQuery::new();
        assert!(query.sensor.is_none());
        assert!(query.quantity.is_none());
        assert!(query.since.is_none());
        assert!(query.until.is_none());
        assert!(query.limit.is_none());
        assert!(query.newest_first);
    }

    #[test]
    fn test_reading_query_build_where_empty() {
        let (clause, params) = ReadingQuery::new().build_where();
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_reading_query_range_is_half_open() {
        let query = ReadingQuery::new()
            .since(datetime!(2024-03-01 00:00 UTC))
            .until(datetime!(2024-03-02 00:00 UTC));
        let (clause, params) = query.build_where();
        assert_eq!(clause, "WHERE timestamp >= ? AND timestamp < ?");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_reading_query_sql_ordering() {
        let sql = ReadingQuery::new().oldest_first().build_sql();
        assert!(sql.ends_with("ORDER BY timestamp ASC, id ASC"));

        let sql = ReadingQuery::new().build_sql();
        assert!(sql.contains("ORDER BY timestamp DESC"));
    }

    #[test]
    fn test_reading_query_pagination() {
        let sql = ReadingQuery::new().limit(50).offset(100).build_sql();
        assert!(sql.ends_with("LIMIT 50 OFFSET 100"));

        let sql = ReadingQuery::new().offset(10).build_sql();
        assert!(sql.ends_with("LIMIT -1 OFFSET 10"));
    }

    // ==================== RollupQuery Tests ====================

    #[test]
    fn test_rollup_query_defaults_to_chronological() {
        let query = RollupQuery::new();
        assert!(!query.newest_first);
        assert!(query.build_sql().contains("ORDER BY bucket_start ASC"));
    }

    #[test]
    fn test_rollup_query_all_filters() {
        let query = RollupQuery::new()
            .sensor("S1")
            .quantity(Quantity::AirTemperature)
            .granularity(Granularity::Weekly)
            .since(datetime!(2024-01-01 00:00 UTC))
            .until(datetime!(2025-01-01 00:00 UTC));
        let (clause, params) = query.build_where();
        assert_eq!(
            clause,
            "WHERE sensor = ? AND quantity = ? AND granularity = ? AND bucket_start >= ? AND bucket_start < ?"
        );
        assert_eq!(params.len(), 5);
    }
}
