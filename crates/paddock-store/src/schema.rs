//! Database schema and migrations.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        // Fresh database - create all tables
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if version < SCHEMA_VERSION {
        migrate(conn, version)?;
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
///
/// Reading `timestamp`, `recorded_at` and `mark` are unix nanoseconds, so two
/// readings within one second stay distinct. Rollup `bucket_start` and
/// `updated_at` are unix seconds.
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Calibrated readings (append-only)
        CREATE TABLE IF NOT EXISTS readings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sensor TEXT NOT NULL,
            quantity TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            value REAL NOT NULL,
            unit TEXT NOT NULL,
            recorded_at INTEGER NOT NULL,
            UNIQUE(sensor, quantity, timestamp)
        );
        CREATE INDEX IF NOT EXISTS idx_readings_series_time
            ON readings(sensor, quantity, timestamp);
        CREATE INDEX IF NOT EXISTS idx_readings_recorded
            ON readings(recorded_at);

        -- Rollups, one row per merge key
        CREATE TABLE IF NOT EXISTS rollups (
            bucket_start INTEGER NOT NULL,
            sensor TEXT NOT NULL,
            quantity TEXT NOT NULL,
            granularity TEXT NOT NULL,
            value REAL NOT NULL,
            unit TEXT NOT NULL,
            sample_count INTEGER NOT NULL,
            PRIMARY KEY (bucket_start, sensor, quantity, granularity)
        );
        CREATE INDEX IF NOT EXISTS idx_rollups_series
            ON rollups(sensor, quantity, granularity, bucket_start);

        -- High-water marks for incremental aggregation
        CREATE TABLE IF NOT EXISTS high_water_marks (
            scope TEXT PRIMARY KEY,
            mark INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )?;

    Ok(())
}

/// Run migrations from old_version to current.
fn migrate(conn: &Connection, old_version: i32) -> Result<()> {
    // if old_version < 2 { migrate_to_v2(conn)?; }

    let _ = old_version;
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}
