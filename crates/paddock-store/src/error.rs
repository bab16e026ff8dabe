//! Error types for paddock-store.

use std::path::PathBuf;

/// Result type for paddock-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in paddock-store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A reading rejected at ingest.
    #[error("Invalid reading from {sensor}: {reason}")]
    InvalidReading { sensor: String, reason: String },

    /// Invalid timestamp.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A stored or imported value could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] paddock_types::ParseError),

    /// CSV import or export error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the same call can succeed on retry, as when the database is
    /// busy. Rows that fail to decode and rejected input never are.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Database(e) => !matches!(
                e,
                rusqlite::Error::FromSqlConversionFailure(..)
                    | rusqlite::Error::InvalidColumnType(..)
                    | rusqlite::Error::IntegralValueOutOfRange(..)
            ),
            Error::CreateDirectory { .. } | Error::Io(_) => true,
            _ => false,
        }
    }
}
