//! Error types for paddock-core.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Strategy | Scope |
//! |------------|----------|-------|
//! | [`Error::UnsupportedConversion`] | Log and skip | The work unit |
//! | [`Error::InvalidBucket`] | Abort | The whole run, no marks advanced |
//! | [`Error::StoreUnavailable`] | Retry with backoff | The work unit |
//! | [`Error::InvalidData`] | Do not retry, record as failed | The work unit |
//! | [`Error::Timeout`] | Retry with backoff | The work unit |
//! | [`Error::Cancelled`] | Stop dispatching | The whole run |
//! | [`Error::InvalidConfig`] | Do not retry | Fix configuration and restart |
//! | [`Error::AlreadyRunning`] | Try again later | The requested run |
//!
//! An empty bucket is not an error. The aggregator reports it as
//! [`UnitOutcome::Empty`](crate::UnitOutcome::Empty) and writes nothing.

use std::time::Duration;

use thiserror::Error;

use paddock_types::{ParseError, Quantity, Unit};

/// Errors that can occur while aggregating readings into rollups.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No conversion path exists between two units for a quantity.
    #[error("Unsupported conversion for {quantity}: '{from}' -> '{to}'")]
    UnsupportedConversion {
        quantity: Quantity,
        from: Unit,
        to: Unit,
    },

    /// A bucket start that is not canonical for its granularity.
    #[error("{0}")]
    InvalidBucket(#[from] ParseError),

    /// The reading or rollup store could not serve a request.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store returned or was handed data that cannot be used, such as
    /// a row with an unknown unit. Retrying cannot fix it.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Another run of the same driver is still in progress.
    #[error("An aggregation run is already in progress")]
    AlreadyRunning,
}

impl From<paddock_store::Error> for Error {
    fn from(error: paddock_store::Error) -> Self {
        if error.is_transient() {
            Error::StoreUnavailable(error.to_string())
        } else {
            Error::InvalidData(error.to_string())
        }
    }
}

/// Result type alias using paddock-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_unsupported_conversion_display() {
        let err = Error::UnsupportedConversion {
            quantity: Quantity::AirTemperature,
            from: Unit::Millimeter,
            to: Unit::Celsius,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported conversion for AirTemperature: 'mm' -> '℃'"
        );
    }

    #[test]
    fn test_parse_error_becomes_invalid_bucket() {
        let err: Error = ParseError::InvalidBucket {
            granularity: paddock_types::Granularity::Daily,
            start: datetime!(2024-03-01 01:00 UTC),
        }
        .into();
        assert!(matches!(err, Error::InvalidBucket(_)));
        assert!(err.to_string().contains("DAILY"));
    }

    #[test]
    fn test_io_error_becomes_unavailable() {
        let err: Error = paddock_store::Error::Io(std::io::Error::other("disk gone")).into();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[test]
    fn test_bad_data_is_not_unavailable() {
        let err: Error = paddock_store::Error::InvalidTimestamp("bad".to_string()).into();
        assert!(matches!(err, Error::InvalidData(ref msg) if msg.contains("bad")));

        let err: Error = paddock_store::Error::Parse(ParseError::UnknownUnit("furlong".to_string())).into();
        assert!(matches!(err, Error::InvalidData(_)));
    }
}
