//! Error types for parsing and constructing paddock-types values.

use thiserror::Error;
use time::OffsetDateTime;

use crate::granularity::Granularity;

/// Errors that can occur when parsing or constructing domain values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The quantity name is not part of the catalogue.
    #[error("Unknown quantity: {0}")]
    UnknownQuantity(String),

    /// The unit symbol is not recognised.
    #[error("Unknown unit: '{0}'")]
    UnknownUnit(String),

    /// The granularity name is not recognised.
    #[error("Unknown granularity: {0}")]
    UnknownGranularity(String),

    /// A bucket start that is not aligned to its granularity.
    #[error("Invalid {granularity} bucket start: {start}")]
    InvalidBucket {
        granularity: Granularity,
        start: OffsetDateTime,
    },

    /// A timestamp outside the supported calendar range.
    #[error("Timestamp out of range: {0}")]
    OutOfRange(String),
}

/// Result type alias using paddock-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
