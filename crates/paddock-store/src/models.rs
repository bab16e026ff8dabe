//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use paddock_types::{Quantity, Reading, Unit};

/// A reading stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredReading {
    /// Database row ID.
    pub id: i64,
    /// Sensor identifier.
    pub sensor: String,
    pub quantity: Quantity,
    /// When the measurement was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub value: f64,
    pub unit: Unit,
    /// When the reading was written to the store.
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

impl StoredReading {
    /// Convert to a Reading.
    pub fn to_reading(&self) -> Reading {
        Reading {
            sensor: self.sensor.clone(),
            quantity: self.quantity,
            timestamp: self.timestamp,
            value: self.value,
            unit: self.unit,
        }
    }
}

/// The hour-resolution footprint of one or more readings.
///
/// Every rollup bucket is a union of whole hours, so footprints are enough to
/// decide which buckets a set of readings touches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Footprint {
    pub sensor: String,
    pub quantity: Quantity,
    /// Start of the hour containing the readings.
    #[serde(with = "time::serde::rfc3339")]
    pub hour: OffsetDateTime,
}

/// A persisted high-water mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighWaterMark {
    /// What the mark tracks, e.g. a granularity name.
    pub scope: String,
    /// Readings recorded at or before this instant have been aggregated.
    #[serde(with = "time::serde::rfc3339")]
    pub mark: OffsetDateTime,
    /// When the mark was last written.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
