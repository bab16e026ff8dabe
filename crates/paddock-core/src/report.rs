//! Run reports.

use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use paddock_types::Granularity;

use crate::scheduler::RunMode;

/// Per-granularity counts for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GranularityReport {
    pub granularity: Granularity,
    /// Units planned.
    pub units: usize,
    /// Units that upserted a record.
    pub written: usize,
    /// Units whose bucket held no readings.
    pub empty: usize,
    /// Units skipped because a reading's unit could not be converted.
    pub skipped: usize,
    /// Units that still failed after retries, timed out, or were never run.
    pub failed: usize,
    /// Whether this granularity's high-water mark moved to `as_of`.
    pub mark_advanced: bool,
}

impl GranularityReport {
    pub fn new(granularity: Granularity, units: usize) -> Self {
        Self {
            granularity,
            units,
            written: 0,
            empty: 0,
            skipped: 0,
            failed: 0,
            mark_advanced: false,
        }
    }

    /// Every planned unit ended written, empty or skipped.
    pub fn is_complete(&self) -> bool {
        self.written + self.empty + self.skipped == self.units
    }
}

/// Summary of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub mode: RunMode,
    /// Ingest window end. `None` when the store held no readings.
    #[serde(with = "time::serde::rfc3339::option")]
    pub as_of: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub cancelled: bool,
    pub granularities: Vec<GranularityReport>,
}

impl RunReport {
    pub(crate) fn new(mode: RunMode, as_of: Option<OffsetDateTime>) -> Self {
        Self {
            mode,
            as_of,
            started_at: OffsetDateTime::now_utc(),
            duration: Duration::ZERO,
            cancelled: false,
            granularities: Vec::new(),
        }
    }

    /// Counts for one granularity, if it was part of the run.
    pub fn granularity(&self, granularity: Granularity) -> Option<&GranularityReport> {
        self.granularities
            .iter()
            .find(|g| g.granularity == granularity)
    }

    pub fn units(&self) -> usize {
        self.granularities.iter().map(|g| g.units).sum()
    }

    pub fn written(&self) -> usize {
        self.granularities.iter().map(|g| g.written).sum()
    }

    pub fn empty(&self) -> usize {
        self.granularities.iter().map(|g| g.empty).sum()
    }

    pub fn skipped(&self) -> usize {
        self.granularities.iter().map(|g| g.skipped).sum()
    }

    pub fn failed(&self) -> usize {
        self.granularities.iter().map(|g| g.failed).sum()
    }

    /// The run was not cancelled and every granularity completed.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.granularities.iter().all(GranularityReport::is_complete)
    }
}

fn serialize_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}
