//! Work planning: which buckets a run has to recompute.
//!
//! A run looks at the hour footprints of the readings it is responsible for
//! and expands each footprint into the bucket containing it at every
//! configured granularity. Buckets at every granularity are unions of whole
//! UTC hours, so the hour is enough to place a reading.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use paddock_store::Footprint;
use paddock_types::{Bucket, Granularity, Quantity, RollupKey};

use crate::error::Result;

/// How a run chooses its buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Every bucket holding any reading.
    Backfill,
    /// Buckets touched by readings ingested since the last successful run.
    Incremental,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Backfill => f.write_str("backfill"),
            RunMode::Incremental => f.write_str("incremental"),
        }
    }
}

/// One bucket of one series to recompute.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkUnit {
    pub sensor: String,
    pub quantity: Quantity,
    pub bucket: Bucket,
}

impl WorkUnit {
    /// The merge key the unit writes.
    pub fn key(&self) -> RollupKey {
        RollupKey {
            bucket_start: self.bucket.start(),
            sensor: self.sensor.clone(),
            quantity: self.quantity,
            granularity: self.bucket.granularity(),
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.sensor, self.quantity, self.bucket)
    }
}

/// The work for one granularity within a run.
#[derive(Debug, Clone, PartialEq)]
pub struct GranularityPlan {
    pub granularity: Granularity,
    /// The granularity's high-water mark when the run was planned.
    pub mark: Option<OffsetDateTime>,
    /// Ingest window start (exclusive); `None` means from the beginning.
    pub after: Option<OffsetDateTime>,
    /// Deduplicated units, ordered by sensor, quantity and bucket start.
    pub units: Vec<WorkUnit>,
}

/// Everything one run will compute.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub mode: RunMode,
    /// Ingest window end (inclusive). Marks advance to this instant.
    pub as_of: OffsetDateTime,
    pub granularities: Vec<GranularityPlan>,
}

impl Plan {
    /// Total number of work units.
    pub fn unit_count(&self) -> usize {
        self.granularities.iter().map(|g| g.units.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.unit_count() == 0
    }
}

/// Expand footprints into the work units of one granularity.
///
/// Several footprints falling into the same bucket yield one unit, so no two
/// units of a plan ever write the same merge key.
pub fn plan_units(footprints: &[Footprint], granularity: Granularity) -> Result<Vec<WorkUnit>> {
    let mut units = BTreeSet::new();
    for footprint in footprints {
        units.insert(WorkUnit {
            sensor: footprint.sensor.clone(),
            quantity: footprint.quantity,
            bucket: Bucket::containing(granularity, footprint.hour)?,
        });
    }
    Ok(units.into_iter().collect())
}

/// Group granularities by their ingest window start.
///
/// Granularities whose marks agree can share one footprint query.
pub fn group_by_window(
    windows: &[(Granularity, Option<OffsetDateTime>)],
) -> BTreeMap<Option<OffsetDateTime>, Vec<Granularity>> {
    let mut groups: BTreeMap<Option<OffsetDateTime>, Vec<Granularity>> = BTreeMap::new();
    for (granularity, after) in windows {
        groups.entry(*after).or_default().push(*granularity);
    }
    groups
}
