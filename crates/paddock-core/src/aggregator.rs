//! Bucket aggregation: readings in, one rollup record out.

use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use paddock_types::{AggregateRecord, Bucket, Granularity, Quantity, Reading, Unit};

use crate::error::{Error, Result};
use crate::summary::{SummaryFn, SummaryTable};
use crate::traits::{ReadingSource, RollupSink};
use crate::units::UnitRegistry;

/// What aggregating one bucket produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum UnitOutcome {
    /// A record was computed and upserted.
    Written(AggregateRecord),
    /// The bucket holds no readings. Nothing was written.
    Empty,
}

/// Canonical unit and summary strategy for one quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Resolved {
    canonical: Unit,
    summary: SummaryFn,
}

/// Computes rollup records for single buckets.
///
/// Strategy and canonical unit are resolved per quantity when the aggregator
/// is built, so a run never consults the summary table or registry lookups
/// for anything but conversions.
#[derive(Debug, Clone)]
pub struct Aggregator {
    registry: UnitRegistry,
    resolved: BTreeMap<Quantity, Resolved>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(UnitRegistry::standard(), &SummaryTable::default())
    }
}

impl Aggregator {
    /// Build an aggregator from a unit registry and strategy table.
    ///
    /// Quantities without a canonical unit in `registry` cannot be
    /// aggregated; their buckets fail with [`Error::UnsupportedConversion`].
    pub fn new(registry: UnitRegistry, table: &SummaryTable) -> Self {
        let resolved = Quantity::ALL
            .into_iter()
            .filter_map(|quantity| {
                registry.canonical_unit(quantity).map(|canonical| {
                    (
                        quantity,
                        Resolved {
                            canonical,
                            summary: table.get(quantity),
                        },
                    )
                })
            })
            .collect();

        Self { registry, resolved }
    }

    /// The strategy in use for a quantity.
    pub fn summary_for(&self, quantity: Quantity) -> Option<SummaryFn> {
        self.resolved.get(&quantity).map(|r| r.summary)
    }

    /// Summarize readings of one quantity in its canonical unit.
    ///
    /// Returns the value, the canonical unit and the number of readings, or
    /// `None` for an empty slice. Readings are converted one by one before
    /// any arithmetic, then summarized in ascending value order, so the
    /// result does not depend on the order of `readings`.
    pub fn summarize(
        &self,
        quantity: Quantity,
        readings: &[Reading],
    ) -> Result<Option<(f64, Unit, u32)>> {
        let resolved = self.resolve(quantity, readings.first().map(|r| r.unit))?;

        let mut values = readings
            .iter()
            .map(|r| self.registry.to_canonical(r.value, r.unit, quantity))
            .collect::<Result<Vec<f64>>>()?;
        values.sort_by(f64::total_cmp);

        Ok(resolved
            .summary
            .apply(&values)
            .map(|value| (value, resolved.canonical, values.len() as u32)))
    }

    /// Recompute one bucket from raw readings and upsert the result.
    ///
    /// `start` must be the canonical start of a `granularity` bucket,
    /// otherwise the call fails with [`Error::InvalidBucket`] before any
    /// read.
    pub async fn aggregate(
        &self,
        source: &dyn ReadingSource,
        sink: &dyn RollupSink,
        sensor: &str,
        quantity: Quantity,
        granularity: Granularity,
        start: OffsetDateTime,
    ) -> Result<UnitOutcome> {
        let bucket = Bucket::new(granularity, start)?;
        self.aggregate_bucket(source, sink, sensor, quantity, &bucket)
            .await
    }

    /// Like [`aggregate`](Self::aggregate), for an already validated bucket.
    pub async fn aggregate_bucket(
        &self,
        source: &dyn ReadingSource,
        sink: &dyn RollupSink,
        sensor: &str,
        quantity: Quantity,
        bucket: &Bucket,
    ) -> Result<UnitOutcome> {
        let readings = source
            .readings(sensor, quantity, bucket.start(), bucket.end())
            .await?;

        let Some((value, unit, sample_count)) = self.summarize(quantity, &readings)? else {
            debug!("{} {} {}: no readings", sensor, quantity, bucket);
            return Ok(UnitOutcome::Empty);
        };

        let record = AggregateRecord {
            bucket_start: bucket.start(),
            granularity: bucket.granularity(),
            sensor: sensor.to_string(),
            quantity,
            value,
            unit,
            sample_count,
        };
        sink.upsert(&record).await?;

        debug!(
            "{} {} {}: {} {} from {} readings",
            sensor, quantity, bucket, value, unit, sample_count
        );
        Ok(UnitOutcome::Written(record))
    }

    fn resolve(&self, quantity: Quantity, sample_unit: Option<Unit>) -> Result<Resolved> {
        self.resolved
            .get(&quantity)
            .copied()
            .ok_or_else(|| {
                let from = sample_unit.unwrap_or(Unit::Index);
                Error::UnsupportedConversion {
                    quantity,
                    from,
                    to: from,
                }
            })
    }
}
