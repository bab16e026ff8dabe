//! Run driver: plans work units and executes them on a bounded worker pool.
//!
//! A run reads each configured granularity's high-water mark, expands the
//! footprints of readings ingested since then into work units, and recomputes
//! every unit with the [`Aggregator`]. Units are independent, idempotent and
//! unique per merge key within a run, so they run in parallel without
//! coordination.
//!
//! Marks advance per granularity: a granularity whose units all ended
//! written, empty or skipped moves its mark to the run's `as_of` instant,
//! while one with a failed unit keeps its old mark and replays the whole
//! window next time.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use paddock_core::{Aggregator, Driver, DriverConfig, MemoryBackend, RunMode};
//!
//! # async fn example() -> paddock_core::Result<()> {
//! let backend = Arc::new(MemoryBackend::new());
//! let driver = Driver::with_backend(backend, Aggregator::default(), DriverConfig::default())?;
//!
//! let report = driver.run(RunMode::Incremental).await?;
//! println!("{} units written", report.written());
//! # Ok(())
//! # }
//! ```

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use paddock_types::Granularity;

use crate::aggregator::{Aggregator, UnitOutcome};
use crate::error::{Error, Result};
use crate::report::{GranularityReport, RunReport};
use crate::retry::{RetryConfig, with_retry};
use crate::scheduler::{GranularityPlan, Plan, RunMode, WorkUnit, group_by_window, plan_units};
use crate::traits::{ReadingSource, RollupSink, WatermarkStore};

/// Configuration for a [`Driver`].
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Granularities maintained by each run.
    pub granularities: Vec<Granularity>,
    /// Maximum number of units computed at once.
    pub workers: usize,
    /// Deadline for one attempt at one unit.
    pub unit_timeout: Duration,
    /// Retry policy for single units.
    pub retry: RetryConfig,
    /// Retry policy for mark reads and writes and planning queries.
    pub planning_retry: RetryConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self {
            granularities: Granularity::ALL.to_vec(),
            workers: cpus * 4,
            unit_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            planning_retry: RetryConfig::for_planning(),
        }
    }
}

impl DriverConfig {
    /// Set the maintained granularities.
    #[must_use]
    pub fn granularities(mut self, granularities: impl IntoIterator<Item = Granularity>) -> Self {
        self.granularities = granularities.into_iter().collect();
        self
    }

    /// Set the worker pool size.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the per-attempt unit deadline.
    #[must_use]
    pub fn unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout = timeout;
        self
    }

    /// Set the unit retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the planning retry policy.
    #[must_use]
    pub fn planning_retry(mut self, retry: RetryConfig) -> Self {
        self.planning_retry = retry;
        self
    }

    /// Check the configuration for values a driver cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.granularities.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one granularity is required".to_string(),
            ));
        }
        let mut seen = Vec::with_capacity(self.granularities.len());
        for &granularity in &self.granularities {
            if seen.contains(&granularity) {
                return Err(Error::InvalidConfig(format!(
                    "granularity {granularity} is listed more than once"
                )));
            }
            seen.push(granularity);
        }
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be at least 1".to_string()));
        }
        if self.unit_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "unit timeout must be greater than zero".to_string(),
            ));
        }
        self.retry.validate()?;
        self.planning_retry.validate()
    }
}

/// Shared state handed to every unit task of one run.
struct UnitContext {
    source: Arc<dyn ReadingSource>,
    sink: Arc<dyn RollupSink>,
    aggregator: Arc<Aggregator>,
    cancel: CancellationToken,
    retry: RetryConfig,
    unit_timeout: Duration,
}

/// Granularity index, the unit, and how it ended.
type UnitResult = (usize, WorkUnit, Result<UnitOutcome>);

/// Plans and executes aggregation runs.
pub struct Driver {
    source: Arc<dyn ReadingSource>,
    sink: Arc<dyn RollupSink>,
    marks: Arc<dyn WatermarkStore>,
    aggregator: Arc<Aggregator>,
    config: DriverConfig,
    running: AtomicBool,
    cancel: CancellationToken,
}

impl Driver {
    /// Create a driver over separate reading, rollup and mark stores.
    pub fn new(
        source: Arc<dyn ReadingSource>,
        sink: Arc<dyn RollupSink>,
        marks: Arc<dyn WatermarkStore>,
        aggregator: Aggregator,
        config: DriverConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            sink,
            marks,
            aggregator: Arc::new(aggregator),
            config,
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    /// Create a driver over one backend serving all three roles.
    pub fn with_backend<B>(backend: Arc<B>, aggregator: Aggregator, config: DriverConfig) -> Result<Self>
    where
        B: ReadingSource + RollupSink + WatermarkStore + 'static,
    {
        Self::new(backend.clone(), backend.clone(), backend, aggregator, config)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Token that stops dispatch of further units when cancelled.
    ///
    /// Cancellation is permanent: every later run on this driver reports
    /// itself cancelled without computing anything.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the current and all future runs.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run up to the newest ingest time in the reading store.
    ///
    /// With no readings stored there is nothing to do, and the report has
    /// `as_of: None` and no units.
    pub async fn run(&self, mode: RunMode) -> Result<RunReport> {
        let _guard = RunGuard::acquire(&self.running)?;
        let started = Instant::now();

        let latest = with_retry(&self.config.planning_retry, "latest_recorded_at", || {
            self.source.latest_recorded_at()
        })
        .await?;

        match latest {
            Some(as_of) => self.run_locked(mode, as_of, started).await,
            None => {
                info!("No readings stored, nothing to aggregate");
                let mut report = RunReport::new(mode, None);
                report.granularities = self
                    .config
                    .granularities
                    .iter()
                    .map(|g| GranularityReport::new(*g, 0))
                    .collect();
                report.duration = started.elapsed();
                Ok(report)
            }
        }
    }

    /// Run over readings ingested up to and including `as_of`.
    pub async fn run_at(&self, mode: RunMode, as_of: OffsetDateTime) -> Result<RunReport> {
        let _guard = RunGuard::acquire(&self.running)?;
        self.run_locked(mode, as_of, Instant::now()).await
    }

    /// Work a run ending at `as_of` would do, without doing it.
    pub async fn plan(&self, mode: RunMode, as_of: OffsetDateTime) -> Result<Plan> {
        let mut windows = Vec::with_capacity(self.config.granularities.len());
        let mut current_marks = Vec::with_capacity(self.config.granularities.len());
        for &granularity in &self.config.granularities {
            let mark = with_retry(&self.config.planning_retry, "read mark", || {
                self.marks.mark(granularity)
            })
            .await?;
            let after = match mode {
                RunMode::Backfill => None,
                RunMode::Incremental => mark,
            };
            windows.push((granularity, after));
            current_marks.push((granularity, mark));
        }

        let mut granularities = Vec::with_capacity(windows.len());
        for (after, group) in group_by_window(&windows) {
            let footprints = if after.is_some_and(|a| a >= as_of) {
                Vec::new()
            } else {
                with_retry(&self.config.planning_retry, "footprints", || {
                    self.source.footprints(after, as_of)
                })
                .await?
            };
            debug!("{} footprints ingested after {:?}", footprints.len(), after);

            for granularity in group {
                let mark = current_marks
                    .iter()
                    .find(|(g, _)| *g == granularity)
                    .and_then(|(_, m)| *m);
                granularities.push(GranularityPlan {
                    granularity,
                    mark,
                    after,
                    units: plan_units(&footprints, granularity)?,
                });
            }
        }
        granularities.sort_by_key(|g| g.granularity);

        Ok(Plan {
            mode,
            as_of,
            granularities,
        })
    }

    async fn run_locked(
        &self,
        mode: RunMode,
        as_of: OffsetDateTime,
        started: Instant,
    ) -> Result<RunReport> {
        info!("Starting {} run as of {}", mode, as_of);
        let plan = self.plan(mode, as_of).await?;
        info!("Planned {} work units", plan.unit_count());

        let mut report = self.execute(&plan).await?;
        report.duration = started.elapsed();

        info!(
            "Finished {} run: {} written, {} empty, {} skipped, {} failed in {:?}",
            mode,
            report.written(),
            report.empty(),
            report.skipped(),
            report.failed(),
            report.duration
        );
        Ok(report)
    }

    async fn execute(&self, plan: &Plan) -> Result<RunReport> {
        let mut report = RunReport::new(plan.mode, Some(plan.as_of));
        report.granularities = plan
            .granularities
            .iter()
            .map(|g| GranularityReport::new(g.granularity, g.units.len()))
            .collect();

        let context = Arc::new(UnitContext {
            source: Arc::clone(&self.source),
            sink: Arc::clone(&self.sink),
            aggregator: Arc::clone(&self.aggregator),
            cancel: self.cancel.clone(),
            retry: self.config.retry.clone(),
            unit_timeout: self.config.unit_timeout,
        });
        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks: JoinSet<UnitResult> = JoinSet::new();
        let mut fatal: Option<Error> = None;
        let mut cancelled = false;

        'dispatch: for (index, granularity_plan) in plan.granularities.iter().enumerate() {
            for unit in &granularity_plan.units {
                while let Some(joined) = tasks.try_join_next() {
                    record_unit(&mut report, joined, &mut fatal);
                }
                if fatal.is_some() {
                    break 'dispatch;
                }

                let permit = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
                };
                let Some(permit) = permit else {
                    cancelled = true;
                    break 'dispatch;
                };

                let context = Arc::clone(&context);
                let unit = unit.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    let outcome = process_unit(&context, &unit).await;
                    (index, unit, outcome)
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            record_unit(&mut report, joined, &mut fatal);
        }

        if let Some(e) = fatal {
            error!("Run aborted, no marks advanced: {}", e);
            return Err(e);
        }

        for counts in &mut report.granularities {
            counts.failed = counts.units - counts.written - counts.empty - counts.skipped;
        }

        report.cancelled = cancelled || self.cancel.is_cancelled();
        if report.cancelled {
            warn!("Run cancelled, no marks advanced");
            return Ok(report);
        }

        for (granularity_plan, counts) in plan.granularities.iter().zip(&mut report.granularities) {
            if !counts.is_complete() {
                warn!(
                    "{} mark held at {:?}: {} of {} units failed",
                    counts.granularity, granularity_plan.mark, counts.failed, counts.units
                );
                continue;
            }
            if granularity_plan.mark.is_some_and(|mark| mark >= plan.as_of) {
                continue;
            }

            let granularity = counts.granularity;
            match with_retry(&self.config.planning_retry, "write mark", || {
                self.marks.set_mark(granularity, plan.as_of)
            })
            .await
            {
                Ok(()) => {
                    debug!("{} mark advanced to {}", granularity, plan.as_of);
                    counts.mark_advanced = true;
                }
                Err(e) => warn!("Failed to advance {} mark: {}", granularity, e),
            }
        }

        Ok(report)
    }
}

/// Compute one unit with per-attempt deadline and retries.
async fn process_unit(context: &UnitContext, unit: &WorkUnit) -> Result<UnitOutcome> {
    let label = unit.to_string();
    with_retry(&context.retry, &label, move || attempt_unit(context, unit)).await
}

async fn attempt_unit(context: &UnitContext, unit: &WorkUnit) -> Result<UnitOutcome> {
    if context.cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let work = context.aggregator.aggregate_bucket(
        context.source.as_ref(),
        context.sink.as_ref(),
        &unit.sensor,
        unit.quantity,
        &unit.bucket,
    );
    match timeout(context.unit_timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: format!("aggregate {unit}"),
            duration: context.unit_timeout,
        }),
    }
}

fn record_unit(
    report: &mut RunReport,
    joined: std::result::Result<UnitResult, JoinError>,
    fatal: &mut Option<Error>,
) {
    let (index, unit, outcome) = match joined {
        Ok(done) => done,
        Err(e) => {
            error!("Work unit task failed: {}", e);
            return;
        }
    };

    let counts = &mut report.granularities[index];
    match outcome {
        Ok(UnitOutcome::Written(_)) => counts.written += 1,
        Ok(UnitOutcome::Empty) => counts.empty += 1,
        Err(e @ Error::UnsupportedConversion { .. }) => {
            warn!("Skipping {}: {}", unit, e);
            counts.skipped += 1;
        }
        Err(e @ Error::InvalidBucket(_)) => {
            error!("{}: {}", unit, e);
            fatal.get_or_insert(e);
        }
        Err(Error::Cancelled) => debug!("{} cancelled before it ran", unit),
        Err(e) => warn!("{} failed: {}", unit, e),
    }
}

/// Clears the running flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::AlreadyRunning)?;
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
