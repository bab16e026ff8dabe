//! Application state shared by the commands and the scheduler.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;

use paddock_core::{
    Aggregator, Driver, RunMode, RunReport, SqliteBackend, UnitRegistry, WatermarkStore,
};
use paddock_store::{ImportResult, RollupQuery, StoreStats};
use paddock_types::{AggregateRecord, Granularity};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::runner::Runner;

/// The opened database and the driver running over it.
pub struct App {
    config: Config,
    backend: Arc<SqliteBackend>,
    driver: Arc<Driver>,
}

impl App {
    /// Validate `config`, open its database and build the driver.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        info!("Opening database at {:?}", config.storage.path);
        let backend = Arc::new(SqliteBackend::open(&config.storage.path)?);
        let aggregator = Aggregator::new(UnitRegistry::standard(), &config.summary_table()?);
        let driver = Driver::with_backend(
            Arc::clone(&backend),
            aggregator,
            config.engine.driver_config(),
        )?;

        Ok(Self {
            config,
            backend,
            driver: Arc::new(driver),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn driver(&self) -> Arc<Driver> {
        Arc::clone(&self.driver)
    }

    /// Run the driver once over everything ingested so far.
    pub async fn run_once(&self, mode: RunMode) -> Result<RunReport> {
        Ok(self.driver.run(mode).await?)
    }

    /// A scheduler running incremental passes at the configured interval.
    pub fn runner(&self) -> Runner {
        Runner::new(self.driver(), self.config.engine.interval())
    }

    /// Import readings from a CSV file.
    pub async fn import_csv(&self, path: &Path) -> Result<ImportResult> {
        let file = File::open(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let store = self.backend.store();
        let result = store.lock().await.import_readings_csv(BufReader::new(file))?;
        Ok(result)
    }

    /// Stored rollups matching `query`.
    pub async fn rollups(&self, query: &RollupQuery) -> Result<Vec<AggregateRecord>> {
        let store = self.backend.store();
        let records = store.lock().await.query_rollups(query)?;
        Ok(records)
    }

    /// Write rollups matching `query` as CSV. Returns the record count.
    pub async fn export_rollups_csv<W: Write>(&self, query: &RollupQuery, writer: W) -> Result<usize> {
        let store = self.backend.store();
        let count = store.lock().await.export_rollups_csv(query, writer)?;
        Ok(count)
    }

    /// Row counts and the high-water mark of every configured granularity.
    pub async fn status(&self) -> Result<Status> {
        let (stats, rollups) = {
            let store = self.backend.store();
            let store = store.lock().await;
            let mut rollups = BTreeMap::new();
            for granularity in Granularity::ALL {
                rollups.insert(granularity, store.count_rollups(Some(granularity))?);
            }
            (store.stats()?, rollups)
        };

        let mut marks = Vec::with_capacity(self.config.engine.granularities.len());
        for &granularity in &self.config.engine.granularities {
            marks.push(MarkStatus {
                granularity,
                mark: self.backend.mark(granularity).await?,
            });
        }

        Ok(Status {
            database: self.config.storage.path.clone(),
            stats,
            rollups,
            marks,
        })
    }
}

/// Output of the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub database: PathBuf,
    pub stats: StoreStats,
    /// Stored rollup records per granularity.
    pub rollups: BTreeMap<Granularity, u64>,
    pub marks: Vec<MarkStatus>,
}

/// High-water mark of one granularity. `None` until its first complete run.
#[derive(Debug, Clone, Serialize)]
pub struct MarkStatus {
    pub granularity: Granularity,
    #[serde(with = "time::serde::rfc3339::option")]
    pub mark: Option<OffsetDateTime>,
}
