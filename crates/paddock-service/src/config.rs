//! Service configuration.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use paddock_core::{DriverConfig, RetryConfig, SummaryFn, SummaryTable};
use paddock_types::{Granularity, Quantity};

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Aggregation engine settings.
    pub engine: EngineConfig,
    /// Summary strategy overrides, keyed by quantity name.
    pub summaries: BTreeMap<String, String>,
    /// Log output settings.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Storage path is not empty
    /// - Engine granularities are present and unique
    /// - Worker count, timeouts and the run interval are within bounds
    /// - Retry delays and multiplier are consistent
    /// - Summary overrides name known quantities and strategies
    /// - The log level is a valid level name
    ///
    /// # Example
    ///
    /// ```
    /// use paddock_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.storage.validate());
        errors.extend(self.engine.validate());
        errors.extend(self.logging.validate());
        let (_, summary_errors) = self.summary_overrides();
        errors.extend(summary_errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// The default strategy table with the configured overrides applied.
    pub fn summary_table(&self) -> Result<SummaryTable, ConfigError> {
        let (overrides, errors) = self.summary_overrides();
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }
        Ok(SummaryTable::default().with_overrides(overrides))
    }

    fn summary_overrides(&self) -> (Vec<(Quantity, SummaryFn)>, Vec<ValidationError>) {
        let mut overrides = Vec::new();
        let mut errors = Vec::new();

        for (name, strategy) in &self.summaries {
            let field = format!("summaries.{name}");
            let quantity = name.parse::<Quantity>().map_err(|e| ValidationError {
                field: field.clone(),
                message: e.to_string(),
            });
            let summary = strategy.parse::<SummaryFn>().map_err(|e| ValidationError {
                field: field.clone(),
                message: e.to_string(),
            });
            match (quantity, summary) {
                (Ok(quantity), Ok(summary)) => overrides.push((quantity, summary)),
                (quantity, summary) => {
                    errors.extend(quantity.err());
                    errors.extend(summary.err());
                }
            }
        }

        (overrides, errors)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: paddock_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Minimum interval between scheduled runs in seconds.
pub const MIN_RUN_INTERVAL: u64 = 10;
/// Maximum interval between scheduled runs in seconds (1 day).
pub const MAX_RUN_INTERVAL: u64 = 86_400;
/// Maximum per-unit timeout in seconds.
pub const MAX_UNIT_TIMEOUT: u64 = 3600;

/// Aggregation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Granularities maintained by each run.
    pub granularities: Vec<Granularity>,
    /// Worker pool size.
    pub workers: usize,
    /// Deadline for one attempt at one work unit, in seconds.
    pub unit_timeout_secs: u64,
    /// Seconds between scheduled incremental runs.
    pub interval_secs: u64,
    /// Work unit retry settings.
    pub retry: RetrySettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self {
            granularities: Granularity::ALL.to_vec(),
            workers: cpus * 4,
            unit_timeout_secs: 30,
            interval_secs: 300,
            retry: RetrySettings::default(),
        }
    }
}

impl EngineConfig {
    /// Validate engine configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.granularities.is_empty() {
            errors.push(ValidationError {
                field: "engine.granularities".to_string(),
                message: "at least one granularity is required".to_string(),
            });
        }
        let mut seen = BTreeSet::new();
        for granularity in &self.granularities {
            if !seen.insert(*granularity) {
                errors.push(ValidationError {
                    field: "engine.granularities".to_string(),
                    message: format!("duplicate granularity '{granularity}'"),
                });
            }
        }

        if self.workers == 0 {
            errors.push(ValidationError {
                field: "engine.workers".to_string(),
                message: "worker count must be at least 1".to_string(),
            });
        }

        if self.unit_timeout_secs == 0 || self.unit_timeout_secs > MAX_UNIT_TIMEOUT {
            errors.push(ValidationError {
                field: "engine.unit_timeout_secs".to_string(),
                message: format!(
                    "unit timeout {} is out of range (1 to {} seconds)",
                    self.unit_timeout_secs, MAX_UNIT_TIMEOUT
                ),
            });
        }

        if self.interval_secs < MIN_RUN_INTERVAL {
            errors.push(ValidationError {
                field: "engine.interval_secs".to_string(),
                message: format!(
                    "run interval {} is too short (minimum {} seconds)",
                    self.interval_secs, MIN_RUN_INTERVAL
                ),
            });
        } else if self.interval_secs > MAX_RUN_INTERVAL {
            errors.push(ValidationError {
                field: "engine.interval_secs".to_string(),
                message: format!(
                    "run interval {} is too long (maximum {} seconds / 1 day)",
                    self.interval_secs, MAX_RUN_INTERVAL
                ),
            });
        }

        errors.extend(self.retry.validate());
        errors
    }

    /// Driver settings for these values.
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig::default()
            .granularities(self.granularities.iter().copied())
            .workers(self.workers)
            .unit_timeout(Duration::from_secs(self.unit_timeout_secs))
            .retry(self.retry.to_retry_config())
    }

    /// Interval between scheduled runs.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Retry settings for single work units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Add up to 25% random delay.
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_retries: retry.max_retries,
            initial_delay_ms: retry.initial_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
            backoff_multiplier: retry.backoff_multiplier,
            jitter: retry.jitter,
        }
    }
}

impl RetrySettings {
    /// Validate retry settings.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            errors.push(ValidationError {
                field: "engine.retry.backoff_multiplier".to_string(),
                message: format!(
                    "backoff multiplier {} must be at least 1.0",
                    self.backoff_multiplier
                ),
            });
        }
        if self.initial_delay_ms > self.max_delay_ms {
            errors.push(ValidationError {
                field: "engine.retry.initial_delay_ms".to_string(),
                message: format!(
                    "initial delay {}ms exceeds maximum delay {}ms",
                    self.initial_delay_ms, self.max_delay_ms
                ),
            });
        }

        errors
    }

    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .backoff_multiplier(self.backoff_multiplier)
            .jitter(self.jitter)
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Default level for the paddock crates. `RUST_LOG` directives still apply.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.level.parse::<tracing::Level>().is_err() {
            errors.push(ValidationError {
                field: "logging.level".to_string(),
                message: format!(
                    "unknown log level '{}': expected trace, debug, info, warn or error",
                    self.level
                ),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `engine.workers` or `summaries.WindSpeed`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("paddock")
        .join("service.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation_fields(config: &Config) -> Vec<String> {
        match config.validate() {
            Err(ConfigError::Validation(errors)) => errors.into_iter().map(|e| e.field).collect(),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(()) => Vec::new(),
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.storage.path, paddock_store::default_db_path());
        assert_eq!(config.engine.granularities, Granularity::ALL.to_vec());
        assert_eq!(config.engine.interval_secs, 300);
        assert!(config.summaries.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let toml = r#"
            [engine]
            granularities = ["DAILY", "MONTHLY"]
            workers = 8

            [summaries]
            AirHumidity = "max"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.engine.granularities,
            vec![Granularity::Daily, Granularity::Monthly]
        );
        assert_eq!(config.engine.workers, 8);
        assert_eq!(config.engine.unit_timeout_secs, 30);
        assert_eq!(config.engine.retry, RetrySettings::default());
        assert!(!config.logging.json);

        let table = config.summary_table().unwrap();
        assert_eq!(table.get(Quantity::AirHumidity), SummaryFn::Max);
        assert_eq!(table.get(Quantity::RainfallHourly), SummaryFn::Sum);
    }

    #[test]
    fn test_driver_config_from_engine() {
        let engine = EngineConfig {
            granularities: vec![Granularity::Hourly],
            workers: 2,
            unit_timeout_secs: 5,
            interval_secs: 60,
            retry: RetrySettings {
                max_retries: 1,
                initial_delay_ms: 50,
                max_delay_ms: 500,
                backoff_multiplier: 3.0,
                jitter: false,
            },
        };

        let driver = engine.driver_config();
        assert_eq!(driver.granularities, vec![Granularity::Hourly]);
        assert_eq!(driver.workers, 2);
        assert_eq!(driver.unit_timeout, Duration::from_secs(5));
        assert_eq!(driver.retry.max_retries, 1);
        assert_eq!(driver.retry.initial_delay, Duration::from_millis(50));
        assert!(!driver.retry.jitter);
        assert_eq!(engine.interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_validation_reports_every_field() {
        let mut config = Config::default();
        config.engine.workers = 0;
        config.engine.interval_secs = 1;
        config.engine.granularities = vec![Granularity::Daily, Granularity::Daily];
        config.engine.retry.backoff_multiplier = 0.5;
        config.logging.level = "loud".to_string();
        config
            .summaries
            .insert("Co2".to_string(), "mean".to_string());
        config
            .summaries
            .insert("WindSpeed".to_string(), "median".to_string());

        let fields = validation_fields(&config);
        for field in [
            "engine.workers",
            "engine.interval_secs",
            "engine.granularities",
            "engine.retry.backoff_multiplier",
            "logging.level",
            "summaries.Co2",
            "summaries.WindSpeed",
        ] {
            assert!(fields.iter().any(|f| f == field), "missing {field} in {fields:?}");
        }
        assert!(config.summary_table().is_err());
    }

    #[test]
    fn test_empty_storage_path() {
        let mut config = Config::default();
        config.storage.path = PathBuf::new();
        assert_eq!(validation_fields(&config), vec!["storage.path".to_string()]);
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("service.toml");

        let mut config = Config::default();
        config.storage.path = PathBuf::from("/tmp/paddock-test.db");
        config.engine.granularities = vec![Granularity::Daily, Granularity::Weekly];
        config.engine.interval_secs = 120;
        config.logging.json = true;
        config
            .summaries
            .insert("WindDirection".to_string(), "circular_mean".to_string());

        config.save(&config_path).unwrap();
        let loaded = Config::load_validated(&config_path).unwrap();

        assert_eq!(loaded.storage.path, PathBuf::from("/tmp/paddock-test.db"));
        assert_eq!(
            loaded.engine.granularities,
            vec![Granularity::Daily, Granularity::Weekly]
        );
        assert_eq!(loaded.engine.interval_secs, 120);
        assert!(loaded.logging.json);
        assert_eq!(loaded.summaries, config.summaries);
    }

    #[test]
    fn test_load_reports_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("broken.toml");
        std::fs::write(&path, "[engine\nworkers = 1").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));

        let missing = Config::load(temp_dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
