//! Retry logic for store operations.
//!
//! Work units and run-level queries are retried with exponential backoff and
//! jitter when the failure is transient ([`Error::StoreUnavailable`] or
//! [`Error::Timeout`]). Everything else is returned immediately.
//!
//! # Example
//!
//! ```
//! use paddock_core::{RetryConfig, with_retry, Error};
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::new(3);
//!
//! let count = with_retry(&config, "count_rollups", || async {
//!     Ok::<_, Error>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 means no retries).
    pub max_retries: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries (for exponential backoff).
    pub max_delay: Duration,
    /// Backoff multiplier (1.0 = constant delay, 2.0 = double each time).
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// No retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Retry configuration for run-level queries (planning, marks).
    ///
    /// A failure here aborts the whole run, so it is worth waiting longer
    /// than for a single work unit.
    pub fn for_planning() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    // ==================== Builder Methods ====================

    /// Set maximum number of retries.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set initial delay.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Check for values that make the backoff meaningless.
    pub fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "backoff multiplier must be a finite number of at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(Error::InvalidConfig(format!(
                "initial retry delay {:?} exceeds max delay {:?}",
                self.initial_delay, self.max_delay
            )));
        }
        Ok(())
    }

    /// Calculate delay for a given attempt number.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let max_delay = self.max_delay.as_secs_f64();
        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        // A NaN or negative multiplier must not reach Duration::from_secs_f64
        let capped_delay = if base_delay.is_nan() {
            max_delay
        } else {
            base_delay.clamp(0.0, max_delay)
        };

        let final_delay = if self.jitter {
            // Up to 25% extra so parallel units do not retry in lockstep
            let jitter_factor = 1.0 + (rand::rng().random::<f64>() * 0.25);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Execute an async operation with retry logic.
///
/// Returns the result of the operation, or the last error if all retries
/// failed. Non-retryable errors are returned after the first attempt.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("{} succeeded after {} retries", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) if !is_retryable(&e) || attempt >= config.max_retries => return Err(e),
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    operation_name,
                    attempt + 1,
                    config.max_retries + 1,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Check if an error is retryable.
pub(crate) fn is_retryable(error: &Error) -> bool {
    match error {
        Error::StoreUnavailable(_) => true,
        Error::Timeout { .. } => true,
        Error::InvalidData(_) => false,
        Error::UnsupportedConversion { .. } => false,
        Error::InvalidBucket(_) => false,
        Error::Cancelled => false,
        Error::InvalidConfig(_) => false,
        Error::AlreadyRunning => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert!(config.jitter);
    }

    #[test]
    fn test_retry_config_none() {
        assert_eq!(RetryConfig::none().max_retries, 0);
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: false,
            max_retries: 5,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_is_capped() {
        let config = RetryConfig::new(10)
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(3))
            .jitter(false);
        assert_eq!(config.delay_for_attempt(8), Duration::from_secs(3));
    }

    #[test]
    fn test_bad_multiplier_never_panics() {
        let negative = RetryConfig::new(3).backoff_multiplier(-2.0).jitter(false);
        assert_eq!(negative.delay_for_attempt(1), Duration::ZERO);

        let nan = RetryConfig::new(3).backoff_multiplier(f64::NAN).jitter(false);
        assert_eq!(nan.delay_for_attempt(1), nan.max_delay);
    }

    #[test]
    fn test_validate_rejects_bad_backoff() {
        assert!(RetryConfig::default().validate().is_ok());
        assert!(RetryConfig::none().validate().is_ok());
        assert!(matches!(
            RetryConfig::new(3).backoff_multiplier(-1.0).validate(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(RetryConfig::new(3).backoff_multiplier(f64::NAN).validate().is_err());
        assert!(
            RetryConfig::new(3)
                .initial_delay(Duration::from_secs(10))
                .max_delay(Duration::from_secs(1))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let config = RetryConfig::new(3).initial_delay(Duration::from_millis(100));
        for _ in 0..50 {
            let delay = config.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(125));
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&Error::StoreUnavailable("locked".to_string())));
        assert!(is_retryable(&Error::Timeout {
            operation: "aggregate".to_string(),
            duration: Duration::from_secs(1),
        }));
        assert!(!is_retryable(&Error::InvalidData("unit 'furlong'".to_string())));
        assert!(!is_retryable(&Error::Cancelled));
        assert!(!is_retryable(&Error::InvalidConfig("workers".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_recovers() {
        let attempts = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::new(3);

        let result = with_retry(&config, "flaky", || {
            let attempts = Arc::clone(&attempts);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::StoreUnavailable("busy".to_string()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_gives_up() {
        let attempts = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::new(2);

        let result: Result<()> = with_retry(&config, "down", || {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(Error::StoreUnavailable("down".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_fatal() {
        let attempts = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::new(5);

        let result: Result<()> = with_retry(&config, "fatal", || {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(Error::InvalidConfig("bad".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
