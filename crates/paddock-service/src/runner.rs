//! Periodic incremental runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use paddock_core::{Driver, Error, RunMode};

/// Runs the driver in incremental mode on a fixed interval until cancelled.
pub struct Runner {
    driver: Arc<Driver>,
    interval: Duration,
}

impl Runner {
    pub fn new(driver: Arc<Driver>, interval: Duration) -> Self {
        Self { driver, interval }
    }

    /// Token that stops the loop. Cancelling it also stops dispatch inside
    /// an in-flight run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.driver.cancellation_token()
    }

    /// Spawn the loop onto the runtime.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Run until the driver's cancellation token fires.
    ///
    /// The first pass starts immediately. A pass that overruns the interval
    /// delays the next one rather than queueing catch-up passes.
    pub async fn run(&self) {
        let cancel = self.driver.cancellation_token();
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures = 0u32;

        info!("Starting scheduled runs every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Scheduler cancelled, shutting down");
                    break;
                }
                _ = ticker.tick() => {}
            }

            match self.driver.run(RunMode::Incremental).await {
                Ok(report) => {
                    consecutive_failures = 0;
                    if report.failed() > 0 {
                        warn!(
                            "{} work units failed, their granularities will be replayed",
                            report.failed()
                        );
                    } else {
                        debug!("Scheduled run wrote {} records", report.written());
                    }
                }
                Err(Error::AlreadyRunning) => {
                    debug!("Previous run still in progress, skipping this tick");
                }
                Err(e) => {
                    consecutive_failures += 1;
                    if consecutive_failures <= 3 {
                        warn!("Scheduled run failed: {} (attempt {})", e, consecutive_failures);
                    } else if consecutive_failures == 4 {
                        error!(
                            "Scheduled run failed {} times in a row, will continue trying silently",
                            consecutive_failures
                        );
                    }
                }
            }
        }
    }
}
