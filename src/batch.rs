//! Batch driver.
//!
//! Runs one trial per concurrency setting, strictly one after another so
//! only one node is ever alive. A node that exits early costs only its own
//! trial; a launch failure or a cancellation stops the batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::TrialSettings;
use crate::error::{ConfigError, MinebenchError, TrialError};
use crate::observability::{BatchSummary, Event, EventEmitter};
use crate::report::rank;
use crate::trial::{TrialConfig, TrialFailure, TrialResult, TrialRunner};

/// Everything a batch produced.
#[derive(Debug)]
pub struct BatchReport {
    /// Successful trials in run order.
    pub results: Vec<TrialResult>,
    /// Failed trials in run order.
    pub failures: Vec<TrialFailure>,
    /// Settings never started because the batch was aborted.
    pub skipped: Vec<u32>,
    /// Wall-clock duration of the batch.
    pub elapsed: Duration,
    abort: Option<TrialError>,
}

impl BatchReport {
    /// Number of trials that were started.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.results.len() + self.failures.len()
    }

    /// Whether a failure stopped the batch before every setting ran.
    #[must_use]
    pub const fn was_aborted(&self) -> bool {
        self.abort.is_some()
    }

    /// Converts the batch outcome into the process result.
    ///
    /// # Errors
    ///
    /// Returns the aborting trial error if there was one,
    /// [`MinebenchError::Interrupted`] if settings were skipped on
    /// cancellation, otherwise [`MinebenchError::BatchIncomplete`] if any
    /// trial failed.
    pub fn finish(self) -> Result<(), MinebenchError> {
        if let Some(error) = self.abort {
            return Err(error.into());
        }
        if !self.skipped.is_empty() {
            return Err(MinebenchError::Interrupted);
        }
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(MinebenchError::BatchIncomplete {
                failed: self.failures.len(),
                total: self.attempted(),
            })
        }
    }
}

#[cfg(test)]
impl BatchReport {
    pub(crate) const fn for_tests(
        results: Vec<TrialResult>,
        failures: Vec<TrialFailure>,
        skipped: Vec<u32>,
    ) -> Self {
        Self {
            results,
            failures,
            skipped,
            elapsed: Duration::ZERO,
            abort: None,
        }
    }
}

/// Sequential driver over a list of concurrency settings.
#[derive(Debug)]
pub struct BatchDriver {
    runner: TrialRunner,
    settings: TrialSettings,
    events: Arc<EventEmitter>,
}

impl BatchDriver {
    /// Creates a driver sharing `settings` across all trials.
    #[must_use]
    pub const fn new(runner: TrialRunner, settings: TrialSettings, events: Arc<EventEmitter>) -> Self {
        Self {
            runner,
            settings,
            events,
        }
    }

    /// Runs one trial per entry of `concurrency`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] before any trial starts if a
    /// setting or the shared trial settings are invalid. Trial failures do
    /// not return early; they are recorded in the [`BatchReport`].
    pub async fn run(
        &self,
        concurrency: &[u32],
        cancel: &CancellationToken,
    ) -> Result<BatchReport, ConfigError> {
        let configs = concurrency
            .iter()
            .map(|&n| {
                let config = TrialConfig::new(n, &self.settings);
                config.validate().map(|()| config)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let started = Instant::now();
        let total = configs.len();
        let mut report = BatchReport {
            results: Vec::with_capacity(total),
            failures: Vec::new(),
            skipped: Vec::new(),
            elapsed: Duration::ZERO,
            abort: None,
        };

        for (i, config) in configs.iter().enumerate() {
            if report.abort.is_some() || cancel.is_cancelled() {
                report.skipped.push(config.concurrency);
                continue;
            }

            info!(
                trial = i + 1,
                total,
                concurrency = config.concurrency,
                "starting trial"
            );
            match self.runner.run(config, cancel).await {
                Ok(result) => report.results.push(result),
                Err(error) => {
                    report
                        .failures
                        .push(TrialFailure::from_error(config.concurrency, &error));
                    if error.is_isolated() {
                        warn!(concurrency = config.concurrency, "continuing with next setting");
                    } else {
                        report.abort = Some(error);
                    }
                }
            }
        }

        report.elapsed = started.elapsed();
        if !report.skipped.is_empty() {
            warn!(skipped = ?report.skipped, "batch aborted");
        }

        let summary = BatchSummary {
            trials: report.attempted(),
            completed: report.results.len(),
            failed: report.failures.len(),
            best_concurrency: rank(&report.results).first().map(|r| r.concurrency),
            elapsed_secs: report.elapsed.as_secs_f64(),
        };
        info!(%summary, "batch complete");
        self.events.emit(Event::BatchCompleted {
            timestamp: Utc::now(),
            summary,
        });
        self.events.flush();

        Ok(report)
    }
}
