//! Single-trial orchestration.
//!
//! A trial launches the node at one concurrency setting, feeds its output
//! through the signal classifier and phase machine, and turns the counters
//! into an attempts-per-minute figure once the measurement window closes.
//! Every trial leaves an artifact directory behind: the raw log plus either
//! `result.json` or `failure.json`.

pub mod artifacts;
pub mod runner;

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TrialSettings;
use crate::error::{ConfigError, TrialError};
use crate::phase::{Counters, Phase, PhaseTimings};

pub use runner::TrialRunner;

/// Parameters of one trial. Immutable once the trial starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialConfig {
    /// Concurrency setting passed to the node.
    pub concurrency: u32,
    /// Length of the measurement window.
    pub measure: Duration,
    /// Warmup after thread start.
    pub warmup: Duration,
    /// Maximum wait for thread-start confirmation.
    pub hard_start_timeout: Duration,
    /// Grace period between termination request and kill.
    pub shutdown_grace: Duration,
    /// Phase clock interval.
    pub tick_interval: Duration,
}

impl TrialConfig {
    /// Combines a concurrency setting with shared trial settings.
    #[must_use]
    pub const fn new(concurrency: u32, settings: &TrialSettings) -> Self {
        Self {
            concurrency,
            measure: settings.measure,
            warmup: settings.warmup,
            hard_start_timeout: settings.hard_start_timeout,
            shutdown_grace: settings.shutdown_grace,
            tick_interval: settings.tick_interval,
        }
    }

    /// Time gates for the phase machine.
    #[must_use]
    pub const fn timings(&self) -> PhaseTimings {
        PhaseTimings {
            warmup: self.warmup,
            measure: self.measure,
            hard_start_timeout: self.hard_start_timeout,
        }
    }

    /// Checks the invariants a trial relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a zero concurrency or a
    /// zero measure, hard-start or tick duration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(invalid("concurrency", "0", "at least 1"));
        }
        for (field, value) in [
            ("measure", self.measure),
            ("hard_start_timeout", self.hard_start_timeout),
            ("tick_interval", self.tick_interval),
        ] {
            if value.is_zero() {
                return Err(invalid(field, "0s", "a positive duration"));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, expected: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

/// Outcome of a successful trial, persisted as `result.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    /// Concurrency setting under test.
    pub concurrency: u32,
    /// Attempts counted in the measurement window.
    pub attempts: u64,
    /// Measured window length in seconds.
    pub window_secs: f64,
    /// `attempts * 60 / window_secs`.
    pub attempts_per_min: f64,
    /// Whether a mine effect was seen.
    pub saw_mine_effect: bool,
    /// Whether the node confirmed its threads.
    pub saw_threads_started: bool,
    /// Thread count the node reported, if it did.
    pub threads_reported: Option<u32>,
    /// Directory holding the trial's artifacts.
    pub artifact_dir: PathBuf,
    /// When the node was launched.
    pub started_at: DateTime<Utc>,
}

/// Record of an aborted trial, persisted as `failure.json`.
#[derive(Debug, Clone, Serialize)]
pub struct TrialFailure {
    /// Concurrency setting under test.
    pub concurrency: u32,
    /// Error description.
    pub error: String,
    /// Node exit code, when it exited on its own.
    pub exit_code: Option<i32>,
    /// Phase the trial had reached.
    pub phase_reached: Option<Phase>,
    /// Counters at the time of failure.
    pub counters: Option<Counters>,
    /// Directory holding partial artifacts.
    pub artifact_dir: Option<PathBuf>,
}

impl TrialFailure {
    /// Builds the failure record for `error`.
    #[must_use]
    pub fn from_error(concurrency: u32, error: &TrialError) -> Self {
        let mut failure = Self {
            concurrency,
            error: error.to_string(),
            exit_code: None,
            phase_reached: None,
            counters: None,
            artifact_dir: None,
        };
        match error {
            TrialError::EarlyExit {
                exit_code,
                phase,
                counters,
                artifact_dir,
                ..
            } => {
                failure.exit_code = *exit_code;
                failure.phase_reached = Some(*phase);
                failure.counters = Some(*counters);
                failure.artifact_dir = Some(artifact_dir.clone());
            }
            TrialError::Cancelled {
                phase,
                counters,
                artifact_dir,
                ..
            } => {
                failure.phase_reached = Some(*phase);
                failure.counters = Some(*counters);
                failure.artifact_dir = Some(artifact_dir.clone());
            }
            TrialError::Artifacts { path, .. } => failure.artifact_dir = Some(path.clone()),
            TrialError::Launch { .. } => {}
        }
        failure
    }
}

/// Attempts per minute over a window of `window_secs`.
///
/// Zero attempts, or a window that is not positive, yield `0.0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn attempts_per_minute(attempts: u64, window_secs: f64) -> f64 {
    if attempts == 0 || window_secs <= 0.0 {
        return 0.0;
    }
    attempts as f64 * 60.0 / window_secs
}
