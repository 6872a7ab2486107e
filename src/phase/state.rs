//! Phase and counter values.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Lifecycle phase of a trial.
///
/// Variants are ordered: a trial only ever moves to a greater phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Node launched, waiting for thread-start confirmation.
    Starting,
    /// Threads running (or hard-start timeout hit); attempts are not yet
    /// counted toward the metric.
    Warming,
    /// Attempts count toward the published rate.
    Measuring,
    /// Window closed; the trial is over.
    Done,
}

impl Phase {
    /// Returns the phase that follows this one, or `None` for [`Phase::Done`].
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Starting => Some(Self::Warming),
            Self::Warming => Some(Self::Measuring),
            Self::Measuring => Some(Self::Done),
            Self::Done => None,
        }
    }

    /// Lowercase name used in logs, events and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Warming => "warming",
            Self::Measuring => "measuring",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running tallies for one trial.
///
/// Only [`PhaseMachine`](super::PhaseMachine) mutates these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Attempts seen after thread start, across all phases.
    pub attempts_total: u64,
    /// Attempts seen while measuring. Reset when `Measuring` is entered.
    pub attempts_in_window: u64,
    /// Whether a thread-start confirmation was seen.
    pub saw_threads_started: bool,
    /// Whether a mine effect was seen.
    pub saw_mine_effect: bool,
    /// Thread count from the most recent thread-start confirmation.
    pub threads_reported: Option<u32>,
}

/// Why a transition fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// The node confirmed its mining threads.
    ThreadsStarted,
    /// No confirmation arrived before the hard-start timeout.
    HardStartTimeout,
    /// The warmup period elapsed.
    WarmupElapsed,
    /// The measurement window elapsed.
    MeasureElapsed,
}

impl TransitionReason {
    /// Lowercase name used in logs and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ThreadsStarted => "threads_started",
            Self::HardStartTimeout => "hard_start_timeout",
            Self::WarmupElapsed => "warmup_elapsed",
            Self::MeasureElapsed => "measure_elapsed",
        }
    }
}

impl std::fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    /// Phase left.
    pub from: Phase,
    /// Phase entered.
    pub to: Phase,
    /// When the new phase was entered.
    pub at: Instant,
    /// Time since the node was launched.
    pub since_launch: Duration,
    /// What caused the change.
    pub reason: TransitionReason,
}
