//! Structured event stream.
//!
//! Discrete, typed events emitted while a batch runs. Events are written as
//! newline-delimited JSON (JSONL) with a monotonically increasing sequence
//! number, so a consumer tailing the file can follow a long run trial by
//! trial.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::phase::{Counters, Phase, TransitionReason};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Totals emitted when a batch finishes.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Trials attempted.
    pub trials: usize,
    /// Trials that produced a result.
    pub completed: usize,
    /// Trials that failed.
    pub failed: usize,
    /// Best concurrency setting by attempts per minute, if any completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_concurrency: Option<u32>,
    /// Wall-clock duration of the batch in seconds.
    pub elapsed_secs: f64,
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "trials={} completed={} failed={} elapsed={:.1}s",
            self.trials, self.completed, self.failed, self.elapsed_secs,
        )?;
        if let Some(best) = self.best_concurrency {
            write!(f, " best={best}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event emitted during a benchmark run.
///
/// Each variant is tagged with `"type"` when serialized to JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A trial launched its node.
    TrialStarted {
        /// When the node was launched.
        timestamp: DateTime<Utc>,
        /// Concurrency setting under test.
        concurrency: u32,
        /// Per-trial artifact directory.
        artifact_dir: PathBuf,
        /// Shell-quoted node command.
        command: String,
    },

    /// A trial entered a new phase.
    PhaseEntered {
        /// When the transition was observed.
        timestamp: DateTime<Utc>,
        /// Concurrency setting under test.
        concurrency: u32,
        /// Phase that was left.
        from: Phase,
        /// Phase that was entered.
        phase: Phase,
        /// What caused the transition.
        reason: TransitionReason,
        /// Seconds since the node was launched.
        since_launch_secs: f64,
    },

    /// A trial produced a result.
    TrialCompleted {
        /// When the result was produced.
        timestamp: DateTime<Utc>,
        /// Concurrency setting under test.
        concurrency: u32,
        /// Attempts counted in the window.
        attempts: u64,
        /// Window length in seconds.
        window_secs: f64,
        /// Attempts per minute.
        attempts_per_min: f64,
    },

    /// A trial was aborted.
    TrialFailed {
        /// When the trial was aborted.
        timestamp: DateTime<Utc>,
        /// Concurrency setting under test.
        concurrency: u32,
        /// Error description.
        error: String,
        /// Node exit code, when it exited on its own.
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        /// Phase reached before the failure.
        #[serde(skip_serializing_if = "Option::is_none")]
        phase: Option<Phase>,
        /// Counters at the time of failure.
        #[serde(skip_serializing_if = "Option::is_none")]
        counters: Option<Counters>,
    },

    /// Every trial of a batch has finished.
    BatchCompleted {
        /// When the batch finished.
        timestamp: DateTime<Utc>,
        /// Batch totals.
        summary: BatchSummary,
    },
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EventEnvelope {
    sequence: u64,
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Serialization or I/O failures are dropped; a broken event file never
/// aborts a trial.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

// Box<dyn Write> is not Debug.
impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that appends to the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created or opened.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope { sequence, event };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Flushes the underlying writer.
    pub fn flush(&self) {
        if let Ok(mut w) = self.writer.lock() {
            let _ = w.flush();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
