//! Prometheus metrics for benchmark runs.
//!
//! Recording functions are no-ops until [`init_metrics`] installs a global
//! recorder, so trials never need to check whether metrics are enabled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::MinebenchError;
use crate::phase::Phase;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`; otherwise the recorder is installed without an
/// endpoint.
///
/// # Errors
///
/// Returns `MinebenchError::Io` if the recorder or HTTP listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), MinebenchError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| MinebenchError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "minebench_attempts_total",
        "Mining attempts counted inside the measurement window"
    );
    describe_counter!(
        "minebench_phase_transitions_total",
        "Total number of trial phase transitions"
    );
    describe_gauge!(
        "minebench_current_phase",
        "Phase of the running trial (1 = active)"
    );
    describe_counter!("minebench_trials_total", "Finished trials by outcome");
    describe_gauge!(
        "minebench_attempts_per_minute",
        "Attempts per minute of the last completed trial per setting"
    );
    describe_histogram!(
        "minebench_window_seconds",
        "Length of the measurement window in seconds"
    );
}

/// Records attempts counted in the window.
pub fn record_attempts(concurrency: u32, count: u64) {
    counter!("minebench_attempts_total", "concurrency" => concurrency.to_string())
        .increment(count);
}

/// Marks a freshly launched trial: `starting` reads 1, every other phase 0.
pub fn record_trial_launch() {
    for phase in [Phase::Starting, Phase::Warming, Phase::Measuring, Phase::Done] {
        let active = if phase == Phase::Starting { 1.0 } else { 0.0 };
        gauge!("minebench_current_phase", "phase" => phase.as_str()).set(active);
    }
}

/// Records a phase transition and moves the current-phase gauge.
pub fn record_phase_transition(from: Phase, to: Phase) {
    counter!(
        "minebench_phase_transitions_total",
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    gauge!("minebench_current_phase", "phase" => from.as_str()).set(0.0);
    gauge!("minebench_current_phase", "phase" => to.as_str()).set(1.0);
}

/// Records a finished trial; `outcome` is `"completed"` or a failure kind.
pub fn record_trial_outcome(outcome: &'static str) {
    counter!("minebench_trials_total", "outcome" => outcome).increment(1);
}

/// Records the rate and window of a completed trial.
pub fn record_trial_rate(concurrency: u32, attempts_per_min: f64, window: Duration) {
    gauge!("minebench_attempts_per_minute", "concurrency" => concurrency.to_string())
        .set(attempts_per_min);
    histogram!("minebench_window_seconds").record(window.as_secs_f64());
}
