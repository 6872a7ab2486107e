//! Ranking and rendering of batch results.

use std::fmt::Write as _;

use serde::Serialize;

use crate::batch::BatchReport;
use crate::trial::{TrialFailure, TrialResult};

/// Header line of the human ranking.
pub const RANKING_HEADER: &str = "=== Ranking by attempts/min ===";

/// Sorts results by attempts per minute, best first.
///
/// The sort is stable, so equal rates keep run order, and uses
/// `f64::total_cmp` so a NaN cannot poison the ordering.
#[must_use]
pub fn rank(results: &[TrialResult]) -> Vec<&TrialResult> {
    let mut ranked: Vec<&TrialResult> = results.iter().collect();
    ranked.sort_by(|a, b| b.attempts_per_min.total_cmp(&a.attempts_per_min));
    ranked
}

/// Formats one ranking row.
#[must_use]
pub fn ranking_line(result: &TrialResult) -> String {
    format!(
        "{:>3} threads  →  {:.2} APM (attempts={}, window={:.1}s)",
        result.concurrency, result.attempts_per_min, result.attempts, result.window_secs
    )
}

/// Renders the human-readable ranking, followed by failed and skipped
/// settings when there are any.
#[must_use]
pub fn render_ranking(report: &BatchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RANKING_HEADER}");
    for result in rank(&report.results) {
        let _ = writeln!(out, "{}", ranking_line(result));
    }

    if !report.failures.is_empty() {
        let _ = writeln!(out, "\n=== Failed trials ===");
        for failure in &report.failures {
            let _ = writeln!(out, "{:>3} threads  ✗  {}", failure.concurrency, failure.error);
        }
    }

    if !report.skipped.is_empty() {
        let skipped: Vec<String> = report.skipped.iter().map(ToString::to_string).collect();
        let _ = writeln!(out, "\nskipped: {}", skipped.join(", "));
    }
    out
}

/// JSON shape of a batch report.
#[derive(Debug, Serialize)]
pub struct RankingJson<'a> {
    /// Results, best first.
    pub ranking: Vec<&'a TrialResult>,
    /// Failed trials in run order.
    pub failures: &'a [TrialFailure],
    /// Settings that never ran.
    pub skipped: &'a [u32],
    /// Batch duration in seconds.
    pub elapsed_secs: f64,
}

/// Renders the batch report as pretty JSON.
///
/// # Errors
///
/// Returns the `serde_json` error if serialization fails.
pub fn render_json(report: &BatchReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&RankingJson {
        ranking: rank(&report.results),
        failures: &report.failures,
        skipped: &report.skipped,
        elapsed_secs: report.elapsed.as_secs_f64(),
    })
}
