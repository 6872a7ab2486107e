//! Logging initialization.
//!
//! Diagnostics go to stderr only. Stdout carries the ranking, the trial line
//! and `--format json` documents, so a piped `minebench run --format json`
//! stays parseable at any verbosity.
//!
//! Node output is written to each trial's `stdout.log`. It reaches the
//! terminal only at `-vvv`, as `trace` events under [`NODE_OUTPUT_TARGET`],
//! so a raised verbosity does not drown minebench's own diagnostics in
//! thousands of attempt lines.

use std::io::IsTerminal;

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

use crate::cli::args::ColorChoice;

/// Environment variable that overrides the verbosity flags.
pub const LOG_LEVEL_ENV: &str = "MINEBENCH_LOG_LEVEL";

/// Target of the events that echo node output lines.
pub const NODE_OUTPUT_TARGET: &str = "minebench::node_output";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with optional ANSI colors.
    #[default]
    Human,
    /// One flat JSON object per line.
    Json,
}

/// Maps `-v` occurrences to a filter directive.
///
/// | `-v` | directive |
/// |------|-----------|
/// | 0 | `warn`: failures and skipped settings |
/// | 1 | `info`: trial start, phase changes, results |
/// | 2 | `debug`: process lifecycle and ticks |
/// | 3 | `debug` plus every node output line |
/// | 4+ | `trace` everywhere |
#[must_use]
pub const fn verbosity_to_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        3 => "debug,minebench::node_output=trace",
        _ => "trace",
    }
}

/// Whether stderr output should carry ANSI colors.
///
/// `NO_COLOR` only affects `auto`; an explicit `--color always` wins.
#[must_use]
pub const fn ansi_enabled(color: ColorChoice, stderr_is_terminal: bool, no_color: bool) -> bool {
    match color {
        ColorChoice::Auto => stderr_is_terminal && !no_color,
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    }
}

/// Initializes the global tracing subscriber on stderr.
///
/// `MINEBENCH_LOG_LEVEL` takes precedence over `verbosity` when it holds a
/// valid directive. Uses `try_init()`, so calling this more than once is
/// harmless.
pub fn init_logging(format: LogFormat, verbosity: u8, color: ColorChoice) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .unwrap_or_else(|_| EnvFilter::new(verbosity_to_directive(verbosity)));

    // Module paths only help once lifecycle detail is on.
    let show_target = verbosity >= 2;

    match format {
        LogFormat::Human => {
            let ansi = ansi_enabled(
                color,
                std::io::stderr().is_terminal(),
                std::env::var_os("NO_COLOR").is_some(),
            );
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(ansi)
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogFormat::Json => {
            // Flat objects keep `concurrency`, `phase` and friends at the top
            // level next to the events file records.
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_target(true)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
