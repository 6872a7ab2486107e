//! CLI argument definitions
//!
//! All Clap derive structs for `minebench` command-line parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::observability::LogFormat;

// ============================================================================
// Root CLI
// ============================================================================

/// Throughput benchmark for mining nodes.
#[derive(Parser, Debug)]
#[command(name = "minebench", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv node output, -vvvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "MINEBENCH_COLOR")]
    pub color: ColorChoice,

    /// Log output format.
    #[arg(
        long,
        default_value = "human",
        global = true,
        env = "MINEBENCH_LOG_FORMAT"
    )]
    pub log_format: LogFormat,
}

// ============================================================================
// Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Benchmark every concurrency setting and rank the results.
    Run(RunArgs),

    /// Run a single trial at one concurrency setting.
    Trial(TrialArgs),

    /// Classify the lines of a captured node log.
    Classify(ClassifyArgs),

    /// Validate configuration files.
    Validate(ValidateArgs),

    /// Display version information.
    Version(VersionArgs),
}

/// Configuration source and overrides shared by `run` and `trial`.
#[derive(Args, Debug, Default)]
pub struct BenchArgs {
    /// Path to a YAML configuration file.
    #[arg(short, long, env = "MINEBENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Node executable.
    #[arg(long, env = "MINEBENCH_NODE_BINARY")]
    pub binary: Option<PathBuf>,

    /// Directory under which trial directories are created.
    #[arg(long, env = "MINEBENCH_RUN_ROOT")]
    pub run_root: Option<PathBuf>,

    /// Measurement window (e.g. `180s`, `3m`).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub measure: Option<Duration>,

    /// Warmup after thread start.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub warmup: Option<Duration>,

    /// Maximum wait for the node to confirm its threads.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub hard_start_timeout: Option<Duration>,

    /// Time the node gets to exit before it is killed.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub shutdown_grace: Option<Duration>,

    /// Append JSONL events to this file.
    #[arg(long, env = "MINEBENCH_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// Serve Prometheus metrics on `127.0.0.1:<port>`.
    #[arg(long, env = "MINEBENCH_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

/// Arguments for `run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Concurrency settings, comma separated. Defaults to the configured list.
    #[arg(
        short,
        long,
        value_delimiter = ',',
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub settings: Vec<u32>,

    /// Configuration and overrides.
    #[command(flatten)]
    pub bench: BenchArgs,

    /// Output format of the ranking.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `trial`.
#[derive(Args, Debug)]
pub struct TrialArgs {
    /// Concurrency setting to benchmark.
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..))]
    pub concurrency: u32,

    /// Configuration and overrides.
    #[command(flatten)]
    pub bench: BenchArgs,

    /// Output format of the result.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `classify`.
#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Log file to classify; reads stdin when omitted.
    pub file: Option<PathBuf>,

    /// Only print totals.
    #[arg(long)]
    pub summary: bool,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Treat warnings as errors.
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

// ============================================================================
// Tests
// ============================================================================
