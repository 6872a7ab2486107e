//! Error types for `minebench`.
//!
//! A top-level [`MinebenchError`] aggregates configuration, trial and I/O
//! failures and maps each one to a process exit code.

use std::path::PathBuf;
use thiserror::Error;

use crate::phase::{Counters, Phase};

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `minebench` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// The node binary could not be executed
    pub const LAUNCH_ERROR: i32 = 4;

    /// The node exited before a trial finished
    pub const EARLY_EXIT: i32 = 5;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `minebench` operations.
#[derive(Debug, Error)]
pub enum MinebenchError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A trial failed
    #[error(transparent)]
    Trial(#[from] TrialError),

    /// One or more trials of a batch failed; results of the others were
    /// still reported
    #[error("{failed} of {total} trials failed")]
    BatchIncomplete {
        /// Number of failed trials
        failed: usize,
        /// Number of trials attempted
        total: usize,
    },

    /// The run was interrupted between trials
    #[error("interrupted")]
    Interrupted,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MinebenchError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Json(_) => ExitCode::ERROR,
            Self::Trial(e) => e.exit_code(),
            Self::BatchIncomplete { .. } => ExitCode::EARLY_EXIT,
            Self::Interrupted => ExitCode::INTERRUPTED,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}: {}", summarize(.errors))]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Configuration file exceeds the size limit
    #[error("configuration file too large: {size} bytes (limit: {limit})")]
    TooLarge {
        /// Actual size in bytes
        size: usize,
        /// Configured limit in bytes
        limit: usize,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Environment variable referenced in configuration is not set
    #[error("environment variable '{var}' not set (referenced at {location})")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Location in the configuration where it was referenced
        location: String,
    },
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "trial.measure")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error - validation failure that prevents configuration from being used
    Error,
    /// Warning - potential issue that does not prevent configuration loading
    Warning,
}

// ============================================================================
// Process Errors
// ============================================================================

/// The node binary could not be started.
#[derive(Debug, Error)]
#[error("failed to launch {}: {source}", .program.display())]
pub struct LaunchError {
    /// Program that was executed
    pub program: PathBuf,
    /// Underlying spawn error
    #[source]
    pub source: std::io::Error,
}

// ============================================================================
// Trial Errors
// ============================================================================

/// Failure of a single trial.
///
/// Variants raised after launch carry the phase reached and the counters
/// at the moment the trial was aborted.
#[derive(Debug, Error)]
pub enum TrialError {
    /// The artifact directory could not be prepared
    #[error("failed to prepare artifact directory {}: {source}", .path.display())]
    Artifacts {
        /// Directory or file that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The node binary could not be executed
    #[error("trial at concurrency {concurrency}: {source}")]
    Launch {
        /// Concurrency setting of the trial
        concurrency: u32,
        /// Underlying launch failure
        #[source]
        source: LaunchError,
    },

    /// The node exited before the measurement window closed
    #[error(
        "node exited early with {} during {phase} (concurrency {concurrency}, {} attempts counted)",
        describe_exit(.exit_code),
        .counters.attempts_total
    )]
    EarlyExit {
        /// Concurrency setting of the trial
        concurrency: u32,
        /// Exit code, `None` when terminated by a signal
        exit_code: Option<i32>,
        /// Phase the trial had reached
        phase: Phase,
        /// Counters at the time of exit
        counters: Counters,
        /// Directory holding the partial artifacts
        artifact_dir: PathBuf,
    },

    /// The trial was cancelled by the user
    #[error("trial cancelled during {phase} (concurrency {concurrency})")]
    Cancelled {
        /// Concurrency setting of the trial
        concurrency: u32,
        /// Phase the trial had reached
        phase: Phase,
        /// Counters at the time of cancellation
        counters: Counters,
        /// Directory holding the partial artifacts
        artifact_dir: PathBuf,
    },
}

impl TrialError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Artifacts { .. } => ExitCode::IO_ERROR,
            Self::Launch { .. } => ExitCode::LAUNCH_ERROR,
            Self::EarlyExit { .. } => ExitCode::EARLY_EXIT,
            Self::Cancelled { .. } => ExitCode::INTERRUPTED,
        }
    }

    /// Whether the remaining trials of a batch should still run after this
    /// failure.
    #[must_use]
    pub const fn is_isolated(&self) -> bool {
        matches!(self, Self::EarlyExit { .. })
    }
}

#[allow(clippy::ref_option)]
fn describe_exit(code: &Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}"))
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `minebench` operations.
pub type Result<T> = std::result::Result<T, MinebenchError>;

// ============================================================================
// Tests
// ============================================================================
