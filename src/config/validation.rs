//! Configuration validation.
//!
//! Collects every problem in one pass so a user sees all of them at once.
//! Errors block loading; warnings are reported and loading continues.

use std::collections::BTreeSet;

use crate::config::schema::BenchConfig;
use crate::error::{Severity, ValidationIssue};

/// Outcome of validating one configuration.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Issues that prevent the configuration from being used.
    pub errors: Vec<ValidationIssue>,
    /// Issues worth reporting that do not block loading.
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if any blocking issue was found.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn error(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.into(),
            severity: Severity::Error,
        });
    }

    fn warning(&mut self, path: &str, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.into(),
            severity: Severity::Warning,
        });
    }
}

/// Stateless configuration validator.
#[derive(Debug, Default)]
pub struct Validator;

impl Validator {
    /// Creates a validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates `config`.
    #[must_use]
    pub fn validate(&self, config: &BenchConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        if config.node.binary.as_os_str().is_empty() {
            result.error("node.binary", "node binary must not be empty");
        }
        if config.node.concurrency_flag.trim().is_empty() {
            result.error("node.concurrency_flag", "concurrency flag must not be empty");
        }
        if config.node.control_socket.is_absolute() {
            result.warning(
                "node.control_socket",
                "control socket is absolute; it will not be isolated per trial",
            );
        }

        let trial = &config.trial;
        if trial.measure.is_zero() {
            result.error("trial.measure", "measurement window must be greater than zero");
        }
        if trial.hard_start_timeout.is_zero() {
            result.error(
                "trial.hard_start_timeout",
                "hard-start timeout must be greater than zero",
            );
        }
        if trial.tick_interval.is_zero() {
            result.error("trial.tick_interval", "tick interval must be greater than zero");
        }
        if !trial.measure.is_zero() && trial.warmup > trial.measure {
            result.warning(
                "trial.warmup",
                "warmup is longer than the measurement window",
            );
        }

        if config.settings.is_empty() {
            result.error("settings", "no concurrency settings to benchmark");
        }
        let mut seen = BTreeSet::new();
        for (i, &setting) in config.settings.iter().enumerate() {
            let path = format!("settings[{i}]");
            if setting == 0 {
                result.error(&path, "concurrency setting must be at least 1");
            }
            if !seen.insert(setting) {
                result.warning(&path, format!("concurrency setting {setting} is repeated"));
            }
        }

        result
    }
}
