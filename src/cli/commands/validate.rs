//! `validate`: check configuration files without running anything.

use std::path::Path;

use serde::Serialize;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::{ConfigLoader, LoadResult};
use crate::error::{ConfigError, MinebenchError, Severity, ValidationIssue};

#[derive(Debug, Serialize)]
struct FileReport<'a> {
    file: &'a Path,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    warnings: Vec<String>,
}

/// Validates every file, reporting each one, and fails if any is invalid.
///
/// # Errors
///
/// Returns the first configuration error encountered, after all files have
/// been checked and reported.
pub fn run(args: &ValidateArgs) -> Result<(), MinebenchError> {
    let loader = ConfigLoader::with_defaults();
    let mut first_error: Option<ConfigError> = None;
    let mut reports = Vec::with_capacity(args.files.len());

    for path in &args.files {
        tracing::info!(file = %path.display(), "validating configuration");
        let outcome = loader
            .load(path)
            .and_then(|loaded| strict_check(loaded, path, args.strict));

        let report = match outcome {
            Ok(loaded) => FileReport {
                file: path,
                valid: true,
                error: None,
                warnings: loaded.warnings.iter().map(ToString::to_string).collect(),
            },
            Err(e) => {
                let report = FileReport {
                    file: path,
                    valid: false,
                    error: Some(e.to_string()),
                    warnings: Vec::new(),
                };
                first_error.get_or_insert(e);
                report
            }
        };

        if args.format == OutputFormat::Human {
            print_human(&report);
        }
        reports.push(report);
    }

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    first_error.map_or(Ok(()), |e| Err(e.into()))
}

/// In strict mode, promotes load warnings to a validation failure.
fn strict_check(loaded: LoadResult, path: &Path, strict: bool) -> Result<LoadResult, ConfigError> {
    if !strict || loaded.warnings.is_empty() {
        return Ok(loaded);
    }
    Err(ConfigError::ValidationError {
        path: path.display().to_string(),
        errors: loaded
            .warnings
            .into_iter()
            .map(|w| ValidationIssue {
                path: w.location.unwrap_or_default(),
                message: w.message,
                severity: Severity::Warning,
            })
            .collect(),
    })
}

fn print_human(report: &FileReport<'_>) {
    match &report.error {
        None => println!("✓ {}", report.file.display()),
        Some(error) => println!("✗ {}: {error}", report.file.display()),
    }
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
}
