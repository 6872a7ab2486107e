//! Configuration loader.
//!
//! Loading runs in stages:
//! 1. Size check against `MINEBENCH_MAX_CONFIG_SIZE`
//! 2. Environment variable expansion on the raw text
//! 3. YAML parsing
//! 4. Deserialization to [`BenchConfig`]
//! 5. Validation
//! 6. `~/` expansion of path fields

use std::path::Path;

use serde_yaml::Value;

use crate::config::schema::BenchConfig;
use crate::config::validation::Validator;
use crate::error::ConfigError;

/// Default limit on configuration file size (1 MiB).
pub const DEFAULT_MAX_CONFIG_SIZE: usize = 1024 * 1024;

/// Options for the configuration loader.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Maximum configuration file size in bytes.
    pub max_config_size: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_config_size: env_or("MINEBENCH_MAX_CONFIG_SIZE", DEFAULT_MAX_CONFIG_SIZE),
        }
    }
}

/// Result of loading a configuration.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration.
    pub config: BenchConfig,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during configuration loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Location where the warning occurred.
    pub location: Option<String>,
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} ({location})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Configuration loader.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: LoaderOptions,
}

impl ConfigLoader {
    /// Creates a loader with the given options.
    #[must_use]
    pub const fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Creates a loader with default options.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(LoaderOptions::default())
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or too large, if a required
    /// environment variable is unset, if the YAML is malformed or empty, or
    /// if validation finds errors.
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        let limit = self.options.max_config_size;
        let size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if size > limit {
            return Err(ConfigError::TooLarge { size, limit });
        }

        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        self.load_str(&raw, path, |name| std::env::var(name).ok())
    }

    /// Loads and validates configuration text that did not come from a file.
    ///
    /// `origin` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Same as [`ConfigLoader::load`], except for the missing-file case.
    pub fn load_from_str(&self, raw: &str, origin: &Path) -> Result<LoadResult, ConfigError> {
        if raw.len() > self.options.max_config_size {
            return Err(ConfigError::TooLarge {
                size: raw.len(),
                limit: self.options.max_config_size,
            });
        }
        self.load_str(raw, origin, |name| std::env::var(name).ok())
    }

    /// Runs the pipeline with a custom environment lookup.
    ///
    /// # Errors
    ///
    /// See [`ConfigLoader::load`].
    pub fn load_str<F>(&self, raw: &str, origin: &Path, lookup: F) -> Result<LoadResult, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let mut expander = EnvExpander::new(lookup);
        let expanded = expander.expand(raw, origin)?;
        let mut warnings = expander.warnings;

        let root: Value = serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
            path: origin.to_path_buf(),
            line: e.location().map(|l| l.line()),
            message: e.to_string(),
        })?;

        if root.is_null() {
            return Err(ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: None,
                message: "configuration file is empty".to_string(),
            });
        }

        let config: BenchConfig =
            serde_yaml::from_value(root).map_err(|e| ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;

        let validation = Validator::new().validate(&config);
        if validation.has_errors() {
            return Err(ConfigError::ValidationError {
                path: origin.display().to_string(),
                errors: validation.errors,
            });
        }

        warnings.extend(validation.warnings.into_iter().map(|issue| LoadWarning {
            message: issue.message,
            location: Some(issue.path),
        }));

        Ok(LoadResult {
            config: config.with_expanded_paths(),
            warnings,
        })
    }
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// A parsed `${...}` reference.
enum VarRef<'a> {
    /// `${NAME}`
    Plain(&'a str),
    /// `${NAME:-default}`
    Default(&'a str, &'a str),
    /// `${NAME:?message}`
    Required(&'a str, &'a str),
}

/// Expands environment references in raw YAML text before parsing, so the
/// substituted values still go through YAML type inference.
///
/// Supports `${VAR}` (empty string with a warning if unset),
/// `${VAR:-default}`, `${VAR:?message}` (error if unset) and `$$` for a
/// literal `$`.
struct EnvExpander<F> {
    lookup: F,
    warnings: Vec<LoadWarning>,
}

impl<F> EnvExpander<F>
where
    F: Fn(&str) -> Option<String>,
{
    const fn new(lookup: F) -> Self {
        Self {
            lookup,
            warnings: Vec::new(),
        }
    }

    fn expand(&mut self, raw: &str, origin: &Path) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;

        while let Some(idx) = rest.find('$') {
            out.push_str(&rest[..idx]);
            let line = raw[..raw.len() - rest.len() + idx].matches('\n').count() + 1;
            let tail = &rest[idx + 1..];

            if let Some(after) = tail.strip_prefix('$') {
                out.push('$');
                rest = after;
            } else if let Some(body) = tail.strip_prefix('{') {
                let end = closing_brace(body).ok_or_else(|| ConfigError::ParseError {
                    path: origin.to_path_buf(),
                    line: Some(line),
                    message: "unclosed environment variable reference".to_string(),
                })?;
                self.resolve(parse_reference(&body[..end]), origin, line, &mut out)?;
                rest = &body[end + 1..];
            } else {
                out.push('$');
                rest = tail;
            }
        }

        out.push_str(rest);
        Ok(out)
    }

    fn resolve(
        &mut self,
        reference: VarRef<'_>,
        origin: &Path,
        line: usize,
        out: &mut String,
    ) -> Result<(), ConfigError> {
        let (name, value) = match reference {
            VarRef::Plain(name) => (name, (self.lookup)(name)),
            VarRef::Default(name, default) => (
                name,
                Some((self.lookup)(name).unwrap_or_else(|| default.to_string())),
            ),
            VarRef::Required(name, message) => {
                let value = (self.lookup)(name).ok_or_else(|| ConfigError::EnvVarNotSet {
                    var: name.to_string(),
                    location: if message.is_empty() {
                        format!("{}:{line}", origin.display())
                    } else {
                        message.to_string()
                    },
                })?;
                (name, Some(value))
            }
        };

        match value {
            Some(value) => out.push_str(&value),
            None => self.warnings.push(LoadWarning {
                message: format!("environment variable '{name}' is not set, using empty string"),
                location: Some(format!("{}:{line}", origin.display())),
            }),
        }
        Ok(())
    }
}

/// Finds the `}` closing a reference body, allowing nested braces in
/// defaults.
fn closing_brace(body: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_reference(body: &str) -> VarRef<'_> {
    if let Some((name, default)) = body.split_once(":-") {
        VarRef::Default(name, default)
    } else if let Some((name, message)) = body.split_once(":?") {
        VarRef::Required(name, message)
    } else {
        VarRef::Plain(body)
    }
}

/// Parses an environment variable with a default value.
pub(crate) fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ============================================================================
// Tests
// ============================================================================
