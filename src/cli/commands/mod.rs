//! CLI command dispatch and handlers
//!
//! Routes parsed CLI arguments to the appropriate command handler.

pub mod classify;
pub mod run;
pub mod trial;
pub mod validate;
pub mod version;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{BenchArgs, Cli, Commands};
use crate::config::{BenchConfig, ConfigLoader, Validator, expand_home};
use crate::error::{ConfigError, MinebenchError};
use crate::observability::{EventEmitter, init_metrics};

/// Tokens fired by the process signal handler.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    /// First signal: stop the running trial and shut the node down.
    pub cancel: CancellationToken,
    /// Second signal: kill the node without waiting out its grace period.
    pub force: CancellationToken,
}

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli, shutdown: Shutdown) -> Result<(), MinebenchError> {
    match cli.command {
        Commands::Run(args) => run::run(&args, &shutdown).await,
        Commands::Trial(args) => trial::run(&args, &shutdown).await,
        Commands::Classify(args) => classify::run(&args),
        Commands::Validate(args) => validate::run(&args),
        Commands::Version(args) => {
            version::run(&args);
            Ok(())
        }
    }
}

/// Loads the configuration named by `args` (or the defaults) and applies
/// command-line overrides, re-validating the merged result.
///
/// # Errors
///
/// Returns a configuration error if loading fails or the overrides produce
/// an invalid configuration.
pub fn load_config(args: &BenchArgs) -> Result<BenchConfig, MinebenchError> {
    let mut config = match &args.config {
        Some(path) => {
            tracing::info!(file = %path.display(), "loading configuration");
            let loaded = ConfigLoader::with_defaults().load(path)?;
            for warning in &loaded.warnings {
                tracing::warn!(
                    location = warning.location.as_deref().unwrap_or("<unknown>"),
                    "{}",
                    warning.message
                );
            }
            loaded.config
        }
        None => BenchConfig::default().with_expanded_paths(),
    };

    if let Some(binary) = &args.binary {
        config.node.binary = expand_home(binary);
    }
    if let Some(run_root) = &args.run_root {
        config.run_root = expand_home(run_root);
    }
    if let Some(measure) = args.measure {
        config.trial.measure = measure;
    }
    if let Some(warmup) = args.warmup {
        config.trial.warmup = warmup;
    }
    if let Some(timeout) = args.hard_start_timeout {
        config.trial.hard_start_timeout = timeout;
    }
    if let Some(grace) = args.shutdown_grace {
        config.trial.shutdown_grace = grace;
    }

    check(&config)?;
    Ok(config)
}

/// Validates a configuration assembled outside the loader.
fn check(config: &BenchConfig) -> Result<(), ConfigError> {
    let result = Validator::new().validate(config);
    if result.has_errors() {
        return Err(ConfigError::ValidationError {
            path: "<command line>".to_string(),
            errors: result.errors,
        });
    }
    Ok(())
}

/// Installs the metrics recorder and opens the event stream requested by
/// `args`.
///
/// # Errors
///
/// Returns an I/O error if the metrics endpoint or the event file cannot
/// be opened.
pub fn observability(args: &BenchArgs) -> Result<Arc<EventEmitter>, MinebenchError> {
    if let Some(port) = args.metrics_port {
        init_metrics(Some(port))?;
        tracing::info!(port, "serving Prometheus metrics");
    }

    let emitter = match &args.events_file {
        Some(path) => EventEmitter::from_file(path)?,
        None => EventEmitter::noop(),
    };
    Ok(Arc::new(emitter))
}

/// Creates the run root if it does not exist yet.
fn ensure_run_root(config: &BenchConfig) -> Result<(), MinebenchError> {
    std::fs::create_dir_all(&config.run_root).map_err(|e| {
        MinebenchError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot create run root {}: {e}", config.run_root.display()),
        ))
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults_without_config_file() {
        let config = load_config(&BenchArgs::default()).unwrap();
        assert_eq!(config.settings, vec![64, 80, 92]);
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "settings: [4]\ntrial:\n  measure: 10m\n").unwrap();

        let args = BenchArgs {
            config: Some(file.path().to_path_buf()),
            binary: Some(PathBuf::from("/opt/node")),
            measure: Some(Duration::from_secs(30)),
            ..BenchArgs::default()
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.settings, vec![4]);
        assert_eq!(config.node.binary, PathBuf::from("/opt/node"));
        assert_eq!(config.trial.measure, Duration::from_secs(30));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = BenchArgs {
            measure: Some(Duration::ZERO),
            ..BenchArgs::default()
        };
        let err = load_config(&args).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::ExitCode::CONFIG_ERROR);
        assert!(err.to_string().contains("trial.measure"));
    }

    #[test]
    fn events_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let args = BenchArgs {
            events_file: Some(path.clone()),
            ..BenchArgs::default()
        };
        let emitter = observability(&args).unwrap();
        assert_eq!(emitter.event_count(), 0);
        assert!(path.exists());
    }
}
