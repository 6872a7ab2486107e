//! `trial`: run a single concurrency setting.

use crate::cli::args::{OutputFormat, TrialArgs};
use crate::error::MinebenchError;
use crate::report::ranking_line;
use crate::trial::{TrialConfig, TrialRunner};

use super::{Shutdown, ensure_run_root, load_config, observability};

/// Runs one trial and prints its result.
///
/// # Errors
///
/// Returns a configuration error, or the trial error if the trial failed.
pub async fn run(args: &TrialArgs, shutdown: &Shutdown) -> Result<(), MinebenchError> {
    let config = load_config(&args.bench)?;
    ensure_run_root(&config)?;
    let events = observability(&args.bench)?;

    let trial = TrialConfig::new(args.concurrency, &config.trial);
    trial.validate()?;

    let runner = TrialRunner::new(config.node, config.run_root, events)
        .with_force_kill(shutdown.force.clone());
    let result = runner.run(&trial, &shutdown.cancel).await?;

    match args.format {
        OutputFormat::Human => {
            println!("{}", ranking_line(&result));
            println!("artifacts: {}", result.artifact_dir.display());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}
