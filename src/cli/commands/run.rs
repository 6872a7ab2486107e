//! `run`: benchmark a list of concurrency settings.

use crate::batch::BatchDriver;
use crate::cli::args::{OutputFormat, RunArgs};
use crate::error::MinebenchError;
use crate::report::{render_json, render_ranking};
use crate::trial::TrialRunner;

use super::{Shutdown, ensure_run_root, load_config, observability};

/// Runs the batch and prints the ranking to stdout.
///
/// # Errors
///
/// Returns a configuration error before any trial starts, or the batch
/// outcome error after the ranking has been printed.
pub async fn run(args: &RunArgs, shutdown: &Shutdown) -> Result<(), MinebenchError> {
    let mut config = load_config(&args.bench)?;
    if !args.settings.is_empty() {
        config.settings.clone_from(&args.settings);
    }
    ensure_run_root(&config)?;
    let events = observability(&args.bench)?;

    tracing::info!(
        settings = ?config.settings,
        run_root = %config.run_root.display(),
        measure = %humantime::format_duration(config.trial.measure),
        warmup = %humantime::format_duration(config.trial.warmup),
        "starting benchmark"
    );

    let runner = TrialRunner::new(
        config.node.clone(),
        config.run_root.clone(),
        std::sync::Arc::clone(&events),
    )
    .with_force_kill(shutdown.force.clone());
    let report = BatchDriver::new(runner, config.trial, events)
        .run(&config.settings, &shutdown.cancel)
        .await?;

    match args.format {
        OutputFormat::Human => print!("{}", render_ranking(&report)),
        OutputFormat::Json => println!("{}", render_json(&report)?),
    }

    report.finish()
}
