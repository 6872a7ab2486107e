//! `minebench`: throughput benchmark for mining nodes

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use clap::Parser;

use minebench::cli::args::Cli;
use minebench::cli::commands::{self, Shutdown};
use minebench::error::ExitCode;
use minebench::observability::init_logging;

/// How long a forced shutdown may take to reap the node before the process
/// exits regardless.
const FORCED_EXIT_DEADLINE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !cli.quiet {
        init_logging(cli.log_format, cli.verbose, cli.color);
    }

    let shutdown = Shutdown::default();
    let signal_code = Arc::new(AtomicI32::new(0));

    // First signal cancels the running trial so the node is shut down and
    // artifacts are written. A second one kills the node without waiting
    // out its grace period; the process exits once the node is reaped.
    {
        let shutdown = shutdown.clone();
        let signal_code = Arc::clone(&signal_code);
        tokio::spawn(async move {
            let code = wait_for_signal().await;
            signal_code.store(code, Ordering::SeqCst);
            eprintln!("\nStopping the current trial... (press Ctrl+C again to force)");
            shutdown.cancel.cancel();

            let _ = wait_for_signal().await;
            eprintln!("Killing the node...");
            shutdown.force.cancel();

            tokio::time::sleep(FORCED_EXIT_DEADLINE).await;
            eprintln!("node did not exit after kill; exiting anyway");
            std::process::exit(code);
        });
    }

    let result = commands::dispatch(cli, shutdown).await;

    match result {
        Ok(()) => std::process::exit(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            let code = match signal_code.load(Ordering::SeqCst) {
                0 => e.exit_code(),
                signal => signal,
            };
            std::process::exit(code);
        }
    }
}

/// Waits for SIGINT or SIGTERM and returns the matching exit code.
#[cfg(unix)]
async fn wait_for_signal() -> i32 {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => tokio::select! {
            _ = tokio::signal::ctrl_c() => ExitCode::INTERRUPTED,
            _ = sigterm.recv() => ExitCode::TERMINATED,
        },
        Err(e) => {
            tracing::warn!(error = %e, "cannot install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            ExitCode::INTERRUPTED
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> i32 {
    let _ = tokio::signal::ctrl_c().await;
    ExitCode::INTERRUPTED
}
