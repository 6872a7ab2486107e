//! Per-trial artifact directory.
//!
//! Layout under the run root:
//!
//! ```text
//! threads_<N>_<unix seconds>/
//!   stdout.log     every line the node printed, stdout and stderr merged
//!   result.json    on success
//!   failure.json   on an aborted trial
//!   .socket/       control-socket directory used by the node
//! ```
//!
//! Write failures after the directory exists are logged and swallowed; a
//! full disk must not turn a measured result into an error.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::TrialError;

/// Raw node output.
pub const LOG_FILE: &str = "stdout.log";

/// Successful trial result.
pub const RESULT_FILE: &str = "result.json";

/// Aborted trial record.
pub const FAILURE_FILE: &str = "failure.json";

/// Name of the artifact directory for a trial.
#[must_use]
pub fn trial_dir_name(concurrency: u32, started_at: DateTime<Utc>) -> String {
    format!("threads_{concurrency}_{}", started_at.timestamp())
}

/// Creates the artifact directory for a trial and clears a stale control
/// socket. Anything else already in the directory is left alone.
///
/// # Errors
///
/// Returns [`TrialError::Artifacts`] if a directory cannot be created or
/// the stale socket cannot be removed.
pub fn prepare(
    run_root: &Path,
    concurrency: u32,
    control_socket: &Path,
    started_at: DateTime<Utc>,
) -> Result<PathBuf, TrialError> {
    let dir = run_root.join(trial_dir_name(concurrency, started_at));
    std::fs::create_dir_all(&dir).map_err(|source| TrialError::Artifacts {
        path: dir.clone(),
        source,
    })?;

    let socket = dir.join(control_socket);
    if let Some(parent) = socket.parent() {
        std::fs::create_dir_all(parent).map_err(|source| TrialError::Artifacts {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    match std::fs::remove_file(&socket) {
        Ok(()) => debug!(path = %socket.display(), "removed stale control socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => return Err(TrialError::Artifacts { path: socket, source }),
    }

    Ok(dir)
}

/// Append-only writer for `stdout.log`.
///
/// Lines are written as they arrive so a crashed run still leaves its log
/// behind. After the first write error the sink goes quiet.
#[derive(Debug)]
pub struct TrialLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    lines: u64,
}

impl TrialLog {
    /// Creates (or truncates) the log in `dir`.
    #[must_use]
    pub fn create(dir: &Path) -> Self {
        let path = dir.join(LOG_FILE);
        let writer = match File::create(&path) {
            Ok(file) => Some(BufWriter::new(file)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot create trial log");
                None
            }
        };
        Self {
            path,
            writer,
            lines: 0,
        }
    }

    /// Appends one line, adding the newline.
    pub fn append(&mut self, line: &str) {
        self.lines += 1;
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if let Err(e) = writeln!(writer, "{line}") {
            warn!(path = %self.path.display(), error = %e, "trial log write failed");
            self.writer = None;
        }
    }

    /// Number of lines observed, including any that could not be written.
    #[must_use]
    pub const fn lines(&self) -> u64 {
        self.lines
    }

    /// Flushes buffered lines to disk.
    pub fn finish(mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!(path = %self.path.display(), error = %e, "trial log flush failed");
            }
        }
    }
}

/// Writes `value` as pretty JSON to `dir/name`, logging instead of failing.
pub fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) {
    let path = dir.join(name);
    let written = serde_json::to_vec_pretty(value)
        .map_err(std::io::Error::other)
        .and_then(|mut bytes| {
            bytes.push(b'\n');
            std::fs::write(&path, bytes)
        });
    match written {
        Ok(()) => debug!(path = %path.display(), "wrote trial artifact"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to write trial artifact"),
    }
}
