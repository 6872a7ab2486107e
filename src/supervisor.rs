//! Node process supervision.
//!
//! [`ProcessSupervisor`] owns one child process for the duration of a
//! trial. Its stdout and stderr are merged into a single line stream, exit
//! is detected when that stream drains, and [`NodeProcess::shutdown`] asks
//! the child to terminate before killing it.
//!
//! The child is spawned with `kill_on_drop`, so a supervisor dropped on a
//! panic path still reaps its process.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::LaunchError;

/// Capacity of the merged output channel, in lines.
pub const LINE_CHANNEL_CAPACITY: usize = 4096;

/// Everything needed to start the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments, excluding the program itself.
    pub args: Vec<String>,
    /// Working directory of the child.
    pub working_dir: PathBuf,
    /// Variables set on top of the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl LaunchSpec {
    /// Renders the command as a shell-quoted line for logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        let program = self.program.to_string_lossy();
        let words = std::iter::once(program.as_ref()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(words).unwrap_or_else(|_| {
            std::iter::once(program.to_string())
                .chain(self.args.iter().cloned())
                .collect::<Vec<_>>()
                .join(" ")
        })
    }
}

/// Lifecycle state of a supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// The child has not exited yet.
    Running,
    /// The child exited; the code is `None` when it was killed by a signal.
    Exited(Option<i32>),
}

impl ExitState {
    /// Returns `true` once the child has exited.
    #[must_use]
    pub const fn has_exited(self) -> bool {
        matches!(self, Self::Exited(_))
    }

    /// Exit code, if the child exited normally.
    #[must_use]
    pub const fn code(self) -> Option<i32> {
        match self {
            Self::Exited(code) => code,
            Self::Running => None,
        }
    }
}

/// The operations a trial needs from a running node.
#[async_trait::async_trait]
pub trait NodeProcess: Send {
    /// Waits for the next output line.
    ///
    /// Returns `None` once all output has been consumed and the process has
    /// exited; query [`exit_state`](Self::exit_state) afterwards. Must be
    /// cancel-safe so it can race a timer in `tokio::select!`.
    async fn next_line(&mut self) -> Option<String>;

    /// Returns the current exit state without blocking.
    fn exit_state(&mut self) -> ExitState;

    /// Terminates the process: a polite request first, a kill after `grace`
    /// or as soon as `force` fires, whichever comes first.
    ///
    /// Calling it again, or on a process that already exited, sends nothing
    /// and returns the recorded state.
    async fn shutdown(&mut self, grace: Duration, force: &CancellationToken) -> ExitState;
}

/// Owner of one node child process.
#[derive(Debug)]
pub struct ProcessSupervisor {
    child: Child,
    program: PathBuf,
    lines: mpsc::Receiver<String>,
    state: ExitState,
    shutdown_requested: bool,
}

impl ProcessSupervisor {
    /// Spawns the node described by `spec`.
    ///
    /// Must be called from within a Tokio runtime: the two pipe readers run
    /// as tasks.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] if the program cannot be executed.
    pub fn start(spec: &LaunchSpec) -> Result<Self, LaunchError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| LaunchError {
            program: spec.program.clone(),
            source,
        })?;

        let (tx, lines) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone(), "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx, "stderr"));
        }

        debug!(
            pid = child.id(),
            program = %spec.program.display(),
            "node process started"
        );

        Ok(Self {
            child,
            program: spec.program.clone(),
            lines,
            state: ExitState::Running,
            shutdown_requested: false,
        })
    }

    /// OS process id, while the child has not been reaped.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn record_exit(&mut self, status: std::io::Result<std::process::ExitStatus>) {
        match status {
            Ok(status) => self.state = ExitState::Exited(status.code()),
            Err(e) => {
                warn!(program = %self.program.display(), error = %e, "failed to reap node process");
                self.state = ExitState::Exited(None);
            }
        }
    }
}

#[async_trait::async_trait]
impl NodeProcess for ProcessSupervisor {
    async fn next_line(&mut self) -> Option<String> {
        if let Some(line) = self.lines.recv().await {
            return Some(line);
        }

        // Both pipes hit EOF; the child is gone or about to be.
        if self.state == ExitState::Running {
            let status = self.child.wait().await;
            self.record_exit(status);
        }
        None
    }

    fn exit_state(&mut self) -> ExitState {
        if self.state == ExitState::Running {
            match self.child.try_wait() {
                Ok(Some(status)) => self.record_exit(Ok(status)),
                Ok(None) => {}
                Err(e) => self.record_exit(Err(e)),
            }
        }
        self.state
    }

    async fn shutdown(&mut self, grace: Duration, force: &CancellationToken) -> ExitState {
        if self.shutdown_requested {
            return self.state;
        }
        self.shutdown_requested = true;

        if self.exit_state().has_exited() {
            debug!(state = ?self.state, "node already exited");
            return self.state;
        }

        if !request_termination(&mut self.child) {
            warn!(program = %self.program.display(), "termination request could not be delivered");
        }

        let exited = tokio::select! {
            biased;
            () = force.cancelled() => {
                warn!("forced shutdown; killing node");
                None
            }
            waited = tokio::time::timeout(grace, self.child.wait()) => match waited {
                Ok(status) => Some(status),
                Err(_) => {
                    warn!(
                        grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                        "node ignored termination request; killing"
                    );
                    None
                }
            },
        };

        match exited {
            Some(status) => self.record_exit(status),
            None => {
                if let Err(e) = self.child.kill().await {
                    warn!(error = %e, "failed to kill node process");
                }
                let status = self.child.wait().await;
                self.record_exit(status);
            }
        }

        debug!(state = ?self.state, "node process shut down");
        self.state
    }
}

/// Sends SIGTERM to the child.
#[cfg(unix)]
#[allow(unsafe_code)]
fn request_termination(child: &mut Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}

/// Platforms without signals get an immediate kill.
#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> bool {
    child.start_kill().is_ok()
}

/// Copies lines from one pipe into the merged channel until EOF.
///
/// Invalid UTF-8 is replaced rather than rejected; trailing `\r\n` is
/// stripped.
async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_owned();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(stream, error = %e, "failed to read node output");
                break;
            }
        }
    }
}
