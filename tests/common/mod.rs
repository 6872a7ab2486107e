//! Shared integration-test harness: fake mining nodes written as shell
//! scripts, config files pointing at them, and a runner for the `minebench`
//! binary.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;

/// A fake node that confirms its threads and then reports attempts quickly.
pub const STEADY_NODE: &str = r#"#!/bin/sh
echo "booting fake node with $*"
echo "mining threads started with $2 threads"
echo "received new candidate block header"
while true; do
  echo "starting mining attempt on thread 0"
  sleep 0.02
done
"#;

/// A fake node that prints a little and exits before confirming threads.
pub const CRASHING_NODE: &str = r#"#!/bin/sh
echo "booting fake node"
echo "panic: out of memory" >&2
exit 3
"#;

/// A fake node that crashes only at one thread count.
pub const FLAKY_NODE: &str = r#"#!/bin/sh
if [ "$2" = "16" ]; then
  echo "refusing 16 threads" >&2
  exit 1
fi
echo "mining threads started with $2 threads"
while true; do
  echo "starting mining attempt on thread 1"
  sleep 0.02
done
"#;

/// A fake node that ignores SIGTERM and SIGINT and records its pid in its
/// working directory.
pub const STUBBORN_NODE: &str = r#"#!/bin/sh
trap '' TERM INT
echo $$ > node.pid
echo "mining threads started with $2 threads"
while true; do
  echo "starting mining attempt on thread 0"
  sleep 0.05
done
"#;

/// Trial timings used unless a test asks for others.
pub const FAST_TRIAL: &str = "measure: 400ms\n  warmup: 0s\n  hard_start_timeout: 5s\n  \
                              shutdown_grace: 2s\n  tick_interval: 20ms";

/// A temporary bench workspace: a node script, a run root and a config file.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Creates a workspace whose node runs `script`.
    #[allow(clippy::missing_panics_doc)]
    pub fn new(script: &str) -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let node = dir.path().join("fake-node.sh");
        std::fs::write(&node, script).expect("failed to write node script");
        make_executable(&node);
        std::fs::create_dir(dir.path().join("runs")).expect("failed to create run root");

        let ws = Self { dir };
        ws.write_config("settings: [4]\n");
        ws
    }

    /// Writes `config.yaml` with short timings, the fake node and `extra`
    /// appended.
    pub fn write_config(&self, extra: &str) {
        self.write_config_with_trial(FAST_TRIAL, extra);
    }

    /// Writes `config.yaml` with the given `trial:` body.
    #[allow(clippy::missing_panics_doc)]
    pub fn write_config_with_trial(&self, trial: &str, extra: &str) {
        let config = format!(
            "node:\n  binary: {}\n  args: []\n  env: {{}}\n\
             trial:\n  {trial}\n\
             run_root: {}\n{extra}",
            self.node().display(),
            self.run_root().display(),
        );
        std::fs::write(self.config(), config).expect("failed to write config");
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn node(&self) -> PathBuf {
        self.dir.path().join("fake-node.sh")
    }

    #[must_use]
    pub fn config(&self) -> PathBuf {
        self.dir.path().join("config.yaml")
    }

    #[must_use]
    pub fn run_root(&self) -> PathBuf {
        self.dir.path().join("runs")
    }

    /// Trial directories created under the run root, sorted by name.
    #[allow(clippy::missing_panics_doc)]
    #[must_use]
    pub fn trial_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(self.run_root())
            .expect("run root should exist")
            .map(|entry| entry.expect("readable dir entry").path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();
        dirs
    }

    /// Runs `minebench` with the workspace config and `args`.
    #[must_use]
    pub fn minebench(&self, args: &[&str]) -> Output {
        let config = self.config();
        let mut full: Vec<&str> = args.to_vec();
        full.extend(["--config", config.to_str().expect("non-UTF-8 config path")]);
        minebench(&full)
    }

    /// Starts `minebench` with the workspace config without waiting for it.
    #[allow(clippy::missing_panics_doc)]
    #[must_use]
    pub fn spawn_minebench(&self, args: &[&str]) -> Child {
        Command::new(env!("CARGO_BIN_EXE_minebench"))
            .args(args)
            .arg("--config")
            .arg(self.config())
            .arg("--quiet")
            .env_remove("MINEBENCH_NODE_BINARY")
            .env_remove("MINEBENCH_RUN_ROOT")
            .env_remove("MINEBENCH_EVENTS_FILE")
            .env_remove("MINEBENCH_METRICS_PORT")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn minebench")
    }

    /// Polls for `name` inside any trial directory.
    #[must_use]
    pub fn wait_for_trial_file(&self, name: &str, timeout: Duration) -> Option<PathBuf> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(path) = self
                .trial_dirs()
                .into_iter()
                .map(|dir| dir.join(name))
                .find(|path| path.exists())
            {
                return Some(path);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        None
    }
}

/// Sends `signal` (e.g. `"TERM"`) to `pid` with kill(1).
#[allow(clippy::missing_panics_doc)]
pub fn send_signal(pid: u32, signal: &str) {
    let status = Command::new("kill")
        .arg(format!("-{signal}"))
        .arg(pid.to_string())
        .status()
        .expect("failed to run kill");
    assert!(status.success(), "kill -{signal} {pid} failed");
}

/// Whether a process with `pid` still exists.
#[allow(clippy::missing_panics_doc)]
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(Stdio::null())
        .status()
        .expect("failed to run kill")
        .success()
}

/// Waits for `child` to exit, killing it and panicking after `timeout`.
#[allow(clippy::missing_panics_doc)]
pub fn wait_with_timeout(child: &mut Child, timeout: Duration) -> ExitStatus {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().expect("try_wait failed") {
            return status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("minebench did not exit within {timeout:?}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Runs the `minebench` binary quietly and collects its output.
#[allow(clippy::missing_panics_doc)]
#[must_use]
pub fn minebench(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_minebench"))
        .args(args)
        .arg("--quiet")
        .env_remove("MINEBENCH_CONFIG")
        .env_remove("MINEBENCH_NODE_BINARY")
        .env_remove("MINEBENCH_RUN_ROOT")
        .env_remove("MINEBENCH_EVENTS_FILE")
        .env_remove("MINEBENCH_METRICS_PORT")
        .output()
        .expect("failed to spawn minebench")
}

/// Stdout as a string.
#[must_use]
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Stderr as a string.
#[must_use]
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Parses stdout as a single JSON document.
#[allow(clippy::missing_panics_doc)]
#[must_use]
pub fn stdout_json(output: &Output) -> serde_json::Value {
    let text = stdout(output);
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("invalid JSON on stdout: {e}\n{text}"))
}

/// Reads a JSON file.
#[allow(clippy::missing_panics_doc)]
#[must_use]
pub fn read_json(path: &Path) -> serde_json::Value {
    let text = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("invalid JSON in {}: {e}", path.display()))
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).expect("failed to chmod script");
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}
