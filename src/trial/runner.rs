//! Trial driver.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::NodeConfig;
use crate::error::TrialError;
use crate::node;
use crate::observability::logging::NODE_OUTPUT_TARGET;
use crate::observability::metrics;
use crate::observability::{Event, EventEmitter};
use crate::phase::{Phase, PhaseMachine, PhaseTransition};
use crate::signal::classify;
use crate::supervisor::{NodeProcess, ProcessSupervisor};

use super::artifacts::{self, FAILURE_FILE, RESULT_FILE, TrialLog};
use super::{TrialConfig, TrialFailure, TrialResult, attempts_per_minute};

/// How the drive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriveEnd {
    Done,
    Exited,
    Cancelled,
}

/// Runs trials against one node configuration.
#[derive(Debug)]
pub struct TrialRunner {
    node: NodeConfig,
    run_root: PathBuf,
    events: Arc<EventEmitter>,
    force_kill: CancellationToken,
}

impl TrialRunner {
    /// Creates a runner that places artifact directories under `run_root`.
    #[must_use]
    pub fn new(node: NodeConfig, run_root: PathBuf, events: Arc<EventEmitter>) -> Self {
        Self {
            node,
            run_root,
            events,
            force_kill: CancellationToken::new(),
        }
    }

    /// Cuts the shutdown grace period short: once `token` fires, a node
    /// still waiting out its grace is killed at once.
    #[must_use]
    pub fn with_force_kill(mut self, token: CancellationToken) -> Self {
        self.force_kill = token;
        self
    }

    /// Runs one trial to completion.
    ///
    /// The node is shut down on every path once it has been launched.
    ///
    /// # Errors
    ///
    /// - [`TrialError::Artifacts`] if the artifact directory cannot be prepared
    /// - [`TrialError::Launch`] if the node cannot be executed
    /// - [`TrialError::EarlyExit`] if the node exits before the window closes
    /// - [`TrialError::Cancelled`] if `cancel` fires first
    pub async fn run(
        &self,
        config: &TrialConfig,
        cancel: &CancellationToken,
    ) -> Result<TrialResult, TrialError> {
        let started_at = Utc::now();
        let dir = artifacts::prepare(
            &self.run_root,
            config.concurrency,
            &self.node.control_socket,
            started_at,
        )
        .inspect_err(|e| self.report_failure(config.concurrency, e, None))?;

        let spec = node::launch_spec(&self.node, config.concurrency, &dir);
        let command = spec.command_line();
        info!(
            concurrency = config.concurrency,
            dir = %dir.display(),
            command = %command,
            "launching node"
        );

        let process = ProcessSupervisor::start(&spec)
            .map_err(|source| TrialError::Launch {
                concurrency: config.concurrency,
                source,
            })
            .inspect_err(|e| self.report_failure(config.concurrency, e, None))?;
        if let Some(pid) = process.pid() {
            debug!(pid, "node started");
        }

        self.supervise(config, cancel, process, &dir, started_at, command)
            .await
    }

    /// Drives an already-launched node through the trial phases, shuts it
    /// down and persists the outcome.
    ///
    /// # Errors
    ///
    /// [`TrialError::EarlyExit`] or [`TrialError::Cancelled`], see
    /// [`TrialRunner::run`].
    pub async fn supervise<P: NodeProcess>(
        &self,
        config: &TrialConfig,
        cancel: &CancellationToken,
        mut process: P,
        dir: &Path,
        started_at: DateTime<Utc>,
        command: String,
    ) -> Result<TrialResult, TrialError> {
        self.events.emit(Event::TrialStarted {
            timestamp: started_at,
            concurrency: config.concurrency,
            artifact_dir: dir.to_path_buf(),
            command,
        });

        metrics::record_trial_launch();
        let mut log = TrialLog::create(dir);
        let mut machine = PhaseMachine::new(config.timings(), Instant::now());

        let end = self
            .drive(&mut process, &mut machine, &mut log, config, cancel)
            .await;
        let exit = process
            .shutdown(config.shutdown_grace, &self.force_kill)
            .await;
        debug!(lines = log.lines(), ?exit, "node stopped");
        log.finish();

        let concurrency = config.concurrency;
        let counters = machine.counters();
        let outcome = match end {
            DriveEnd::Done => {
                let window_secs = machine
                    .window()
                    .map(|w| w.as_secs_f64())
                    .filter(|w| *w > 0.0)
                    .unwrap_or(1.0);
                Ok(TrialResult {
                    concurrency,
                    attempts: counters.attempts_in_window,
                    window_secs,
                    attempts_per_min: attempts_per_minute(counters.attempts_in_window, window_secs),
                    saw_mine_effect: counters.saw_mine_effect,
                    saw_threads_started: counters.saw_threads_started,
                    threads_reported: counters.threads_reported,
                    artifact_dir: dir.to_path_buf(),
                    started_at,
                })
            }
            DriveEnd::Exited => Err(TrialError::EarlyExit {
                concurrency,
                exit_code: exit.code(),
                phase: machine.phase(),
                counters,
                artifact_dir: dir.to_path_buf(),
            }),
            DriveEnd::Cancelled => Err(TrialError::Cancelled {
                concurrency,
                phase: machine.phase(),
                counters,
                artifact_dir: dir.to_path_buf(),
            }),
        };

        match &outcome {
            Ok(result) => self.report_success(result),
            Err(e) => self.report_failure(concurrency, e, Some(dir)),
        }
        outcome
    }

    async fn drive<P: NodeProcess>(
        &self,
        process: &mut P,
        machine: &mut PhaseMachine,
        log: &mut TrialLog,
        config: &TrialConfig,
        cancel: &CancellationToken,
    ) -> DriveEnd {
        let mut ticker = tokio::time::interval_at(
            Instant::now() + config.tick_interval,
            config.tick_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !machine.is_done() {
            let before = machine.counters().attempts_in_window;
            let transitions = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(phase = %machine.phase(), "trial cancelled");
                    return DriveEnd::Cancelled;
                }
                line = process.next_line() => match line {
                    Some(line) => {
                        trace!(target: NODE_OUTPUT_TARGET, "{line}");
                        log.append(&line);
                        machine.observe(&classify(&line), Instant::now())
                    }
                    None => {
                        // The window may have closed since the last tick.
                        let transitions = machine.tick(Instant::now());
                        if !machine.is_done() {
                            for transition in &transitions {
                                self.report_transition(config.concurrency, transition);
                            }
                            warn!(phase = %machine.phase(), "node exited before the window closed");
                            return DriveEnd::Exited;
                        }
                        debug!("node exited right after the window closed");
                        transitions
                    }
                },
                _ = ticker.tick() => machine.tick(Instant::now()),
            };

            let counted = machine.counters().attempts_in_window.saturating_sub(before);
            if counted > 0 {
                metrics::record_attempts(config.concurrency, counted);
            }
            for transition in transitions {
                self.report_transition(config.concurrency, &transition);
            }
        }
        DriveEnd::Done
    }

    fn report_transition(&self, concurrency: u32, transition: &PhaseTransition) {
        info!(
            concurrency,
            from = %transition.from,
            to = %transition.to,
            reason = %transition.reason,
            elapsed_s = format_args!("{:.1}", transition.since_launch.as_secs_f64()),
            "phase transition"
        );
        metrics::record_phase_transition(transition.from, transition.to);
        self.events.emit(Event::PhaseEntered {
            timestamp: Utc::now(),
            concurrency,
            from: transition.from,
            phase: transition.to,
            reason: transition.reason,
            since_launch_secs: transition.since_launch.as_secs_f64(),
        });
        if transition.to == Phase::Measuring {
            info!(concurrency, "measurement window open");
        }
    }

    fn report_success(&self, result: &TrialResult) {
        info!(
            concurrency = result.concurrency,
            attempts = result.attempts,
            window_s = format_args!("{:.1}", result.window_secs),
            apm = format_args!("{:.2}", result.attempts_per_min),
            "trial complete"
        );
        if !result.saw_threads_started {
            warn!(
                concurrency = result.concurrency,
                "node never confirmed its mining threads; no attempts were counted"
            );
        }
        metrics::record_trial_outcome("completed");
        metrics::record_trial_rate(
            result.concurrency,
            result.attempts_per_min,
            std::time::Duration::from_secs_f64(result.window_secs),
        );
        self.events.emit(Event::TrialCompleted {
            timestamp: Utc::now(),
            concurrency: result.concurrency,
            attempts: result.attempts,
            window_secs: result.window_secs,
            attempts_per_min: result.attempts_per_min,
        });
        artifacts::write_json(&result.artifact_dir, RESULT_FILE, result);
    }

    fn report_failure(&self, concurrency: u32, error: &TrialError, dir: Option<&Path>) {
        warn!(concurrency, error = %error, "trial failed");
        let failure = TrialFailure::from_error(concurrency, error);
        metrics::record_trial_outcome(failure_kind(error));
        self.events.emit(Event::TrialFailed {
            timestamp: Utc::now(),
            concurrency,
            error: failure.error.clone(),
            exit_code: failure.exit_code,
            phase: failure.phase_reached,
            counters: failure.counters,
        });
        if let Some(dir) = dir {
            artifacts::write_json(dir, FAILURE_FILE, &failure);
        }
    }
}

const fn failure_kind(error: &TrialError) -> &'static str {
    match error {
        TrialError::Artifacts { .. } => "artifacts",
        TrialError::Launch { .. } => "launch_error",
        TrialError::EarlyExit { .. } => "early_exit",
        TrialError::Cancelled { .. } => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::observability::events::tests::TestWriter;
    use crate::supervisor::ExitState;

    /// Node stand-in that prints scripted lines at fixed offsets.
    struct ScriptedNode {
        start: Instant,
        script: VecDeque<(Duration, String)>,
        exit_at: Option<(Duration, i32)>,
        state: ExitState,
        shutdowns: Arc<AtomicUsize>,
    }

    impl ScriptedNode {
        fn new(script: Vec<(f64, &str)>) -> Self {
            Self {
                start: Instant::now(),
                script: script
                    .into_iter()
                    .map(|(at, line)| (Duration::from_secs_f64(at), line.to_string()))
                    .collect(),
                exit_at: None,
                state: ExitState::Running,
                shutdowns: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn exiting_at(mut self, secs: f64, code: i32) -> Self {
            self.exit_at = Some((Duration::from_secs_f64(secs), code));
            self
        }
    }

    #[async_trait::async_trait]
    impl NodeProcess for ScriptedNode {
        async fn next_line(&mut self) -> Option<String> {
            if let Some((at, _)) = self.script.front() {
                tokio::time::sleep_until(self.start + *at).await;
                return self.script.pop_front().map(|(_, line)| line);
            }
            match self.exit_at {
                Some((at, code)) => {
                    tokio::time::sleep_until(self.start + at).await;
                    self.state = ExitState::Exited(Some(code));
                    None
                }
                None => std::future::pending().await,
            }
        }

        fn exit_state(&mut self) -> ExitState {
            self.state
        }

        async fn shutdown(&mut self, _grace: Duration, _force: &CancellationToken) -> ExitState {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.state == ExitState::Running {
                self.state = ExitState::Exited(None);
            }
            self.state
        }
    }

    fn config(warmup: u64, measure: u64) -> TrialConfig {
        TrialConfig {
            concurrency: 64,
            measure: Duration::from_secs(measure),
            warmup: Duration::from_secs(warmup),
            hard_start_timeout: Duration::from_secs(90),
            shutdown_grace: Duration::from_secs(10),
            tick_interval: Duration::from_secs(1),
        }
    }

    fn runner(root: &Path, events: &TestWriter) -> TrialRunner {
        TrialRunner::new(
            NodeConfig::default(),
            root.to_path_buf(),
            Arc::new(EventEmitter::new(Box::new(events.clone()))),
        )
    }

    async fn supervise(
        runner: &TrialRunner,
        config: &TrialConfig,
        cancel: &CancellationToken,
        node: ScriptedNode,
        dir: &Path,
    ) -> Result<TrialResult, TrialError> {
        runner
            .supervise(config, cancel, node, dir, Utc::now(), "node".to_string())
            .await
    }

    const THREADS: &str = "mining threads started with 64 threads";
    const ATTEMPT: &str = "starting mining attempt on thread 3";

    #[tokio::test(start_paused = true)]
    async fn early_exit_during_starting() {
        let dir = tempfile::tempdir().unwrap();
        let events = TestWriter::default();
        let runner = runner(dir.path(), &events);

        let node = ScriptedNode::new(vec![(1.0, "booting"), (2.0, "loading checkpoint")])
            .exiting_at(30.0, 1);
        let shutdowns = Arc::clone(&node.shutdowns);

        let err = supervise(&runner, &config(45, 180), &CancellationToken::new(), node, dir.path())
            .await
            .unwrap_err();

        match &err {
            TrialError::EarlyExit {
                exit_code, phase, ..
            } => {
                assert_eq!(*exit_code, Some(1));
                assert_eq!(*phase, Phase::Starting);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);

        let log = std::fs::read_to_string(dir.path().join("stdout.log")).unwrap();
        assert_eq!(log, "booting\nloading checkpoint\n");

        let failure: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("failure.json")).unwrap())
                .unwrap();
        assert_eq!(failure["phase_reached"], "starting");
        assert_eq!(failure["exit_code"], 1);
        assert!(!dir.path().join("result.json").exists());

        let kinds: Vec<_> = events.events().into_iter().map(|e| e["type"].clone()).collect();
        assert_eq!(kinds, vec!["TrialStarted", "TrialFailed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn completed_trial_counts_only_the_window() {
        let dir = tempfile::tempdir().unwrap();
        let events = TestWriter::default();
        let runner = runner(dir.path(), &events);

        // Threads at 1s, warmup 10s, window 11s..71s; attempts every second
        // on the half second.
        let mut script = vec![(1.0, THREADS)];
        script.extend((2..100).map(|s| (f64::from(s) + 0.5, ATTEMPT)));
        let node = ScriptedNode::new(script);
        let shutdowns = Arc::clone(&node.shutdowns);

        let result = supervise(&runner, &config(10, 60), &CancellationToken::new(), node, dir.path())
            .await
            .unwrap();

        assert_eq!(result.attempts, 60);
        assert!((result.window_secs - 60.0).abs() < 1e-6);
        assert!((result.attempts_per_min - 60.0).abs() < 1e-6);
        assert!(result.saw_threads_started);
        assert_eq!(result.threads_reported, Some(64));
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);

        let persisted: TrialResult =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("result.json")).unwrap())
                .unwrap();
        assert_eq!(persisted, result);

        let phases: Vec<_> = events
            .events()
            .into_iter()
            .filter(|e| e["type"] == "PhaseEntered")
            .map(|e| e["phase"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(phases, vec!["warming", "measuring", "done"]);
    }

    #[tokio::test(start_paused = true)]
    async fn exit_between_deadline_and_tick_completes_the_trial() {
        let dir = tempfile::tempdir().unwrap();
        let events = TestWriter::default();
        let runner = runner(dir.path(), &events);

        // Window opens at 0.5s and is due at 10.5s; the node exits at 10.7s,
        // before the 11s tick.
        let mut script = vec![(0.5, THREADS)];
        script.extend((1..10).map(|s| (f64::from(s) + 0.5, ATTEMPT)));
        let node = ScriptedNode::new(script).exiting_at(10.7, 0);
        let shutdowns = Arc::clone(&node.shutdowns);

        let result = supervise(&runner, &config(0, 10), &CancellationToken::new(), node, dir.path())
            .await
            .unwrap();

        assert_eq!(result.attempts, 9);
        assert!((result.window_secs - 10.2).abs() < 1e-6);
        assert!((result.attempts_per_min - 9.0 * 60.0 / 10.2).abs() < 1e-6);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("result.json").exists());
        assert!(!dir.path().join("failure.json").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_window_yields_zero_rate() {
        let dir = tempfile::tempdir().unwrap();
        let events = TestWriter::default();
        let runner = runner(dir.path(), &events);

        let node = ScriptedNode::new(vec![(1.0, THREADS)]);
        let result = supervise(&runner, &config(5, 30), &CancellationToken::new(), node, dir.path())
            .await
            .unwrap();

        assert_eq!(result.attempts, 0);
        assert!(result.attempts_per_min.abs() < f64::EPSILON);
        assert!((result.window_secs - 30.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn hard_start_timeout_still_measures() {
        let dir = tempfile::tempdir().unwrap();
        let events = TestWriter::default();
        let runner = runner(dir.path(), &events);

        let node = ScriptedNode::new(vec![(10.0, ATTEMPT), (100.0, ATTEMPT)]);
        let result = supervise(&runner, &config(0, 20), &CancellationToken::new(), node, dir.path())
            .await
            .unwrap();

        assert!(!result.saw_threads_started);
        assert_eq!(result.attempts, 0);
        assert_eq!(result.threads_reported, None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_shuts_down_once() {
        let dir = tempfile::tempdir().unwrap();
        let events = TestWriter::default();
        let runner = runner(dir.path(), &events);

        let node = ScriptedNode::new(vec![(1.0, THREADS), (3.0, ATTEMPT)]);
        let shutdowns = Arc::clone(&node.shutdowns);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            trigger.cancel();
        });

        let err = supervise(&runner, &config(10, 60), &cancel, node, dir.path())
            .await
            .unwrap_err();

        match &err {
            TrialError::Cancelled { phase, counters, .. } => {
                assert_eq!(*phase, Phase::Measuring);
                assert_eq!(counters.attempts_total, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("failure.json").exists());
    }

    #[tokio::test]
    async fn missing_binary_is_launch_error() {
        let root = tempfile::tempdir().unwrap();
        let events = TestWriter::default();
        let node = NodeConfig {
            binary: PathBuf::from("/nonexistent/minebench-node"),
            ..NodeConfig::default()
        };
        let runner = TrialRunner::new(
            node,
            root.path().to_path_buf(),
            Arc::new(EventEmitter::new(Box::new(events.clone()))),
        );

        let err = runner
            .run(&config(0, 1), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TrialError::Launch { concurrency: 64, .. }));
        let entries: Vec<_> = std::fs::read_dir(root.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "only the trial directory is created");
        assert_eq!(events.events()[0]["type"], "TrialFailed");
    }
}
