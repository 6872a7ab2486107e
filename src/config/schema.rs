//! Configuration schema.
//!
//! Every section is optional; omitted fields fall back to defaults that
//! benchmark a local `nockchain` miner the same way a hand-run session
//! would.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Length of the measurement window.
pub const DEFAULT_MEASURE: Duration = Duration::from_secs(180);

/// Warmup discarded before measuring.
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(45);

/// Maximum wait for the node to confirm its mining threads.
pub const DEFAULT_HARD_START_TIMEOUT: Duration = Duration::from_secs(90);

/// Time the node gets to exit after a termination request.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Interval of the phase clock during silent periods.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Concurrency settings benchmarked when none are given.
pub const DEFAULT_SETTINGS: [u32; 3] = [64, 80, 92];

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// How to launch the node.
    pub node: NodeConfig,
    /// Phase timing shared by every trial.
    pub trial: TrialSettings,
    /// Directory under which per-trial artifact directories are created.
    pub run_root: PathBuf,
    /// Concurrency settings to benchmark, in order.
    pub settings: Vec<u32>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            trial: TrialSettings::default(),
            run_root: PathBuf::from("~/nock_bench_runs"),
            settings: DEFAULT_SETTINGS.to_vec(),
        }
    }
}

impl BenchConfig {
    /// Expands a leading `~/` in every path field.
    #[must_use]
    pub fn with_expanded_paths(mut self) -> Self {
        self.node.binary = expand_home(&self.node.binary);
        self.run_root = expand_home(&self.run_root);
        self
    }
}

/// Node launch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Node executable.
    pub binary: PathBuf,
    /// Flag that takes the concurrency setting as its value.
    pub concurrency_flag: String,
    /// Fixed arguments appended after the concurrency flag.
    pub args: Vec<String>,
    /// Environment overrides for the node.
    pub env: BTreeMap<String, String>,
    /// Control socket, relative to the trial directory, removed before each
    /// launch.
    pub control_socket: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let args = [
            "--mine",
            "--mining-pkh",
            "7zACBdiqSrsE1DeE2ytKrdY1aKrrmQsaDBHunpTYz9FRtihGe84YyPd",
            "--bind",
            "/ip4/0.0.0.0/udp/3006/quic-v1",
            "--no-new-peer-id",
            "--bind-private-grpc-port",
            "5556",
            "--bind-public-grpc-addr",
            "127.0.0.1:5557",
            "--peer",
            "/dnsaddr/nockchain-backbone.zorp.io",
        ];
        let env = [
            ("RUST_LOG", "info,nockchain=debug,mining=debug"),
            ("MINIMAL_LOG_FORMAT", "1"),
            ("RUST_BACKTRACE", "full"),
        ];

        Self {
            binary: PathBuf::from("~/.cargo/bin/nockchain"),
            concurrency_flag: "--num-threads".to_string(),
            args: args.iter().map(ToString::to_string).collect(),
            env: env
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            control_socket: PathBuf::from(".socket/nockchain_npc.sock"),
        }
    }
}

/// Phase timing for trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrialSettings {
    /// Length of the measurement window.
    #[serde(with = "humantime_serde")]
    pub measure: Duration,
    /// Warmup after thread start.
    #[serde(with = "humantime_serde")]
    pub warmup: Duration,
    /// Maximum time to wait for thread start.
    #[serde(with = "humantime_serde")]
    pub hard_start_timeout: Duration,
    /// Grace period between termination request and kill.
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
    /// Phase clock interval.
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
}

impl Default for TrialSettings {
    fn default() -> Self {
        Self {
            measure: DEFAULT_MEASURE,
            warmup: DEFAULT_WARMUP,
            hard_start_timeout: DEFAULT_HARD_START_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Replaces a leading `~` path component with `$HOME`.
///
/// Paths without a leading `~`, or when `HOME` is unset, are returned
/// unchanged.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    std::env::var_os("HOME").map_or_else(|| path.to_path_buf(), |home| PathBuf::from(home).join(rest))
}
