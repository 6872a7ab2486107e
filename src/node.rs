//! Node command construction.

use std::path::Path;

use crate::config::NodeConfig;
use crate::supervisor::LaunchSpec;

/// Builds the launch spec for one trial.
///
/// The argument vector is `[concurrency_flag, N, args...]`; the node runs
/// inside `trial_dir` so its data directory and control socket stay
/// isolated per trial.
#[must_use]
pub fn launch_spec(node: &NodeConfig, concurrency: u32, trial_dir: &Path) -> LaunchSpec {
    let mut args = Vec::with_capacity(node.args.len() + 2);
    args.push(node.concurrency_flag.clone());
    args.push(concurrency.to_string());
    args.extend(node.args.iter().cloned());

    LaunchSpec {
        program: node.binary.clone(),
        args,
        working_dir: trial_dir.to_path_buf(),
        env: node.env.clone(),
    }
}
