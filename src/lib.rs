//! `minebench` - throughput benchmark for mining nodes
//!
//! Launches a mining node at a series of concurrency settings, watches its
//! log output for mining attempts, and ranks the settings by attempts per
//! minute over a fixed measurement window.
//!
//! The pieces, leaf first:
//!
//! - [`signal`] classifies single log lines
//! - [`supervisor`] owns the node process and its merged output
//! - [`phase`] turns signals and elapsed time into trial phases and counters
//! - [`trial`] composes those into one trial with on-disk artifacts
//! - [`batch`] and [`report`] sweep the settings and rank the results

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod node;
pub mod observability;
pub mod phase;
pub mod report;
pub mod signal;
pub mod supervisor;
pub mod trial;
