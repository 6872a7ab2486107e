//! Trial phase state machine.
//!
//! Drives one trial through `Starting → Warming → Measuring → Done` from
//! classified log signals and elapsed time, and owns the counters the
//! throughput metric is computed from.
//!
//! # Architecture
//!
//! - [`Phase`], [`Counters`], [`PhaseTransition`]: plain state values
//! - [`PhaseMachine`]: transition logic (`observe` for lines, `tick` for
//!   silent periods)

pub mod machine;
pub mod state;

pub use machine::{PhaseMachine, PhaseTimings};
pub use state::{Counters, Phase, PhaseTransition, TransitionReason};
