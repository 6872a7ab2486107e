//! Observability module
//!
//! Logging, metrics, and structured event infrastructure for following a
//! benchmark run.

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{BatchSummary, Event, EventEmitter};
pub use logging::{LogFormat, init_logging};
pub use metrics::init_metrics;
