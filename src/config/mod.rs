//! Configuration module.
//!
//! Loads and validates benchmark configuration files: how to launch the
//! node, trial phase timing, and the concurrency settings to sweep.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLoader, LoadResult, LoadWarning, LoaderOptions};
pub use schema::*;
pub use validation::{ValidationResult, Validator};
