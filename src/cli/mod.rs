//! CLI module
//!
//! Command-line interface definitions and command handlers.

pub mod args;
pub mod commands;
