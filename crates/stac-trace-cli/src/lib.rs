//! stac-trace command-line front end: settings, command handlers, and output.

pub mod commands;
pub mod config;
pub mod output;

pub use config::{ConfigError, Overrides, Settings};
pub use output::OutputFormat;
