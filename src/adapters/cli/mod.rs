//! CLI Adapter
//!
//! Command-line interface for the tradewind binary.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{BlacklistAction, BlacklistCmd, CliApp, Command, ConfigArg, QuoteCmd, RunCmd, StatusCmd};
