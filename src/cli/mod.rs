//! Command-line interface for agentarena.
//!
//! Provides the `run`, `init` and `history` commands.

mod commands;

pub use commands::{apply_overrides, parse_cli, run, run_with_cli, Cli, RunArgs};
