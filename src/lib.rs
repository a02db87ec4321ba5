//! agentarena: race coding agents on your own tasks.
//!
//! This library runs every configured agent against every task in an
//! isolated workspace, validates the result, extracts cost and token
//! metrics from agent output, and ranks the agents.

pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod report;
pub mod runner;

// Re-export commonly used types
pub use config::{load_config, AgentConfig, BenchConfig, TaskConfig};
pub use error::{ConfigError, HistoryError};
pub use runner::{run_benchmark, BenchmarkResult, RunMetrics, TaskSummary};
