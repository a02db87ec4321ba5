//! Benchmark runner: races agents against tasks in isolated workspaces.
//!
//! # Architecture
//!
//! ```text
//! BenchConfig → BenchmarkRunner ─┬─ sandbox   (worktree or copy per pair)
//!                                ├─ executor  (shell command + hard timeout)
//!                                ├─ extract   (regex metrics from agent output)
//!                                └─ scoring   (per-agent summaries, winner)
//! ```
//!
//! For each task, every agent gets a fresh sandbox, runs with the task
//! prompt, and the task's validation command decides pass/fail. Every pair
//! yields exactly one [`RunMetrics`], failures included.
//!
//! # Example
//!
//! ```ignore
//! use agentarena::config::load_config;
//! use agentarena::runner::run_benchmark;
//!
//! let config = load_config(Path::new("bench.yaml"))?;
//! let result = run_benchmark(&config, Path::new(".")).await?;
//!
//! if let Some(winner) = result.winner() {
//!     println!("{} wins with {:.0}%", winner.agent_id, winner.pass_rate() * 100.0);
//! }
//! ```

pub mod agent;
pub mod executor;
pub mod extract;
pub mod orchestrator;
pub mod result;
pub mod sandbox;
pub mod scoring;

pub use agent::{Agent, AgentRun};
pub use executor::{execute, ExecError, ExecOutput};
pub use extract::{extract, ExtractedMetrics, ExtractionPatterns};
pub use orchestrator::{run_benchmark, run_single, BenchmarkResult, BenchmarkRunner, RunnerError};
pub use result::{RunMetrics, RunMetricsBuilder};
pub use sandbox::{create_sandbox, destroy_sandbox, Sandbox, SandboxError, SandboxStrategy};
pub use scoring::{pick_winner, summarize, SummaryStats, TaskSummary};
