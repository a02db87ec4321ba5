//! Benchmark orchestration: the task × agent matrix.
//!
//! Each pair runs through strictly ordered stages:
//!
//! ```text
//! create sandbox → run agent → (skip if agent timed out) → validate → destroy sandbox
//! ```
//!
//! A pair never aborts the matrix. Sandbox failures, spawn errors and even
//! panics inside a stage end up in [`RunMetrics::error`], and the sandbox is
//! destroyed no matter how the stages ended.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::{stream, FutureExt, StreamExt};
use tracing::{error, info, info_span, warn, Instrument};

use super::agent::Agent;
use super::executor;
use super::result::{RunMetrics, RunMetricsBuilder};
use super::sandbox::{self, SandboxError};
use super::scoring::{self, TaskSummary};
use crate::config::{BenchConfig, TaskConfig};
use crate::error::ConfigError;

/// Called after every agent has finished one task.
pub type TaskCallback = Box<dyn Fn(&TaskConfig, &[RunMetrics]) + Send + Sync>;

/// Everything a benchmark run produced.
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub project: String,
    /// One record per pair, task-major then agent-minor.
    pub runs: Vec<RunMetrics>,
    /// One summary per agent, in declaration order.
    pub summaries: Vec<TaskSummary>,
}

impl BenchmarkResult {
    pub fn winner(&self) -> Option<&TaskSummary> {
        scoring::pick_winner(&self.summaries)
    }
}

/// Failures that stop a benchmark before the matrix starts.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("No tasks to run")]
    NoTasks,

    #[error("No agents to run")]
    NoAgents,

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to prepare sandbox root: {0}")]
    SandboxRoot(#[from] SandboxError),
}

/// Drives the full matrix for one bench config.
pub struct BenchmarkRunner {
    config: BenchConfig,
    project_root: PathBuf,
    agents: Vec<Agent>,
    on_task: Option<TaskCallback>,
}

impl BenchmarkRunner {
    /// Creates a runner, building agents from the config.
    pub fn new(config: BenchConfig, project_root: impl Into<PathBuf>) -> Result<Self, RunnerError> {
        if config.tasks.is_empty() {
            return Err(RunnerError::NoTasks);
        }
        if config.agents.is_empty() {
            return Err(RunnerError::NoAgents);
        }

        let agents = config
            .agents
            .iter()
            .map(Agent::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            project_root: project_root.into(),
            agents,
            on_task: None,
        })
    }

    /// Registers a callback invoked as each task's row of the matrix completes.
    pub fn with_task_callback(mut self, callback: TaskCallback) -> Self {
        self.on_task = Some(callback);
        self
    }

    /// Runs every task against every agent and aggregates the results.
    pub async fn run(&self) -> Result<BenchmarkResult, RunnerError> {
        sandbox::prepare_sandbox_root(&self.project_root).await?;

        let parallel = self.config.parallel.max(1);
        info!(
            "Racing {} agents on {} tasks (project {}, parallel {})",
            self.agents.len(),
            self.config.tasks.len(),
            self.config.project,
            parallel
        );

        let mut runs = Vec::with_capacity(self.config.tasks.len() * self.agents.len());
        for (index, task) in self.config.tasks.iter().enumerate() {
            info!("Task {}/{}: {}", index + 1, self.config.tasks.len(), task.id);

            // `buffered` keeps agent order even when pairs overlap.
            let task_runs: Vec<RunMetrics> = stream::iter(&self.agents)
                .map(|agent| {
                    run_single(
                        agent,
                        task,
                        &self.project_root,
                        self.config.timeout,
                        &self.config.base,
                    )
                })
                .buffered(parallel)
                .collect()
                .await;

            if let Some(callback) = &self.on_task {
                callback(task, &task_runs);
            }
            runs.extend(task_runs);
        }

        let agent_ids: Vec<&str> = self.agents.iter().map(|a| a.id.as_str()).collect();
        let summaries = scoring::summarize(&runs, &agent_ids);

        Ok(BenchmarkResult {
            project: self.config.project.clone(),
            runs,
            summaries,
        })
    }
}

/// Runs the full benchmark for `config` against `project_root`.
pub async fn run_benchmark(config: &BenchConfig, project_root: &Path) -> Result<BenchmarkResult, RunnerError> {
    BenchmarkRunner::new(config.clone(), project_root)?.run().await
}

/// Runs one agent on one task in a fresh sandbox. Always returns a record.
pub async fn run_single(
    agent: &Agent,
    task: &TaskConfig,
    project_root: &Path,
    global_timeout: u64,
    base_ref: &str,
) -> RunMetrics {
    let span = info_span!("pair", agent = %agent.id, task = %task.id);
    async move {
        let initial = RunMetrics::builder(&agent.id, &task.id);
        let timeout = Duration::from_secs(task.effective_timeout(global_timeout));

        let sandbox = match sandbox::create_sandbox(project_root, base_ref).await {
            Ok(sandbox) => sandbox,
            Err(e) => {
                error!("Sandbox creation failed: {}", e);
                return initial.failed(format!("Sandbox creation failed: {}", e)).build();
            }
        };

        let staged = AssertUnwindSafe(run_stages(agent, task, &sandbox.path, timeout, initial.clone()))
            .catch_unwind()
            .await;
        let builder = staged.unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            error!("Pair panicked: {}", message);
            initial.failed(message)
        });

        sandbox::destroy_sandbox(project_root, &sandbox).await;

        let metrics = builder.build();
        info!(
            passed = metrics.passed,
            timed_out = metrics.timed_out,
            "Finished in {:.2}s",
            metrics.wall_time_seconds
        );
        metrics
    }
    .instrument(span)
    .await
}

/// Agent then validation, inside an existing sandbox.
async fn run_stages(
    agent: &Agent,
    task: &TaskConfig,
    workdir: &Path,
    timeout: Duration,
    builder: RunMetricsBuilder,
) -> RunMetricsBuilder {
    let agent_run = match agent.run(&task.prompt, workdir, timeout).await {
        Ok(run) => run,
        Err(e) => {
            error!("Agent failed to run: {}", e);
            return builder.failed(e.to_string());
        }
    };
    let builder = builder.agent_finished(&agent_run.output, &agent_run.metrics);

    if agent_run.output.timed_out {
        warn!("Agent timed out after {}s; skipping validation", timeout.as_secs());
        return builder;
    }

    match executor::execute(&task.validate_command, workdir, timeout).await {
        Ok(output) => {
            if output.timed_out {
                warn!("Validation timed out after {}s", timeout.as_secs());
            }
            builder.validated(&output)
        }
        Err(e) => {
            error!("Validation failed to run: {}", e);
            builder.failed(e.to_string())
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic: unknown payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use tempfile::TempDir;

    fn plain_project() -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("data.txt"), "test data").unwrap();
        temp
    }

    fn agent(command: &str) -> Agent {
        Agent::from_config(&AgentConfig::new("agent", command)).unwrap()
    }

    #[tokio::test]
    async fn test_run_single_passing() {
        let project = plain_project();
        let task = TaskConfig::new("t1", "do something", "exit 0");
        let run = run_single(&agent("echo done # {prompt}"), &task, project.path(), 30, "HEAD").await;

        assert!(run.passed);
        assert!(!run.timed_out);
        assert!(run.error.is_none());
        assert_eq!(run.exit_code, Some(0));
        assert_eq!(run.agent_id, "agent");
        assert_eq!(run.task_id, "t1");
    }

    #[tokio::test]
    async fn test_validation_sees_agent_changes() {
        let project = plain_project();
        let task = TaskConfig::new("t1", "out.txt", "test -f out.txt");
        let run = run_single(&agent("touch {prompt}"), &task, project.path(), 30, "HEAD").await;

        assert!(run.passed);
        assert!(!project.path().join("out.txt").exists());
    }

    #[tokio::test]
    async fn test_agent_timeout_skips_validation() {
        let project = plain_project();
        // Validation would create a marker outside the sandbox if it ran.
        let marker = project.path().join("validated");
        let task = TaskConfig::new("t1", "p", format!("touch '{}'", marker.display())).with_timeout(1);
        let run = run_single(&agent("sleep 30 # {prompt}"), &task, project.path(), 30, "HEAD").await;

        assert!(!run.passed);
        assert!(run.timed_out);
        assert_eq!(run.exit_code, None);
        assert!(!marker.exists());
        assert!(run.wall_time_seconds < 10.0);
    }

    #[tokio::test]
    async fn test_validation_timeout_fails_pair() {
        let project = plain_project();
        let task = TaskConfig::new("t1", "p", "sleep 30").with_timeout(1);
        let run = run_single(&agent("true # {prompt}"), &task, project.path(), 30, "HEAD").await;

        assert!(!run.passed);
        assert!(run.timed_out);
        assert_eq!(run.exit_code, Some(executor::KILLED_EXIT_CODE));
    }

    #[tokio::test]
    async fn test_sandbox_is_destroyed() {
        let project = plain_project();
        let task = TaskConfig::new("t1", "p", "exit 1");
        let run = run_single(&agent("true # {prompt}"), &task, project.path(), 30, "HEAD").await;
        assert!(!run.passed);

        let leftovers: Vec<_> = std::fs::read_dir(sandbox::sandbox_root(project.path()))
            .unwrap()
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_sandbox_failure_recorded() {
        let project = TempDir::new().unwrap();
        // A file where the hidden directory should go blocks sandbox creation.
        std::fs::write(project.path().join(sandbox::ARENA_DIR), "not a dir").unwrap();

        let task = TaskConfig::new("t1", "p", "exit 0");
        let run = run_single(&agent("true # {prompt}"), &task, project.path(), 30, "HEAD").await;
        assert!(!run.passed);
        assert!(run.error.unwrap().starts_with("Sandbox creation failed"));
    }

    #[test]
    fn test_runner_rejects_empty_matrix() {
        let config = BenchConfig::new(vec![], vec![AgentConfig::new("a", "x {prompt}")]);
        assert!(matches!(
            BenchmarkRunner::new(config, "."),
            Err(RunnerError::NoTasks)
        ));

        let config = BenchConfig::new(vec![TaskConfig::new("t", "p", "true")], vec![]);
        assert!(matches!(
            BenchmarkRunner::new(config, "."),
            Err(RunnerError::NoAgents)
        ));
    }

    #[tokio::test]
    async fn test_unusable_sandbox_root_aborts_run() {
        let project = TempDir::new().unwrap();
        std::fs::write(project.path().join(sandbox::ARENA_DIR), "not a dir").unwrap();
        let config = BenchConfig::new(
            vec![TaskConfig::new("t1", "p", "true")],
            vec![AgentConfig::new("a", "true {prompt}")],
        );

        let err = run_benchmark(&config, project.path()).await.unwrap_err();
        assert!(matches!(err, RunnerError::SandboxRoot(SandboxError::Root { .. })));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "panic: boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "panic: bang");
    }
}
