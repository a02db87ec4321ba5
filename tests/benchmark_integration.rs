//! End-to-end benchmark runs against throwaway projects.
//!
//! Git-based tests skip themselves when git is not installed.

use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

use agentarena::config::{AgentConfig, BenchConfig, MetricPatterns, TaskConfig};
use agentarena::history;
use agentarena::report;
use agentarena::runner::{run_benchmark, sandbox, BenchmarkRunner};
use tempfile::TempDir;

fn plain_project() -> TempDir {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("main.py"), "print('hello')\n").unwrap();
    temp
}

fn git(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git_project() -> Option<TempDir> {
    let temp = plain_project();
    let ok = git(temp.path(), &["init", "-q"])
        && git(temp.path(), &["config", "user.email", "test@test.com"])
        && git(temp.path(), &["config", "user.name", "Test"])
        && git(temp.path(), &["add", "."])
        && git(temp.path(), &["commit", "-q", "-m", "init"]);
    ok.then_some(temp)
}

#[tokio::test]
async fn test_full_matrix_all_pass() {
    let project = plain_project();
    let config = BenchConfig::new(
        vec![
            TaskConfig::new("t1", "first", "test -f out.txt"),
            TaskConfig::new("t2", "second", "grep -q second out.txt"),
        ],
        vec![
            AgentConfig::new("a1", "echo {prompt} > out.txt"),
            AgentConfig::new("a2", "printf '%s\\n' {prompt} > out.txt"),
        ],
    )
    .with_project("demo")
    .with_timeout(30);

    let result = run_benchmark(&config, project.path()).await.unwrap();

    let pairs: Vec<(&str, &str)> = result
        .runs
        .iter()
        .map(|r| (r.task_id.as_str(), r.agent_id.as_str()))
        .collect();
    assert_eq!(pairs, vec![("t1", "a1"), ("t1", "a2"), ("t2", "a1"), ("t2", "a2")]);
    assert!(result.runs.iter().all(|r| r.passed), "{:?}", result.runs);
    assert!(result.runs.iter().all(|r| r.error.is_none()));

    assert_eq!(result.summaries.len(), 2);
    assert_eq!(result.summaries[0].pass_rate(), 1.0);
    // Agents only ever touched their sandboxes.
    assert!(!project.path().join("out.txt").exists());
}

#[tokio::test]
async fn test_failing_validation_is_recorded() {
    let project = plain_project();
    let config = BenchConfig::new(
        vec![TaskConfig::new("t1", "p", "exit 1")],
        vec![AgentConfig::new("a1", "true {prompt}")],
    );

    let result = run_benchmark(&config, project.path()).await.unwrap();
    let run = &result.runs[0];
    assert!(!run.passed);
    assert!(!run.timed_out);
    assert_eq!(run.exit_code, Some(1));
    assert!(run.error.is_none());
}

#[tokio::test]
async fn test_metrics_extracted_from_agent_output() {
    let project = plain_project();
    let patterns = MetricPatterns {
        tokens_in: Some(r"input tokens:\s*([\d,]+)".into()),
        tokens_out: Some(r"output tokens:\s*([\d,]+)".into()),
        cost: Some(r"cost:\s*\$?([\d.]+)".into()),
        llm_calls: None,
    };
    let agent = AgentConfig::new(
        "talker",
        "echo 'Input Tokens: 4,200' && echo 'output tokens: 800' >&2 && echo 'Cost: $0.12' # {prompt}",
    )
    .with_patterns(patterns);
    let config = BenchConfig::new(vec![TaskConfig::new("t1", "p", "true")], vec![agent]);

    let result = run_benchmark(&config, project.path()).await.unwrap();
    let run = &result.runs[0];
    assert!(run.passed);
    assert_eq!(run.tokens_in, Some(4200));
    assert_eq!(run.tokens_out, Some(800));
    assert_eq!(run.cost_usd, Some(0.12));
    assert_eq!(run.llm_calls, None);
    assert_eq!(run.total_tokens(), Some(5000));
}

#[tokio::test]
async fn test_bad_base_ref_fails_every_pair() {
    let Some(project) = git_project() else {
        eprintln!("git unavailable; skipping");
        return;
    };
    let config = BenchConfig::new(
        vec![TaskConfig::new("t1", "p", "true"), TaskConfig::new("t2", "p", "true")],
        vec![AgentConfig::new("a1", "true {prompt}")],
    )
    .with_base("no-such-ref");

    let result = run_benchmark(&config, project.path()).await.unwrap();
    assert_eq!(result.runs.len(), 2);
    for run in &result.runs {
        assert!(!run.passed);
        let error = run.error.as_deref().unwrap();
        assert!(error.starts_with("Sandbox creation failed"), "{}", error);
    }
}

#[tokio::test]
async fn test_worktree_sandbox_sees_committed_files() {
    let Some(project) = git_project() else {
        eprintln!("git unavailable; skipping");
        return;
    };
    let config = BenchConfig::new(
        vec![TaskConfig::new("t1", "p", "test -f main.py && test -f touched")],
        vec![AgentConfig::new("a1", "touch touched # {prompt}")],
    );

    let result = run_benchmark(&config, project.path()).await.unwrap();
    assert!(result.runs[0].passed, "{:?}", result.runs[0]);
    assert!(!project.path().join("touched").exists());
    let worktrees = sandbox::list_worktrees(project.path()).await.unwrap();
    assert_eq!(worktrees.len(), 1, "leftover worktrees: {:?}", worktrees);
}

#[tokio::test]
async fn test_winner_callback_and_history() {
    let project = plain_project();
    let config = BenchConfig::new(
        vec![
            TaskConfig::new("t1", "p", "test -f done"),
            TaskConfig::new("t2", "p", "test -f done"),
        ],
        vec![
            AgentConfig::new("lazy", "true {prompt}"),
            AgentConfig::new("worker", "touch done # {prompt}"),
        ],
    )
    .with_parallel(2);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let runner = BenchmarkRunner::new(config, project.path())
        .unwrap()
        .with_task_callback(Box::new(move |task, runs| {
            sink.lock().unwrap().push((task.id.clone(), runs.len()));
        }));

    let result = runner.run().await.unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![("t1".to_string(), 2), ("t2".to_string(), 2)]
    );

    // Agent order is kept even when pairs overlap.
    assert_eq!(result.runs[0].agent_id, "lazy");
    assert_eq!(result.runs[1].agent_id, "worker");

    for _ in 0..5 {
        assert_eq!(result.winner().unwrap().agent_id, "worker");
    }

    let summary = report::render_summary(&result.summaries, result.winner());
    assert!(summary.contains("Winner: worker (2/2 passed"));

    history::save_run(project.path(), &result).unwrap();
    let entries = history::list_runs(project.path()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].winner, "worker");
    assert_eq!(entries[0].num_agents, "2");
}
