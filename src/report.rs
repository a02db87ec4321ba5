//! Scoreboard rendering and result export.
//!
//! Text renderers return strings so the CLI decides where they go. Exports
//! cover JSON (every run), CSV (every run) and Markdown (summary table).

use std::fmt::Write as _;

use serde::Serialize;

use crate::config::TaskConfig;
use crate::runner::{RunMetrics, TaskSummary};

/// CSV columns, in order.
const CSV_FIELDS: &[&str] = &[
    "agent",
    "task",
    "passed",
    "wall_time_seconds",
    "tokens_in",
    "tokens_out",
    "cost_usd",
    "llm_calls",
    "timed_out",
];

/// Formats seconds as `42s` or `1m5s`.
pub fn format_time(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.0}s", seconds)
    } else {
        let minutes = (seconds / 60.0).floor() as u64;
        let secs = (seconds % 60.0).floor() as u64;
        format!("{}m{}s", minutes, secs)
    }
}

/// Formats a token count as `950` or `4.2K`; `-` when absent.
pub fn format_tokens(count: Option<u64>) -> String {
    match count {
        None => "-".to_string(),
        Some(n) if n >= 1000 => format!("{:.1}K", n as f64 / 1000.0),
        Some(n) => n.to_string(),
    }
}

/// Formats a cost as `$0.12`; `-` when absent.
pub fn format_cost(cost: Option<f64>) -> String {
    match cost {
        None => "-".to_string(),
        Some(c) => format!("${:.2}", c),
    }
}

/// Short outcome label for one run.
pub fn status_label(run: &RunMetrics) -> &'static str {
    if run.timed_out {
        "TIMEOUT"
    } else if run.passed {
        "PASS"
    } else {
        "FAIL"
    }
}

/// Banner printed before the matrix starts.
pub fn render_header(project: &str, num_agents: usize, num_tasks: usize) -> String {
    format!(
        "agentarena v{}: racing {} agents on {} tasks\nproject: {}\n",
        env!("CARGO_PKG_VERSION"),
        num_agents,
        num_tasks,
        project
    )
}

/// One row per agent for a finished task.
pub fn render_task(task: &TaskConfig, index: usize, total: usize, runs: &[RunMetrics]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n── Task {}/{}: {} ──", index, total, task.id);
    let _ = writeln!(out, "  {}\n", task.prompt);
    let _ = writeln!(
        out,
        "  {:<15} {:^8} {:>8} {:>8} {:>10} {:>10}",
        "Agent", "Result", "Time", "Cost", "Tokens", "LLM Calls"
    );

    for run in runs {
        let _ = writeln!(
            out,
            "  {:<15} {:^8} {:>8} {:>8} {:>10} {:>10}",
            run.agent_id,
            status_label(run),
            format_time(run.wall_time_seconds),
            format_cost(run.cost_usd),
            format_tokens(run.total_tokens()),
            run.llm_calls.map_or_else(|| "-".to_string(), |n| n.to_string()),
        );
        if let Some(error) = &run.error {
            let _ = writeln!(out, "  {:<15} error: {}", "", error);
        }
    }
    out
}

/// Final scoreboard with the winner line.
pub fn render_summary(summaries: &[TaskSummary], winner: Option<&TaskSummary>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n── RESULTS ──\n");
    let _ = writeln!(
        out,
        "  {:<15} {:^12} {:>10} {:>10} {:>13}",
        "Agent", "Pass Rate", "Avg Time", "Avg Cost", "Total Tokens"
    );

    for s in summaries {
        let _ = writeln!(
            out,
            "  {:<15} {:^12} {:>10} {:>10} {:>13}",
            s.agent_id,
            pass_rate_label(s),
            format_time(s.avg_time()),
            format_cost(s.avg_cost()),
            format_tokens(s.total_tokens()),
        );
    }

    if let Some(w) = winner {
        let _ = writeln!(
            out,
            "\n  Winner: {} ({}/{} passed, {} avg cost)",
            w.agent_id,
            w.pass_count(),
            w.total_count(),
            format_cost(w.avg_cost())
        );
    }
    out
}

fn pass_rate_label(s: &TaskSummary) -> String {
    format!(
        "{}/{} {:.0}%",
        s.pass_count(),
        s.total_count(),
        s.pass_rate() * 100.0
    )
}

/// A run plus its derived fields, as exported.
#[derive(Serialize)]
struct ExportedRun<'a> {
    #[serde(flatten)]
    run: &'a RunMetrics,
    total_tokens: Option<u64>,
}

/// Exports all runs as a pretty JSON array.
pub fn to_json(runs: &[RunMetrics]) -> Result<String, serde_json::Error> {
    let records: Vec<ExportedRun<'_>> = runs
        .iter()
        .map(|run| ExportedRun {
            run,
            total_tokens: run.total_tokens(),
        })
        .collect();
    serde_json::to_string_pretty(&records)
}

/// Exports all runs as CSV. Absent values are empty cells.
pub fn to_csv(runs: &[RunMetrics]) -> String {
    if runs.is_empty() {
        return String::new();
    }

    let mut out = CSV_FIELDS.join(",");
    out.push('\n');
    for run in runs {
        let row = [
            csv_field(&run.agent_id),
            csv_field(&run.task_id),
            run.passed.to_string(),
            run.wall_time_seconds.to_string(),
            opt(run.tokens_in),
            opt(run.tokens_out),
            opt(run.cost_usd),
            opt(run.llm_calls),
            run.timed_out.to_string(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Exports the per-agent summary as a Markdown table.
pub fn to_markdown(summaries: &[TaskSummary]) -> String {
    let mut lines = vec![
        "| Agent | Pass Rate | Avg Time | Avg Cost | Total Tokens |".to_string(),
        "|-------|-----------|----------|----------|--------------|".to_string(),
    ];
    for s in summaries {
        lines.push(format!(
            "| {} | {} | {} | {} | {} |",
            s.agent_id,
            pass_rate_label(s),
            format_time(s.avg_time()),
            format_cost(s.avg_cost()),
            format_tokens(s.total_tokens()),
        ));
    }
    lines.join("\n")
}
