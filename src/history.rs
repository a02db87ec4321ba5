//! Run history persistence under `.agentarena/runs`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::HistoryError;
use crate::runner::sandbox::ARENA_DIR;
use crate::runner::{BenchmarkResult, RunMetrics, SummaryStats};

/// Subdirectory of the arena directory holding saved runs.
pub const RUNS_DIR: &str = "runs";

/// File name format for saved runs; sorts chronologically.
const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// A saved benchmark run, as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: DateTime<Local>,
    pub project: String,
    pub num_tasks: usize,
    pub num_agents: usize,
    pub winner: Option<String>,
    pub summary: Vec<SummaryStats>,
    pub runs: Vec<RunMetrics>,
}

impl RunRecord {
    pub fn from_result(result: &BenchmarkResult, timestamp: DateTime<Local>) -> Self {
        let mut task_ids: Vec<&str> = result.runs.iter().map(|r| r.task_id.as_str()).collect();
        task_ids.sort_unstable();
        task_ids.dedup();

        Self {
            timestamp,
            project: result.project.clone(),
            num_tasks: task_ids.len(),
            num_agents: result.summaries.len(),
            winner: result.winner().map(|w| w.agent_id.clone()),
            summary: result.summaries.iter().map(|s| s.stats()).collect(),
            runs: result.runs.clone(),
        }
    }
}

/// One line of `agentarena history`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub file: String,
    pub timestamp: String,
    pub project: String,
    pub num_tasks: String,
    pub num_agents: String,
    pub winner: String,
}

impl HistoryEntry {
    fn unreadable(file: String) -> Self {
        Self {
            file,
            timestamp: "?".into(),
            project: "?".into(),
            num_tasks: "?".into(),
            num_agents: "?".into(),
            winner: "?".into(),
        }
    }

    fn from_record(file: String, record: &RunRecord) -> Self {
        Self {
            file,
            timestamp: record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            project: record.project.clone(),
            num_tasks: record.num_tasks.to_string(),
            num_agents: record.num_agents.to_string(),
            winner: record.winner.clone().unwrap_or_else(|| "-".into()),
        }
    }
}

pub fn runs_dir(project_root: &Path) -> PathBuf {
    project_root.join(ARENA_DIR).join(RUNS_DIR)
}

/// Saves a finished benchmark and returns the written path.
pub fn save_run(project_root: &Path, result: &BenchmarkResult) -> Result<PathBuf, HistoryError> {
    save_run_at(project_root, result, Local::now())
}

fn save_run_at(
    project_root: &Path,
    result: &BenchmarkResult,
    timestamp: DateTime<Local>,
) -> Result<PathBuf, HistoryError> {
    let dir = runs_dir(project_root);
    std::fs::create_dir_all(&dir)?;

    let record = RunRecord::from_result(result, timestamp);
    let path = dir.join(format!("{}.json", timestamp.format(FILE_TIMESTAMP_FORMAT)));
    std::fs::write(&path, serde_json::to_string_pretty(&record)?)?;

    info!("Saved run history to {}", path.display());
    Ok(path)
}

/// Lists saved runs, newest first. Unreadable files are listed with `?` fields.
pub fn list_runs(project_root: &Path) -> Result<Vec<HistoryEntry>, HistoryError> {
    let dir = runs_dir(project_root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    // Timestamped names sort chronologically.
    files.sort_unstable_by(|a, b| b.cmp(a));

    let entries = files
        .into_iter()
        .map(|path| {
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match read_record(&path) {
                Ok(record) => HistoryEntry::from_record(file, &record),
                Err(e) => {
                    debug!("Skipping unreadable history file {}: {}", path.display(), e);
                    HistoryEntry::unreadable(file)
                }
            }
        })
        .collect();
    Ok(entries)
}

fn read_record(path: &Path) -> Result<RunRecord, HistoryError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
