//! Per-agent aggregation and winner selection.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::result::RunMetrics;

/// All runs of one agent across every task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSummary {
    pub agent_id: String,
    pub runs: Vec<RunMetrics>,
}

impl TaskSummary {
    pub fn pass_count(&self) -> usize {
        self.runs.iter().filter(|r| r.passed).count()
    }

    pub fn total_count(&self) -> usize {
        self.runs.len()
    }

    /// Fraction of runs that passed; 0 with no runs.
    pub fn pass_rate(&self) -> f64 {
        if self.runs.is_empty() {
            0.0
        } else {
            self.pass_count() as f64 / self.total_count() as f64
        }
    }

    /// Mean agent wall time in seconds; 0 with no runs.
    pub fn avg_time(&self) -> f64 {
        if self.runs.is_empty() {
            0.0
        } else {
            self.runs.iter().map(|r| r.wall_time_seconds).sum::<f64>() / self.runs.len() as f64
        }
    }

    /// Mean cost over runs that reported one.
    pub fn avg_cost(&self) -> Option<f64> {
        let costs: Vec<f64> = self.runs.iter().filter_map(|r| r.cost_usd).collect();
        if costs.is_empty() {
            None
        } else {
            Some(costs.iter().sum::<f64>() / costs.len() as f64)
        }
    }

    /// Sum of total tokens over runs that reported both directions.
    pub fn total_tokens(&self) -> Option<u64> {
        self.runs
            .iter()
            .filter_map(RunMetrics::total_tokens)
            .fold(None, |acc, t| Some(acc.unwrap_or(0) + t))
    }

    /// Flat, serializable snapshot of the derived stats.
    pub fn stats(&self) -> SummaryStats {
        SummaryStats {
            agent: self.agent_id.clone(),
            pass_count: self.pass_count(),
            total_count: self.total_count(),
            pass_rate: round2(self.pass_rate()),
            avg_time: round2(self.avg_time()),
            avg_cost: self.avg_cost().map(round2),
            total_tokens: self.total_tokens(),
        }
    }
}

/// Derived stats of a [`TaskSummary`], rounded for display and history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub agent: String,
    pub pass_count: usize,
    pub total_count: usize,
    pub pass_rate: f64,
    pub avg_time: f64,
    pub avg_cost: Option<f64>,
    pub total_tokens: Option<u64>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Groups runs by agent, one summary per agent in declaration order.
pub fn summarize<S: AsRef<str>>(runs: &[RunMetrics], agent_ids: &[S]) -> Vec<TaskSummary> {
    agent_ids
        .iter()
        .map(|id| TaskSummary {
            agent_id: id.as_ref().to_string(),
            runs: runs
                .iter()
                .filter(|r| r.agent_id == id.as_ref())
                .cloned()
                .collect(),
        })
        .collect()
}

/// Picks the winner: highest pass rate, then lowest average cost (no cost
/// data ranks last), then lowest average time. Earlier summaries win exact ties.
pub fn pick_winner(summaries: &[TaskSummary]) -> Option<&TaskSummary> {
    summaries.iter().min_by_key(|s| {
        (
            Reverse(OrderedFloat(s.pass_rate())),
            OrderedFloat(s.avg_cost().unwrap_or(f64::INFINITY)),
            OrderedFloat(s.avg_time()),
        )
    })
}
