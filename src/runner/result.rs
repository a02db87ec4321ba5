//! Per-pair results.
//!
//! A [`RunMetrics`] record is assembled by folding stage outcomes into a
//! [`RunMetricsBuilder`]; once built it is never modified.

use serde::{Deserialize, Serialize};

use super::executor::ExecOutput;
use super::extract::ExtractedMetrics;

/// Metrics for one agent run on one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub agent_id: String,
    pub task_id: String,
    pub passed: bool,
    /// Agent wall-clock seconds (validation time excluded).
    pub wall_time_seconds: f64,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
    pub cost_usd: Option<f64>,
    pub llm_calls: Option<u64>,
    /// True if the agent or the validation command timed out.
    pub timed_out: bool,
    /// Exit code of the agent command, if it ran.
    pub agent_exit_code: Option<i32>,
    /// Exit code of the validation command, if it ran.
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl RunMetrics {
    /// Starts a record for the given pair.
    pub fn builder(agent_id: impl Into<String>, task_id: impl Into<String>) -> RunMetricsBuilder {
        RunMetricsBuilder {
            metrics: RunMetrics {
                agent_id: agent_id.into(),
                task_id: task_id.into(),
                passed: false,
                wall_time_seconds: 0.0,
                tokens_in: None,
                tokens_out: None,
                cost_usd: None,
                llm_calls: None,
                timed_out: false,
                agent_exit_code: None,
                exit_code: None,
                error: None,
            },
        }
    }

    /// Input plus output tokens, if both were reported.
    pub fn total_tokens(&self) -> Option<u64> {
        Some(self.tokens_in? + self.tokens_out?)
    }
}

/// Accumulates stage outcomes for one pair.
#[derive(Debug, Clone)]
pub struct RunMetricsBuilder {
    metrics: RunMetrics,
}

impl RunMetricsBuilder {
    /// Records the agent invocation and whatever metrics it reported.
    pub fn agent_finished(mut self, output: &ExecOutput, extracted: &ExtractedMetrics) -> Self {
        let m = &mut self.metrics;
        m.wall_time_seconds = output.duration_seconds;
        m.agent_exit_code = Some(output.exit_code);
        m.tokens_in = extracted.tokens_in;
        m.tokens_out = extracted.tokens_out;
        m.cost_usd = extracted.cost_usd;
        m.llm_calls = extracted.llm_calls;
        if output.timed_out {
            m.timed_out = true;
            m.passed = false;
        }
        self
    }

    /// Records the validation command. A timed-out validation always fails.
    pub fn validated(mut self, output: &ExecOutput) -> Self {
        let m = &mut self.metrics;
        m.exit_code = Some(output.exit_code);
        m.passed = output.is_success();
        if output.timed_out {
            m.timed_out = true;
        }
        self
    }

    /// Records an error. The pair can no longer pass.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.metrics.error = Some(error.into());
        self.metrics.passed = false;
        self
    }

    pub fn build(self) -> RunMetrics {
        self.metrics
    }
}
