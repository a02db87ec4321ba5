//! Metric extraction from free-form agent output.
//!
//! Agents report token usage and cost in whatever format their CLI prints.
//! Each agent declares one regex per metric; the first capture group of the
//! first case-insensitive match becomes the value.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::config::MetricPatterns;
use crate::error::ConfigError;

/// Compiled, validated extraction patterns for one agent.
#[derive(Debug, Clone, Default)]
pub struct ExtractionPatterns {
    pub tokens_in: Option<Regex>,
    pub tokens_out: Option<Regex>,
    pub cost: Option<Regex>,
    pub llm_calls: Option<Regex>,
}

impl ExtractionPatterns {
    /// Compiles raw patterns, rejecting anything without exactly one group.
    pub fn compile(agent_id: &str, raw: &MetricPatterns) -> Result<Self, ConfigError> {
        Ok(Self {
            tokens_in: compile_one(agent_id, "tokens_in", raw.tokens_in.as_deref())?,
            tokens_out: compile_one(agent_id, "tokens_out", raw.tokens_out.as_deref())?,
            cost: compile_one(agent_id, "cost", raw.cost.as_deref())?,
            llm_calls: compile_one(agent_id, "llm_calls", raw.llm_calls.as_deref())?,
        })
    }

    /// Returns true if no metric has a pattern.
    pub fn is_empty(&self) -> bool {
        self.tokens_in.is_none()
            && self.tokens_out.is_none()
            && self.cost.is_none()
            && self.llm_calls.is_none()
    }
}

fn compile_one(
    agent_id: &str,
    metric: &'static str,
    pattern: Option<&str>,
) -> Result<Option<Regex>, ConfigError> {
    let Some(pattern) = pattern else {
        return Ok(None);
    };

    let regex = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::InvalidPattern {
            agent: agent_id.to_string(),
            metric,
            message: e.to_string(),
        })?;

    // captures_len counts the implicit whole-match group.
    let groups = regex.captures_len() - 1;
    if groups != 1 {
        return Err(ConfigError::CaptureGroups {
            agent: agent_id.to_string(),
            metric,
            groups,
        });
    }

    Ok(Some(regex))
}

/// Metrics found in one agent's output. Absent means not reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetrics {
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
    pub cost_usd: Option<f64>,
    pub llm_calls: Option<u64>,
}

/// Extracts metrics from combined stdout+stderr text.
pub fn extract(combined_output: &str, patterns: &ExtractionPatterns) -> ExtractedMetrics {
    ExtractedMetrics {
        tokens_in: capture(combined_output, patterns.tokens_in.as_ref()).and_then(parse_count),
        tokens_out: capture(combined_output, patterns.tokens_out.as_ref()).and_then(parse_count),
        cost_usd: capture(combined_output, patterns.cost.as_ref())
            .and_then(|raw| raw.trim().parse::<f64>().ok()),
        llm_calls: capture(combined_output, patterns.llm_calls.as_ref()).and_then(parse_count),
    }
}

/// Joins stdout and stderr the way extraction expects.
pub fn combine_output(stdout: &str, stderr: &str) -> String {
    format!("{}\n{}", stdout, stderr)
}

fn capture<'t>(text: &'t str, regex: Option<&Regex>) -> Option<&'t str> {
    regex?.captures(text)?.get(1).map(|m| m.as_str())
}

/// Parses an integer count, ignoring thousands separators.
fn parse_count(raw: &str) -> Option<u64> {
    raw.trim().replace(',', "").parse().ok()
}
