//! Error types for agentarena operations.
//!
//! Subsystem errors that only make sense inside the runner (sandbox,
//! process execution, orchestration) live next to their code in
//! [`crate::runner`]. This module holds the errors raised at the edges:
//! - Bench file loading and validation
//! - Run history persistence

use thiserror::Error;

/// Errors raised while loading or validating a bench file.
///
/// These always surface before any sandbox is created.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config: expected a YAML mapping, got {0}")]
    NotAMapping(String),

    #[error("Invalid config: at least one {0} is required")]
    Empty(&'static str),

    #[error("Duplicate {kind} names: {names}")]
    Duplicate { kind: &'static str, names: String },

    #[error("Agent '{0}' command must contain '{{prompt}}' placeholder")]
    MissingPromptPlaceholder(String),

    #[error("Invalid timeout for {scope}: must be at least 1 second")]
    InvalidTimeout { scope: String },

    #[error("Invalid parallelism: must be at least 1")]
    InvalidParallelism,

    #[error("Invalid regex for '{metric}' on agent '{agent}': {message}")]
    InvalidPattern {
        agent: String,
        metric: &'static str,
        message: String,
    },

    #[error("Pattern for '{metric}' on agent '{agent}' must have exactly one capture group, found {groups}")]
    CaptureGroups {
        agent: String,
        metric: &'static str,
        groups: usize,
    },

    #[error("Invalid --agent format: '{0}'. Expected 'name:command'")]
    InvalidAgentFlag(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors raised while saving or reading run history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
