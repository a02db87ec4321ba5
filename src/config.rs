//! Bench file model and loading.
//!
//! A bench file lists the tasks to race on and the agents to race. It is
//! fully validated on load, including the agents' extraction patterns, so
//! the runner never sees a malformed definition.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::runner::extract::ExtractionPatterns;

/// Placeholder substituted with the task prompt in agent commands.
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

/// Default bench file name.
pub const DEFAULT_CONFIG_FILE: &str = "bench.yaml";

/// A single benchmark task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Unique task identifier.
    #[serde(rename = "name", alias = "id")]
    pub id: String,
    /// Natural-language prompt handed to every agent.
    pub prompt: String,
    /// Shell command that decides pass/fail (exit code 0 passes).
    #[serde(rename = "validate", alias = "validate_command")]
    pub validate_command: String,
    /// Per-task timeout in seconds, overriding the global one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl TaskConfig {
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        validate_command: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            validate_command: validate_command.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Timeout that applies to this task given the global fallback.
    pub fn effective_timeout(&self, global_timeout: u64) -> u64 {
        self.timeout.unwrap_or(global_timeout)
    }
}

/// Regex patterns used to pull metrics out of agent output.
///
/// Each pattern must have exactly one capture group, e.g.
/// `input tokens:\s*([\d,]+)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricPatterns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_out: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_calls: Option<String>,
}

/// A single agent to benchmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent identifier.
    #[serde(rename = "name", alias = "id")]
    pub id: String,
    /// Shell command template containing `{prompt}`.
    pub command: String,
    /// Optional extraction patterns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<MetricPatterns>,
}

impl AgentConfig {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            patterns: None,
        }
    }

    pub fn with_patterns(mut self, patterns: MetricPatterns) -> Self {
        self.patterns = Some(patterns);
        self
    }

    /// Checks the placeholder and compiles the patterns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.command.contains(PROMPT_PLACEHOLDER) {
            return Err(ConfigError::MissingPromptPlaceholder(self.id.clone()));
        }
        if let Some(patterns) = &self.patterns {
            ExtractionPatterns::compile(&self.id, patterns)?;
        }
        Ok(())
    }
}

/// Top-level bench file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Project identifier recorded in history.
    #[serde(default = "default_project")]
    pub project: String,
    /// Git ref sandboxes are checked out at.
    #[serde(default = "default_base")]
    pub base: String,
    /// Global timeout in seconds for agent and validation commands.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Number of agents that may run concurrently on one task.
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

fn default_project() -> String {
    "default".to_string()
}

fn default_base() -> String {
    "HEAD".to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_parallel() -> usize {
    1
}

impl BenchConfig {
    /// Creates a config with defaults and the given matrix.
    pub fn new(tasks: Vec<TaskConfig>, agents: Vec<AgentConfig>) -> Self {
        Self {
            project: default_project(),
            base: default_base(),
            timeout: default_timeout(),
            parallel: default_parallel(),
            tasks,
            agents,
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }

    /// Parses and validates a bench file from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: serde_yaml::Value = serde_yaml::from_str(content)?;
        if !raw.is_mapping() {
            return Err(ConfigError::NotAMapping(yaml_type_name(&raw).to_string()));
        }

        let config: BenchConfig = serde_yaml::from_value(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the whole config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout < 1 {
            return Err(ConfigError::InvalidTimeout {
                scope: "global".to_string(),
            });
        }
        if self.parallel < 1 {
            return Err(ConfigError::InvalidParallelism);
        }
        if self.tasks.is_empty() {
            return Err(ConfigError::Empty("task"));
        }
        if self.agents.is_empty() {
            return Err(ConfigError::Empty("agent"));
        }

        check_unique("task", self.tasks.iter().map(|t| t.id.as_str()))?;
        check_unique("agent", self.agents.iter().map(|a| a.id.as_str()))?;

        for task in &self.tasks {
            if task.timeout == Some(0) {
                return Err(ConfigError::InvalidTimeout {
                    scope: format!("task '{}'", task.id),
                });
            }
        }
        for agent in &self.agents {
            agent.validate()?;
        }

        Ok(())
    }
}

fn check_unique<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = BTreeSet::new();
    let mut dupes = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            dupes.insert(id);
        }
    }

    if dupes.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Duplicate {
            kind,
            names: dupes.into_iter().collect::<Vec<_>>().join(", "),
        })
    }
}

fn yaml_type_name(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "bool",
        serde_yaml::Value::Number(_) => "number",
        serde_yaml::Value::String(_) => "string",
        serde_yaml::Value::Sequence(_) => "sequence",
        serde_yaml::Value::Mapping(_) => "mapping",
        serde_yaml::Value::Tagged(_) => "tagged value",
    }
}

/// Loads and validates a bench file.
pub fn load_config(path: &Path) -> Result<BenchConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)?;
    let config = BenchConfig::from_yaml_str(&content)?;
    debug!(
        "Loaded {} with {} tasks and {} agents",
        path.display(),
        config.tasks.len(),
        config.agents.len()
    );
    Ok(config)
}

/// Parses a CLI `--agent` flag of the form `name:command {prompt}`.
pub fn parse_agent_flag(flag: &str) -> Result<AgentConfig, ConfigError> {
    let (name, command) = flag
        .split_once(':')
        .ok_or_else(|| ConfigError::InvalidAgentFlag(flag.to_string()))?;

    let agent = AgentConfig::new(name.trim(), command.trim());
    if agent.id.is_empty() {
        return Err(ConfigError::InvalidAgentFlag(flag.to_string()));
    }
    agent.validate()?;
    Ok(agent)
}

/// Starter bench file written by `agentarena init`.
pub const STARTER_CONFIG: &str = r#"# agentarena benchmark config

project: my-project
timeout: 120

tasks:
  - name: example-task
    prompt: "Fix the bug in main.py"
    validate: "python -m pytest tests/"

  # Add more tasks here:
  # - name: another-task
  #   prompt: "Add input validation to the signup form"
  #   validate: "npm test"
  #   timeout: 180    # optional per-task timeout

agents:
  - name: claude-code
    command: "claude --print '{prompt}'"
    patterns:
      tokens_in: "input tokens:\\s*([\\d,]+)"
      tokens_out: "output tokens:\\s*([\\d,]+)"
      cost: "cost:\\s*\\$?([\\d.]+)"

  # Add more agents here:
  # - name: aider
  #   command: "aider --message '{prompt}' --yes-always --no-git"
  #   patterns:
  #     tokens_in: "sent:\\s*([\\d,]+)"
  #     tokens_out: "received:\\s*([\\d,]+)"
  #     cost: "Cost:\\s*\\$([\\d.]+)"

  # No patterns = just time + pass/fail (works for any agent)
  # - name: my-tool
  #   command: "my-tool run '{prompt}'"
"#;
