//! Config-driven agents.
//!
//! Any agent CLI is described by a command template and an optional set
//! of extraction patterns; there is no per-agent code.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use super::executor::{self, ExecError, ExecOutput};
use super::extract::{self, ExtractedMetrics, ExtractionPatterns};
use crate::config::{AgentConfig, PROMPT_PLACEHOLDER};
use crate::error::ConfigError;

/// A runnable agent built from its config.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: String,
    pub command_template: String,
    pub patterns: Option<ExtractionPatterns>,
}

/// What one agent invocation produced.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub output: ExecOutput,
    pub metrics: ExtractedMetrics,
}

impl Agent {
    /// Builds an agent, compiling its patterns.
    pub fn from_config(config: &AgentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let patterns = config
            .patterns
            .as_ref()
            .map(|raw| ExtractionPatterns::compile(&config.id, raw))
            .transpose()?
            .filter(|p| !p.is_empty());

        Ok(Self {
            id: config.id.clone(),
            command_template: config.command.clone(),
            patterns,
        })
    }

    /// Substitutes every `{prompt}` occurrence with the prompt text.
    pub fn build_command(&self, prompt: &str) -> String {
        self.command_template.replace(PROMPT_PLACEHOLDER, prompt)
    }

    /// Runs the agent in `cwd` and extracts metrics from its output.
    pub async fn run(&self, prompt: &str, cwd: &Path, timeout: Duration) -> Result<AgentRun, ExecError> {
        let command = self.build_command(prompt);
        info!("Running agent {} in {}", self.id, cwd.display());

        let output = executor::execute(&command, cwd, timeout).await?;

        let metrics = match &self.patterns {
            Some(patterns) if !output.timed_out => {
                let combined = extract::combine_output(&output.stdout, &output.stderr);
                extract::extract(&combined, patterns)
            }
            _ => ExtractedMetrics::default(),
        };

        debug!(
            "Agent {} finished: exit={} timed_out={} in {:.2}s",
            self.id, output.exit_code, output.timed_out, output.duration_seconds
        );
        Ok(AgentRun { output, metrics })
    }
}
