//! Completion client abstraction for the generator model.
//!
//! The [`CompletionClient`] trait decouples the orchestrator from the actual
//! model backend (by default `ollama run <model>`). Tests use scripted clients
//! that return predetermined responses without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::io::config::{CompletionConfig, CompletionInput};
use crate::io::process::run_command;

/// Placeholder in the command argv replaced by the requested model.
pub const MODEL_PLACEHOLDER: &str = "{model}";

/// One chat-style request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f64,
    pub system_prompt: String,
    pub user_prompt: String,
}

/// Abstraction over completion backends.
pub trait CompletionClient {
    /// Return the raw response text for `request`.
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Client that spawns a configured command and reads the response from stdout.
#[derive(Debug, Clone)]
pub struct CommandCompletion {
    command: Vec<String>,
    input: CompletionInput,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandCompletion {
    pub fn from_config(cfg: &CompletionConfig) -> Self {
        Self {
            command: cfg.command.clone(),
            input: cfg.input,
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }

    fn argv(&self, model: &str) -> Vec<String> {
        self.command
            .iter()
            .map(|part| part.replace(MODEL_PLACEHOLDER, model))
            .collect()
    }

    fn payload(&self, request: &CompletionRequest) -> Result<Vec<u8>> {
        match self.input {
            CompletionInput::Text => Ok(format!(
                "{}\n\n{}",
                request.system_prompt, request.user_prompt
            )
            .into_bytes()),
            CompletionInput::Json => {
                serde_json::to_vec(request).context("serialize completion request")
            }
        }
    }
}

impl CompletionClient for CommandCompletion {
    #[instrument(skip_all, fields(model = %request.model, timeout_secs = self.timeout.as_secs()))]
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let argv = self.argv(&request.model);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("completion command is empty"))?;
        info!(program = %program, "requesting completion");

        let mut cmd = Command::new(program);
        cmd.args(args);
        let payload = self.payload(request)?;
        let output = run_command(
            cmd,
            Some(&payload),
            Some(self.timeout),
            self.output_limit_bytes,
        )
        .with_context(|| format!("run completion command {program}"))?;

        if output.timed_out {
            warn!("completion command timed out");
            return Err(anyhow!(
                "completion command timed out after {:?}",
                self.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "completion command failed");
            return Err(anyhow!(
                "completion command failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            ));
        }

        let text = output.stdout_text();
        debug!(bytes = text.len(), "completion received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(command: &[&str], input: CompletionInput) -> CommandCompletion {
        CommandCompletion::from_config(&CompletionConfig {
            command: command.iter().map(|s| (*s).to_string()).collect(),
            input,
            timeout_secs: 5,
            output_limit_bytes: 10_000,
        })
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "tiny".to_string(),
            temperature: 0.3,
            system_prompt: "SYS".to_string(),
            user_prompt: "USER".to_string(),
        }
    }

    /// Verifies the text payload is system prompt, blank line, user prompt.
    #[test]
    fn text_input_reaches_stdin() {
        let response = client(&["cat"], CompletionInput::Text)
            .complete(&request())
            .expect("complete");
        assert_eq!(response, "SYS\n\nUSER");
    }

    #[test]
    fn json_input_serializes_request() {
        let response = client(&["cat"], CompletionInput::Json)
            .complete(&request())
            .expect("complete");
        let value: serde_json::Value = serde_json::from_str(&response).expect("json");
        assert_eq!(value["model"], "tiny");
        assert_eq!(value["user_prompt"], "USER");
    }

    #[test]
    fn model_placeholder_is_substituted() {
        let response = client(&["echo", "model={model}"], CompletionInput::Text)
            .complete(&request())
            .expect("complete");
        assert_eq!(response.trim(), "model=tiny");
    }

    #[test]
    fn failing_command_is_an_error() {
        let err = client(&["sh", "-c", "echo nope >&2; exit 2"], CompletionInput::Text)
            .complete(&request())
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
