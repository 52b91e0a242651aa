//! Generator configuration stored in `metagen.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::core::entry_point::{FunctionScanner, PYTHON_FUNCTION_PATTERN};
use crate::io::atomic::write_atomic;

/// Default config file name, resolved against the working directory.
pub const CONFIG_FILE: &str = "metagen.toml";

/// Generator configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// values that work against a local `ollama` install and `python3`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetagenConfig {
    /// Model used by the generator itself.
    pub model: String,
    pub temperature: f64,
    /// Append-only history of evaluated candidates (JSON).
    pub history_path: PathBuf,
    /// Benchmark catalog with a top-level `problems` array (JSON).
    pub catalog_path: PathBuf,
    /// Number of full passes over the catalog per candidate.
    pub trials: u32,
    /// Upper bound on the rendered generation prompt.
    pub prompt_budget_bytes: usize,
    /// Models a generated pipeline may call, advertised in the prompt.
    pub available_models: Vec<String>,

    pub sandbox: SandboxConfig,
    pub pipeline: PipelineConfig,
    pub completion: CompletionConfig,
    pub curation: CurationConfig,
}

/// How returned solutions are executed against test cases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter argv; the harness file name is appended.
    pub program: Vec<String>,
    /// Extension used for the materialized candidate and harness files.
    pub extension: String,
    /// Regex whose first capture group names the entry function.
    pub function_pattern: String,
    /// Optional minijinja template overriding the built-in harness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harness_template: Option<PathBuf>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Parent directory for per-case temp directories (system temp if unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            program: vec!["python3".to_string()],
            extension: "py".to_string(),
            function_pattern: PYTHON_FUNCTION_PATTERN.to_string(),
            harness_template: None,
            timeout_secs: 10,
            output_limit_bytes: 64_000,
            scratch_dir: None,
        }
    }
}

/// How generated pipelines are hosted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    pub program: Vec<String>,
    /// Function every generated pipeline must define.
    pub entry_function: String,
    pub load_timeout_secs: u64,
    /// Per-problem call limit; unset means the call may run indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_timeout_secs: Option<u64>,
    pub output_limit_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            program: vec!["python3".to_string()],
            entry_function: "solve_problem".to_string(),
            load_timeout_secs: 30,
            call_timeout_secs: None,
            output_limit_bytes: 1_000_000,
        }
    }
}

/// How prompt text is sent to the completion command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompletionInput {
    /// System prompt, blank line, user prompt.
    #[default]
    Text,
    /// The serialized completion request.
    Json,
}

/// External completion endpoint, reached through a command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompletionConfig {
    /// Command argv; `{model}` is replaced with the requested model.
    pub command: Vec<String>,
    pub input: CompletionInput,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "ollama".to_string(),
                "run".to_string(),
                "{model}".to_string(),
            ],
            input: CompletionInput::Text,
            timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Bounds on the few-shot examples embedded in the generation prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CurationConfig {
    pub top_n: usize,
    pub max_non_functional: usize,
    pub max_error_excerpts: usize,
    pub max_excerpt_chars: usize,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            top_n: 3,
            max_non_functional: 5,
            max_error_excerpts: 5,
            max_excerpt_chars: 300,
        }
    }
}

impl Default for MetagenConfig {
    fn default() -> Self {
        Self {
            model: "qwen3:32b".to_string(),
            temperature: 0.3,
            history_path: PathBuf::from("agent_history.json"),
            catalog_path: PathBuf::from("leetcode_problems.json"),
            trials: 3,
            prompt_budget_bytes: 60_000,
            available_models: default_models(),
            sandbox: SandboxConfig::default(),
            pipeline: PipelineConfig::default(),
            completion: CompletionConfig::default(),
            curation: CurationConfig::default(),
        }
    }
}

fn default_models() -> Vec<String> {
    [
        "phi4",
        "gemma3:1b",
        "gemma3:4b",
        "gemma3:12b",
        "gemma3:27b",
        "qwen3:1.7b",
        "qwen3:4b",
        "qwen3:14b",
        "qwen3:30b",
        "qwen3:32b",
        "devstral",
        "deepseek-r1:1.5b",
        "deepseek-r1:8b",
        "deepseek-r1:14b",
    ]
    .iter()
    .map(|name| (*name).to_string())
    .collect()
}

impl MetagenConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow!("temperature must be within 0.0..=2.0"));
        }
        if self.trials == 0 {
            return Err(anyhow!("trials must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        ensure_command("sandbox.program", &self.sandbox.program)?;
        if self.sandbox.extension.trim().is_empty() {
            return Err(anyhow!("sandbox.extension must be non-empty"));
        }
        FunctionScanner::new(&self.sandbox.function_pattern)
            .context("sandbox.function_pattern is invalid")?;
        if self.sandbox.timeout_secs == 0 {
            return Err(anyhow!("sandbox.timeout_secs must be > 0"));
        }
        if self.sandbox.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox.output_limit_bytes must be > 0"));
        }
        ensure_command("pipeline.program", &self.pipeline.program)?;
        if self.pipeline.entry_function.trim().is_empty() {
            return Err(anyhow!("pipeline.entry_function must be non-empty"));
        }
        if self.pipeline.load_timeout_secs == 0 {
            return Err(anyhow!("pipeline.load_timeout_secs must be > 0"));
        }
        if self.pipeline.call_timeout_secs == Some(0) {
            return Err(anyhow!("pipeline.call_timeout_secs must be > 0 when set"));
        }
        if self.pipeline.output_limit_bytes == 0 {
            return Err(anyhow!("pipeline.output_limit_bytes must be > 0"));
        }
        ensure_command("completion.command", &self.completion.command)?;
        if self.completion.timeout_secs == 0 {
            return Err(anyhow!("completion.timeout_secs must be > 0"));
        }
        if self.completion.output_limit_bytes == 0 {
            return Err(anyhow!("completion.output_limit_bytes must be > 0"));
        }
        if self.curation.max_excerpt_chars == 0 {
            return Err(anyhow!("curation.max_excerpt_chars must be > 0"));
        }
        Ok(())
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.load_timeout_secs)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.pipeline.call_timeout_secs.map(Duration::from_secs)
    }

    /// Resolve relative paths against `base` (usually the config file's directory).
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.history_path);
        resolve(&mut self.catalog_path);
        if let Some(path) = self.sandbox.harness_template.as_mut() {
            resolve(path);
        }
        if let Some(path) = self.sandbox.scratch_dir.as_mut() {
            resolve(path);
        }
    }
}

fn ensure_command(key: &str, command: &[String]) -> Result<()> {
    match command.first() {
        Some(program) if !program.trim().is_empty() => Ok(()),
        _ => Err(anyhow!("{key} must be a non-empty array")),
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `MetagenConfig::default()`.
pub fn load_config(path: &Path) -> Result<MetagenConfig> {
    if !path.exists() {
        let cfg = MetagenConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MetagenConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &MetagenConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write the default config unless one already exists (or `force` is set).
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    write_config(path, &MetagenConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, MetagenConfig::default());
    }

    #[test]
    fn init_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        init_config(&path, false).expect("init");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, MetagenConfig::default());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        init_config(&path, false).expect("init");
        let err = init_config(&path, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        init_config(&path, true).expect("forced init");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "trials = 5\n[sandbox]\ntimeout_secs = 2\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.trials, 5);
        assert_eq!(cfg.sandbox.timeout_secs, 2);
        assert_eq!(cfg.sandbox.extension, "py");
        assert_eq!(cfg.curation.top_n, 3);
        assert_eq!(cfg.call_timeout(), None);
    }

    #[test]
    fn rejects_invalid_values() {
        let mut cfg = MetagenConfig::default();
        cfg.trials = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = MetagenConfig::default();
        cfg.sandbox.function_pattern = r"def \w+".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = MetagenConfig::default();
        cfg.completion.command = Vec::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn resolves_relative_paths() {
        let mut cfg = MetagenConfig::default();
        cfg.resolve_paths(Path::new("/work"));
        assert_eq!(cfg.history_path, PathBuf::from("/work/agent_history.json"));
        assert_eq!(
            cfg.catalog_path,
            PathBuf::from("/work/leetcode_problems.json")
        );
    }
}
