//! Isolated execution of one candidate solution against one test case.
//!
//! Every case runs in a fresh child process inside its own temporary
//! directory. The directory is removed when the case finishes, whatever the
//! outcome. The harness writes the return value as JSON to [`RESULT_FILE`]
//! inside that directory, so prints made by the candidate (however large)
//! never corrupt or crowd out the result.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use minijinja::{Environment, context};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::entry_point::{FunctionScanner, PYTHON_FUNCTION_PATTERN};
use crate::core::types::{CaseError, SandboxErrorKind, TestCase};
use crate::core::value_match::values_match;
use crate::io::config::SandboxConfig;
use crate::io::process::run_command;

/// File, relative to the working directory, the harness writes the JSON-encoded return value to.
pub const RESULT_FILE: &str = "result.json";

/// Built-in harness for Python candidates.
pub const PYTHON_CASE_HARNESS: &str = include_str!("harness/case.py");

/// An interpreter able to run candidate solutions.
#[derive(Debug, Clone)]
pub struct Runtime {
    program: Vec<String>,
    extension: String,
    scanner: FunctionScanner,
    harness_template: String,
}

impl Runtime {
    pub fn new(
        program: Vec<String>,
        extension: impl Into<String>,
        function_pattern: &str,
        harness_template: impl Into<String>,
    ) -> Result<Self> {
        if program.first().is_none_or(|p| p.trim().is_empty()) {
            bail!("runtime program must be a non-empty array");
        }
        let runtime = Self {
            program,
            extension: extension.into(),
            scanner: FunctionScanner::new(function_pattern)?,
            harness_template: harness_template.into(),
        };
        // Fail on a broken template now rather than once per case.
        runtime.render_harness("probe")?;
        Ok(runtime)
    }

    /// `python3` with the built-in harness.
    pub fn python() -> Self {
        Self::new(
            vec!["python3".to_string()],
            "py",
            PYTHON_FUNCTION_PATTERN,
            PYTHON_CASE_HARNESS,
        )
        .expect("built-in python runtime should be valid")
    }

    pub fn from_config(cfg: &SandboxConfig) -> Result<Self> {
        let template = match &cfg.harness_template {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("read harness template {}", path.display()))?,
            None => PYTHON_CASE_HARNESS.to_string(),
        };
        Self::new(
            cfg.program.clone(),
            cfg.extension.clone(),
            &cfg.function_pattern,
            template,
        )
        .context("build sandbox runtime")
    }

    fn candidate_file(&self) -> String {
        format!("candidate.{}", self.extension)
    }

    fn harness_file(&self) -> String {
        format!("harness.{}", self.extension)
    }

    fn render_harness(&self, function: &str) -> Result<String> {
        let env = Environment::new();
        let rendered = env
            .render_str(
                &self.harness_template,
                context! {
                    function => function,
                    candidate_file => self.candidate_file(),
                    result_file => RESULT_FILE,
                },
            )
            .context("render harness template")?;
        Ok(rendered)
    }
}

/// Result of one sandboxed case.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxOutcome {
    pub actual: Option<Value>,
    pub passed: bool,
    pub error: Option<CaseError>,
}

impl SandboxOutcome {
    fn failed(kind: SandboxErrorKind, message: impl Into<String>) -> Self {
        Self {
            actual: None,
            passed: false,
            error: Some(CaseError::new(kind, message)),
        }
    }
}

/// Runs candidate solutions against test cases.
///
/// The accuracy evaluator only talks to this trait; tests substitute
/// scripted runners that never spawn processes.
pub trait CaseRunner {
    /// Name of the first function defined in `source`, if any.
    fn entry_point(&self, source: &str) -> Option<String>;

    /// Execute `function` from `source` with the case's arguments.
    ///
    /// Never fails: every problem is folded into the outcome.
    fn run_case(&self, source: &str, function: &str, case: &TestCase) -> SandboxOutcome;
}

/// Process-backed [`CaseRunner`].
#[derive(Debug, Clone)]
pub struct Sandbox {
    runtime: Runtime,
    timeout: Duration,
    output_limit_bytes: usize,
    scratch_dir: Option<PathBuf>,
}

impl Sandbox {
    pub fn new(runtime: Runtime, timeout: Duration) -> Self {
        Self {
            runtime,
            timeout,
            output_limit_bytes: 64_000,
            scratch_dir: None,
        }
    }

    pub fn from_config(cfg: &SandboxConfig) -> Result<Self> {
        Ok(Self {
            runtime: Runtime::from_config(cfg)?,
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
            scratch_dir: cfg.scratch_dir.clone(),
        })
    }

    /// Create per-case directories under `dir` instead of the system temp dir.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit_bytes = bytes;
        self
    }

    fn make_workdir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("metagen-case-");
        match &self.scratch_dir {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("create scratch dir {}", dir.display()))?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
        .context("create case directory")
    }

    fn materialize(&self, workdir: &Path, source: &str, function: &str) -> Result<()> {
        let candidate = workdir.join(self.runtime.candidate_file());
        fs::write(&candidate, source)
            .with_context(|| format!("write {}", candidate.display()))?;
        let harness = workdir.join(self.runtime.harness_file());
        fs::write(&harness, self.runtime.render_harness(function)?)
            .with_context(|| format!("write {}", harness.display()))?;
        Ok(())
    }

    fn execute(&self, source: &str, function: &str, case: &TestCase) -> Result<SandboxOutcome> {
        // Dropping the TempDir removes the directory on every return path.
        let workdir = self.make_workdir()?;
        self.materialize(workdir.path(), source, function)?;

        let mut cmd = Command::new(&self.runtime.program[0]);
        cmd.args(&self.runtime.program[1..])
            .arg(self.runtime.harness_file())
            .current_dir(workdir.path());

        let mut stdin = serde_json::to_vec(&case.input).context("serialize case input")?;
        stdin.push(b'\n');

        let output = match run_command(
            cmd,
            Some(&stdin),
            Some(self.timeout),
            self.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(err) => {
                return Ok(SandboxOutcome::failed(
                    SandboxErrorKind::Spawn,
                    format!("{err:#}"),
                ));
            }
        };

        if output.timed_out {
            warn!(function, "test case timed out");
            return Ok(SandboxOutcome::failed(
                SandboxErrorKind::Timeout,
                format!("execution exceeded {}s", self.timeout.as_secs_f64()),
            ));
        }
        if !output.status.success() {
            let stderr = output.stderr_text();
            let message = if stderr.trim().is_empty() {
                format!("exit status {:?}", output.status.code())
            } else {
                format!(
                    "{}{}",
                    stderr.trim(),
                    output.stderr_truncated_notice("sandbox")
                )
            };
            return Ok(SandboxOutcome::failed(SandboxErrorKind::Runtime, message));
        }

        let result_path = workdir.path().join(RESULT_FILE);
        let raw = match fs::read_to_string(&result_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(SandboxOutcome::failed(
                    SandboxErrorKind::Deserialize,
                    format!(
                        "no result written{}",
                        output.stdout_truncated_notice("sandbox")
                    ),
                ));
            }
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", result_path.display()));
            }
        };
        let actual: Value = match serde_json::from_str(raw.trim()) {
            Ok(value) => value,
            Err(err) => {
                return Ok(SandboxOutcome::failed(
                    SandboxErrorKind::Deserialize,
                    format!("result is not valid JSON: {err}"),
                ));
            }
        };

        let passed = values_match(&actual, &case.expected);
        debug!(function, passed, "case finished");
        Ok(SandboxOutcome {
            actual: Some(actual),
            passed,
            error: None,
        })
    }
}

impl CaseRunner for Sandbox {
    fn entry_point(&self, source: &str) -> Option<String> {
        self.runtime.scanner.first_function(source)
    }

    #[instrument(skip_all, fields(function = %function))]
    fn run_case(&self, source: &str, function: &str, case: &TestCase) -> SandboxOutcome {
        match self.execute(source, function, case) {
            Ok(outcome) => outcome,
            Err(err) => SandboxOutcome::failed(SandboxErrorKind::Spawn, format!("{err:#}")),
        }
    }
}
