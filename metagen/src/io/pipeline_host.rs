//! Hosting of generated pipelines behind a process boundary.
//!
//! A candidate pipeline is untrusted code. The host never imports it into
//! this process: it materializes the source next to a small harness and talks
//! to it through child processes, trusting only exit status and the value
//! the harness writes to the result file.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::entry_point::strip_code_fences;
use crate::core::record::LoadFailure;
use crate::core::types::ProblemSpec;
use crate::io::config::{CompletionConfig, CompletionInput, MetagenConfig};
use crate::io::process::{CommandOutput, marked_line, run_command};
use crate::io::sandbox::RESULT_FILE;

/// Prefix of the stdout line describing a load failure.
pub const LOAD_FAILURE_MARKER: &str = "__METAGEN_LOAD_FAILURE__";

const PIPELINE_HARNESS: &str = include_str!("harness/pipeline.py");
const LLM_HELPER: &str = include_str!("harness/metagen_llm.py");

/// Harness exit code for a source that fails to load.
const EXIT_LOAD_ERROR: i32 = 3;
/// Harness exit code for a source missing the entry function.
const EXIT_MISSING_ENTRY: i32 = 4;

/// Outcome of opening a candidate.
#[derive(Debug)]
pub enum PipelineLoad<S> {
    Ready(S),
    Failed(LoadFailure),
}

/// A loaded candidate, ready to solve problems.
pub trait PipelineSession {
    /// Call the entry function with `problem`.
    ///
    /// `Err` carries the failure text (usually the raised exception).
    fn solve(&mut self, problem: &ProblemSpec) -> std::result::Result<Value, String>;
}

/// Loads candidate pipelines.
pub trait PipelineHost {
    type Session: PipelineSession;

    /// Load `source`. `Err` is reserved for host-side failures.
    fn open(&self, source: &str) -> Result<PipelineLoad<Self::Session>>;
}

/// Settings for [`ProcessPipelineHost`].
#[derive(Debug, Clone)]
pub struct ProcessHostSettings {
    pub program: Vec<String>,
    pub entry_function: String,
    pub load_timeout: Duration,
    pub call_timeout: Option<Duration>,
    pub output_limit_bytes: usize,
    pub completion: CompletionConfig,
    pub scratch_dir: Option<PathBuf>,
}

impl ProcessHostSettings {
    pub fn from_config(cfg: &MetagenConfig) -> Self {
        Self {
            program: cfg.pipeline.program.clone(),
            entry_function: cfg.pipeline.entry_function.clone(),
            load_timeout: cfg.load_timeout(),
            call_timeout: cfg.call_timeout(),
            output_limit_bytes: cfg.pipeline.output_limit_bytes,
            completion: cfg.completion.clone(),
            scratch_dir: cfg.sandbox.scratch_dir.clone(),
        }
    }
}

/// [`PipelineHost`] that runs each call in a fresh interpreter process.
#[derive(Debug, Clone)]
pub struct ProcessPipelineHost {
    settings: ProcessHostSettings,
}

impl ProcessPipelineHost {
    pub fn new(settings: ProcessHostSettings) -> Self {
        Self { settings }
    }

    fn command(&self, workdir: &std::path::Path, mode: &str) -> Result<Command> {
        let settings = &self.settings;
        let program = settings
            .program
            .first()
            .context("pipeline program is empty")?;
        let completion_command = serde_json::to_string(&settings.completion.command)
            .context("serialize completion command")?;
        let completion_input = match settings.completion.input {
            CompletionInput::Text => "text",
            CompletionInput::Json => "json",
        };
        let mut cmd = Command::new(program);
        cmd.args(&settings.program[1..])
            .arg("pipeline.py")
            .arg(mode)
            .arg(&settings.entry_function)
            .current_dir(workdir)
            .env("METAGEN_COMPLETION_COMMAND", completion_command)
            .env("METAGEN_COMPLETION_INPUT", completion_input)
            .env("METAGEN_RESULT_FILE", RESULT_FILE);
        Ok(cmd)
    }
}

impl PipelineHost for ProcessPipelineHost {
    type Session = ProcessSession;

    #[instrument(skip_all, fields(entry = %self.settings.entry_function))]
    fn open(&self, source: &str) -> Result<PipelineLoad<ProcessSession>> {
        let source = strip_code_fences(source);
        let mut builder = tempfile::Builder::new();
        builder.prefix("metagen-pipeline-");
        let workdir = match &self.settings.scratch_dir {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("create scratch dir {}", dir.display()))?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
        .context("create pipeline directory")?;

        for (name, contents) in [
            ("candidate.py", source.as_str()),
            ("pipeline.py", PIPELINE_HARNESS),
            ("metagen_llm.py", LLM_HELPER),
        ] {
            let path = workdir.path().join(name);
            fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        }

        let cmd = self.command(workdir.path(), "load")?;
        let output = match run_command(
            cmd,
            None,
            Some(self.settings.load_timeout),
            self.settings.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(err) => {
                return Ok(PipelineLoad::Failed(LoadFailure {
                    error_type: "SpawnError".to_string(),
                    error_message: format!("{err:#}"),
                    problematic_code: source,
                }));
            }
        };

        if let Some(failure) = load_failure(&output, self.settings.load_timeout, &source) {
            warn!(error_type = %failure.error_type, "candidate failed to load");
            return Ok(PipelineLoad::Failed(failure));
        }

        info!("candidate loaded");
        Ok(PipelineLoad::Ready(ProcessSession {
            host: self.clone(),
            workdir,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct LoadFailureLine {
    error_type: String,
    error_message: String,
}

fn load_failure(output: &CommandOutput, timeout: Duration, source: &str) -> Option<LoadFailure> {
    if output.timed_out {
        return Some(LoadFailure {
            error_type: "Timeout".to_string(),
            error_message: format!("loading exceeded {}s", timeout.as_secs_f64()),
            problematic_code: source.to_string(),
        });
    }
    if output.status.success() {
        return None;
    }

    let stdout = output.stdout_text();
    let reported = marked_line(&stdout, LOAD_FAILURE_MARKER)
        .and_then(|line| serde_json::from_str::<LoadFailureLine>(line).ok());
    let (error_type, error_message) = match (reported, output.status.code()) {
        (Some(line), _) => (line.error_type, line.error_message),
        (None, Some(EXIT_MISSING_ENTRY)) => (
            "MissingEntryPoint".to_string(),
            "entry function is not defined".to_string(),
        ),
        (None, code) => {
            let kind = if code == Some(EXIT_LOAD_ERROR) {
                "LoadError"
            } else {
                "HostError"
            };
            (kind.to_string(), output.stderr_text().trim().to_string())
        }
    };
    Some(LoadFailure {
        error_type,
        error_message,
        problematic_code: source.to_string(),
    })
}

/// A candidate materialized on disk; removed when dropped.
#[derive(Debug)]
pub struct ProcessSession {
    host: ProcessPipelineHost,
    workdir: tempfile::TempDir,
}

impl PipelineSession for ProcessSession {
    #[instrument(skip_all, fields(problem = %problem.id))]
    fn solve(&mut self, problem: &ProblemSpec) -> std::result::Result<Value, String> {
        let cmd = self
            .host
            .command(self.workdir.path(), "solve")
            .map_err(|err| format!("{err:#}"))?;
        let input = serde_json::to_vec(problem).map_err(|err| err.to_string())?;
        let result_path = self.workdir.path().join(RESULT_FILE);
        match fs::remove_file(&result_path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(format!("clear {}: {err}", result_path.display())),
        }
        let settings = &self.host.settings;
        let output = run_command(
            cmd,
            Some(&input),
            settings.call_timeout,
            settings.output_limit_bytes,
        )
        .map_err(|err| format!("{err:#}"))?;

        if output.timed_out {
            let limit = settings.call_timeout.map_or(0.0, |t| t.as_secs_f64());
            return Err(format!("pipeline call exceeded {limit}s"));
        }
        if !output.status.success() {
            let stderr = output.stderr_text();
            return Err(if stderr.trim().is_empty() {
                format!("pipeline exited with status {:?}", output.status.code())
            } else {
                stderr.trim().to_string()
            });
        }
        let raw = match fs::read_to_string(&result_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(format!(
                    "pipeline wrote no result{}",
                    output.stdout_truncated_notice("pipeline")
                ));
            }
            Err(err) => return Err(format!("read {}: {err}", result_path.display())),
        };
        let value = serde_json::from_str(raw.trim())
            .map_err(|err| format!("pipeline result is not valid JSON: {err}"))?;
        debug!("pipeline call finished");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn output(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            stdout_truncated: 0,
            stderr_truncated: 0,
            timed_out: false,
        }
    }

    #[test]
    fn clean_exit_is_not_a_failure() {
        assert!(load_failure(&output(0, "", ""), Duration::from_secs(1), "src").is_none());
    }

    #[test]
    fn reported_failure_line_wins() {
        let stdout = format!(
            "\n{LOAD_FAILURE_MARKER}{{\"error_type\": \"SyntaxError\", \"error_message\": \"invalid syntax (candidate.py, line 1)\"}}\n"
        );
        let failure = load_failure(&output(3, &stdout, ""), Duration::from_secs(1), "def (")
            .expect("failure");
        assert_eq!(failure.error_type, "SyntaxError");
        assert!(failure.error_message.contains("invalid syntax"));
        assert_eq!(failure.problematic_code, "def (");
    }

    #[test]
    fn unreported_failure_falls_back_to_stderr() {
        let failure = load_failure(&output(3, "", "boom\n"), Duration::from_secs(1), "x")
            .expect("failure");
        assert_eq!(failure.error_type, "LoadError");
        assert_eq!(failure.error_message, "boom");

        let missing =
            load_failure(&output(4, "", ""), Duration::from_secs(1), "x").expect("failure");
        assert_eq!(missing.error_type, "MissingEntryPoint");
    }

    #[test]
    fn timeout_is_reported_as_load_failure() {
        let mut out = output(0, "", "");
        out.timed_out = true;
        let failure = load_failure(&out, Duration::from_secs(2), "x").expect("failure");
        assert_eq!(failure.error_type, "Timeout");
    }
}
