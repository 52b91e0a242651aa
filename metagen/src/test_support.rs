//! Test-only builders and scripted collaborators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use crate::core::entry_point::{FunctionScanner, PYTHON_FUNCTION_PATTERN};
use crate::core::record::{
    AgentConfig, AgentRecord, LoadFailure, PerformanceSummary, ProblemOutcome, TestingStats,
    TrialResult,
};
use crate::core::types::{CaseError, CaseOutcome, ProblemSpec, SandboxErrorKind, TestCase};
use crate::io::completion::{CompletionClient, CompletionRequest};
use crate::io::pipeline_host::{PipelineHost, PipelineLoad, PipelineSession};
use crate::io::sandbox::{CaseRunner, Runtime, SandboxOutcome};

/// Deterministic record with the given accuracy and average latency.
pub fn record(id: &str, accuracy: f64, latency: f64) -> AgentRecord {
    AgentRecord {
        agent_id: id.to_string(),
        name: format!("agent-{id}"),
        creation_timestamp: "2026-01-01T00:00:00+00:00".to_string(),
        config: AgentConfig {
            kind: "generated_pipeline".to_string(),
            code: "def solve_problem(problem_data):\n    return {'code': ''}\n".to_string(),
            description: "test pipeline".to_string(),
            source_sha256: String::new(),
        },
        performance: PerformanceSummary {
            accuracy,
            accuracy_std: 0.0,
            accuracy_range: [accuracy, accuracy],
            avg_execution_time: latency,
            time_std: 0.0,
            time_range: [latency, latency],
            successful_runs: 3,
            total_runs: 3,
        },
        testing_stats: TestingStats {
            successful_runs: 3,
            total_runs: 3,
            all_runs_summary: Vec::new(),
        },
        narrative: format!("narrative for {id}"),
        detailed_results: Vec::new(),
        load_error: None,
    }
}

/// Record whose candidate failed to load.
pub fn record_with_load_error(id: &str, accuracy: f64) -> AgentRecord {
    AgentRecord {
        load_error: Some(LoadFailure {
            error_type: "SyntaxError".to_string(),
            error_message: "invalid syntax (candidate.py, line 1)".to_string(),
            problematic_code: "def solve_problem(:".to_string(),
        }),
        ..record(id, accuracy, 0.0)
    }
}

/// Problem with `cases` identity test cases (`[i] -> i`).
pub fn problem(id: &str, title: &str, cases: usize) -> ProblemSpec {
    ProblemSpec {
        id: id.to_string(),
        title: title.to_string(),
        description: format!("{title} description"),
        function_signature: "def f(x):".to_string(),
        tests: (0..cases)
            .map(|i| TestCase {
                input: vec![json!(i)],
                expected: json!(i),
            })
            .collect(),
    }
}

pub fn case_outcome(test_case: usize, correct: bool, error: Option<CaseError>) -> CaseOutcome {
    CaseOutcome {
        test_case,
        input: vec![json!(test_case)],
        expected: json!(test_case),
        actual: correct.then(|| json!(test_case)),
        correct,
        error,
    }
}

pub fn problem_outcome(id: &str, title: &str, accuracy: f64) -> ProblemOutcome {
    ProblemOutcome {
        problem: title.to_string(),
        problem_id: id.to_string(),
        success: accuracy == 100.0,
        accuracy,
        execution_time: 0.5,
        details: Vec::new(),
        error: None,
    }
}

pub fn trial(run_number: u32, accuracy: f64, problem_results: Vec<ProblemOutcome>) -> TrialResult {
    TrialResult {
        run_number,
        accuracy,
        avg_execution_time: 0.5,
        total_time: 0.5 * problem_results.len() as f64,
        correct_count: problem_results.iter().filter(|p| p.success).count(),
        total_problems: problem_results.len(),
        problem_results,
        errors: Vec::new(),
    }
}

/// A generation response carrying `code`.
pub fn candidate_json(name: &str, code: &str) -> String {
    json!({
        "name": name,
        "rationale": format!("{name} rationale"),
        "code": code,
    })
    .to_string()
}

/// POSIX `sh` runtime: candidates define `name() { ...; }` and echo a JSON value
/// as their last line of output.
pub fn sh_runtime() -> Runtime {
    const HARNESS: &str = "\
. ./{{ candidate_file }}
read -r ARGS
set -- $(printf '%s' \"$ARGS\" | sed 's/[][,]/ /g')
{{ function }} \"$@\" > .stdout
cat .stdout
tail -n 1 .stdout > {{ result_file }}
";
    Runtime::new(
        vec!["sh".to_string()],
        "sh",
        r"(?m)^[ \t]*([A-Za-z_][A-Za-z0-9_]*)[ \t]*\(\)",
        HARNESS,
    )
    .expect("sh runtime")
}

/// [`CaseRunner`] that answers from a script instead of spawning processes.
///
/// Entry points are found with the Python scanner. By default every case
/// passes; `with_results` scripts pass/fail by invocation index.
pub struct ScriptedCaseRunner {
    scanner: FunctionScanner,
    results: Vec<bool>,
    timeouts: Vec<usize>,
    sources: Mutex<Vec<String>>,
}

impl ScriptedCaseRunner {
    pub fn passing() -> Self {
        Self::with_results(Vec::new())
    }

    pub fn with_results(results: Vec<bool>) -> Self {
        Self {
            scanner: FunctionScanner::new(PYTHON_FUNCTION_PATTERN).expect("scanner"),
            results,
            timeouts: Vec::new(),
            sources: Mutex::new(Vec::new()),
        }
    }

    /// Report a timeout for the invocation at `index` (0-based).
    pub fn timing_out_on(mut self, index: usize) -> Self {
        self.timeouts.push(index);
        self
    }

    pub fn invocations(&self) -> usize {
        self.sources.lock().expect("lock").len()
    }

    pub fn sources(&self) -> Vec<String> {
        self.sources.lock().expect("lock").clone()
    }
}

impl CaseRunner for ScriptedCaseRunner {
    fn entry_point(&self, source: &str) -> Option<String> {
        self.scanner.first_function(source)
    }

    fn run_case(&self, source: &str, _function: &str, case: &TestCase) -> SandboxOutcome {
        let index = {
            let mut sources = self.sources.lock().expect("lock");
            sources.push(source.to_string());
            sources.len() - 1
        };
        if self.timeouts.contains(&index) {
            return SandboxOutcome {
                actual: None,
                passed: false,
                error: Some(CaseError::new(SandboxErrorKind::Timeout, "execution exceeded 10s")),
            };
        }
        let passed = self.results.get(index).copied().unwrap_or(true);
        SandboxOutcome {
            actual: Some(if passed { case.expected.clone() } else { Value::Null }),
            passed,
            error: None,
        }
    }
}

/// [`PipelineHost`] returning scripted values, cycling through them per call.
pub struct ScriptedPipelineHost {
    load_failure: Option<(String, String)>,
    responses: Arc<Vec<std::result::Result<Value, String>>>,
    calls: Arc<AtomicUsize>,
    opened: Mutex<Vec<String>>,
}

impl ScriptedPipelineHost {
    pub fn scripted(responses: Vec<std::result::Result<Value, String>>) -> Self {
        Self {
            load_failure: None,
            responses: Arc::new(responses),
            calls: Arc::new(AtomicUsize::new(0)),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(values: Vec<Value>) -> Self {
        Self::scripted(values.into_iter().map(Ok).collect())
    }

    pub fn failing_load(error_type: &str, error_message: &str) -> Self {
        Self {
            load_failure: Some((error_type.to_string(), error_message.to_string())),
            ..Self::scripted(Vec::new())
        }
    }

    /// Total `solve` calls across all sessions.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opened.lock().expect("lock").len()
    }

    pub fn opened_sources(&self) -> Vec<String> {
        self.opened.lock().expect("lock").clone()
    }
}

pub struct ScriptedSession {
    responses: Arc<Vec<std::result::Result<Value, String>>>,
    calls: Arc<AtomicUsize>,
}

impl PipelineSession for ScriptedSession {
    fn solve(&mut self, _problem: &ProblemSpec) -> std::result::Result<Value, String> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.responses.is_empty() {
            return Err("no scripted response".to_string());
        }
        self.responses[index % self.responses.len()].clone()
    }
}

impl PipelineHost for ScriptedPipelineHost {
    type Session = ScriptedSession;

    fn open(&self, source: &str) -> Result<PipelineLoad<ScriptedSession>> {
        self.opened.lock().expect("lock").push(source.to_string());
        if let Some((error_type, error_message)) = &self.load_failure {
            return Ok(PipelineLoad::Failed(LoadFailure {
                error_type: error_type.clone(),
                error_message: error_message.clone(),
                problematic_code: source.to_string(),
            }));
        }
        Ok(PipelineLoad::Ready(ScriptedSession {
            responses: Arc::clone(&self.responses),
            calls: Arc::clone(&self.calls),
        }))
    }
}

/// [`CompletionClient`] answering from a queue; `Err` entries become errors.
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new(responses: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

impl CompletionClient for ScriptedCompletion {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().expect("lock").push(request.clone());
        match self.responses.lock().expect("lock").pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("completion script exhausted")),
        }
    }
}
