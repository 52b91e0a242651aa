//! Shared deterministic types for the benchmark catalog and generated candidates.
//!
//! These types define stable contracts between core components. They carry no
//! I/O and serialize with the snake_case keys used by the catalog file.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One input/expected-output pair from the benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Positional arguments passed to the solution function.
    pub input: Vec<Value>,
    /// Value the solution must return.
    pub expected: Value,
}

/// A benchmark problem. Loaded once and shared read-only across evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemSpec {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub function_signature: String,
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

/// Artifact produced by one generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
    pub rationale: String,
    /// Pipeline source defining the designated entry function.
    #[serde(rename = "code")]
    pub source_code: String,
}

/// Category of a failed sandboxed test-case run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxErrorKind {
    /// The solution defines no function; nothing was executed.
    NoEntryPoint,
    /// The child exceeded the wall-clock limit and was killed.
    Timeout,
    /// The child exited with a non-zero status.
    Runtime,
    /// The child exited cleanly but its printed value was not valid JSON.
    Deserialize,
    /// The child could not be started.
    Spawn,
}

impl SandboxErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            SandboxErrorKind::NoEntryPoint => "NoEntryPoint",
            SandboxErrorKind::Timeout => "Timeout",
            SandboxErrorKind::Runtime => "RuntimeError",
            SandboxErrorKind::Deserialize => "DeserializeError",
            SandboxErrorKind::Spawn => "SpawnError",
        }
    }
}

/// Error recorded against a single test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseError {
    pub kind: SandboxErrorKind,
    pub message: String,
}

impl CaseError {
    pub fn new(kind: SandboxErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.message)
    }
}

/// Per-test-case detail produced by the accuracy evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseOutcome {
    /// 1-based position of the case within the problem.
    pub test_case: usize,
    pub input: Vec<Value>,
    pub expected: Value,
    pub actual: Option<Value>,
    pub correct: bool,
    pub error: Option<CaseError>,
}
