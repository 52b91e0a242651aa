//! Durable evaluation records: trials, performance summaries, and agent records.

use serde::{Deserialize, Serialize};

use crate::core::types::CaseOutcome;

/// Outcome of one problem within one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemOutcome {
    /// Problem title.
    pub problem: String,
    pub problem_id: String,
    /// True only when every test case passed.
    pub success: bool,
    pub accuracy: f64,
    /// Wall-clock seconds spent in the pipeline call.
    pub execution_time: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<CaseOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One full pass of a candidate over the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    /// 1-based trial number.
    pub run_number: u32,
    pub accuracy: f64,
    pub avg_execution_time: f64,
    pub total_time: f64,
    pub correct_count: usize,
    pub total_problems: usize,
    pub problem_results: Vec<ProblemOutcome>,
    pub errors: Vec<String>,
}

impl TrialResult {
    /// A trial is clean when it recorded no errors at all.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Reduction over a sequence of trials.
///
/// Standard deviations are population standard deviations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub accuracy: f64,
    pub accuracy_std: f64,
    pub accuracy_range: [f64; 2],
    pub avg_execution_time: f64,
    pub time_std: f64,
    pub time_range: [f64; 2],
    /// Number of clean trials.
    pub successful_runs: u32,
    pub total_runs: u32,
}

/// Candidate that could not be loaded by the pipeline host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadFailure {
    /// Exception class or failure category reported by the host.
    pub error_type: String,
    pub error_message: String,
    pub problematic_code: String,
}

/// Generation-side configuration stored with each record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub source_sha256: String,
}

/// Compact per-trial line kept in `testing_stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialDigest {
    pub run: u32,
    pub accuracy: f64,
    pub avg_time: f64,
    /// Number of errors recorded in the trial.
    pub errors: usize,
}

impl TrialDigest {
    pub fn from_trial(trial: &TrialResult) -> Self {
        Self {
            run: trial.run_number,
            accuracy: trial.accuracy,
            avg_time: trial.avg_execution_time,
            errors: trial.errors.len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestingStats {
    pub successful_runs: u32,
    pub total_runs: u32,
    pub all_runs_summary: Vec<TrialDigest>,
}

/// The durable unit of history. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Zero-padded numeric id assigned by the history store.
    pub agent_id: String,
    pub name: String,
    /// RFC 3339 creation time.
    pub creation_timestamp: String,
    pub config: AgentConfig,
    pub performance: PerformanceSummary,
    pub testing_stats: TestingStats,
    #[serde(alias = "thinking")]
    pub narrative: String,
    #[serde(default)]
    pub detailed_results: Vec<TrialResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_error: Option<LoadFailure>,
}

impl AgentRecord {
    pub fn accuracy(&self) -> f64 {
        self.performance.accuracy
    }

    pub fn avg_latency(&self) -> f64 {
        self.performance.avg_execution_time
    }
}
