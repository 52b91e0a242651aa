//! Deterministic classification of low-performing records.

use crate::core::record::AgentRecord;

/// Why a record is considered non-functional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// No correct answers at all.
    Critical,
    /// Predominantly incorrect answers.
    Logic,
    /// Excessive latency.
    Performance,
    /// Low overall accuracy.
    Architecture,
    Unclassified,
}

impl FailureClass {
    pub fn label(self) -> &'static str {
        match self {
            FailureClass::Critical => "critical: no correct answers",
            FailureClass::Logic => "logic: predominantly incorrect answers",
            FailureClass::Performance => "performance: excessive execution time",
            FailureClass::Architecture => "architecture: low overall accuracy",
            FailureClass::Unclassified => "unclassified",
        }
    }
}

/// Observed metrics a classification rule inspects.
#[derive(Debug, Clone, Copy)]
pub struct Metrics {
    pub accuracy: f64,
    pub avg_latency_secs: f64,
}

/// Classification rules, evaluated top to bottom; the first match wins.
pub const FAILURE_RULES: &[(FailureClass, fn(Metrics) -> bool)] = &[
    (FailureClass::Critical, no_correct_answers),
    (FailureClass::Logic, below_ten_percent),
    (FailureClass::Performance, slower_than_ten_seconds),
    (FailureClass::Architecture, below_thirty_percent),
];

fn no_correct_answers(m: Metrics) -> bool {
    m.accuracy == 0.0
}

fn below_ten_percent(m: Metrics) -> bool {
    m.accuracy < 10.0
}

fn slower_than_ten_seconds(m: Metrics) -> bool {
    m.avg_latency_secs > 10.0
}

fn below_thirty_percent(m: Metrics) -> bool {
    m.accuracy < 30.0
}

pub fn classify_metrics(metrics: Metrics) -> FailureClass {
    FAILURE_RULES
        .iter()
        .find(|(_, rule)| rule(metrics))
        .map(|(class, _)| *class)
        .unwrap_or(FailureClass::Unclassified)
}

pub fn classify_record(record: &AgentRecord) -> FailureClass {
    classify_metrics(Metrics {
        accuracy: record.accuracy(),
        avg_latency_secs: record.avg_latency(),
    })
}
