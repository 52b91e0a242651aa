//! Accuracy of one solution over a problem's test cases.

use tracing::{debug, instrument};

use crate::core::entry_point::strip_code_fences;
use crate::core::types::{CaseError, CaseOutcome, SandboxErrorKind, TestCase};
use crate::io::sandbox::CaseRunner;

/// Accuracy plus per-case detail.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyReport {
    /// `100 * passed / total`; `0` when there are no cases.
    pub accuracy: f64,
    pub details: Vec<CaseOutcome>,
}

/// Run `solution` against every case, in order.
///
/// A solution without a discoverable function fails every case with
/// [`SandboxErrorKind::NoEntryPoint`] and nothing is executed.
#[instrument(skip_all, fields(cases = cases.len()))]
pub fn evaluate_accuracy<R: CaseRunner + ?Sized>(
    runner: &R,
    solution: &str,
    cases: &[TestCase],
) -> AccuracyReport {
    if cases.is_empty() {
        return AccuracyReport {
            accuracy: 0.0,
            details: Vec::new(),
        };
    }

    let source = strip_code_fences(solution);
    let Some(function) = runner.entry_point(&source) else {
        debug!("no entry point in solution");
        let details = cases
            .iter()
            .enumerate()
            .map(|(idx, case)| CaseOutcome {
                test_case: idx + 1,
                input: case.input.clone(),
                expected: case.expected.clone(),
                actual: None,
                correct: false,
                error: Some(CaseError::new(
                    SandboxErrorKind::NoEntryPoint,
                    "no function definition found in solution",
                )),
            })
            .collect();
        return AccuracyReport {
            accuracy: 0.0,
            details,
        };
    };

    let details: Vec<CaseOutcome> = cases
        .iter()
        .enumerate()
        .map(|(idx, case)| {
            let outcome = runner.run_case(&source, &function, case);
            CaseOutcome {
                test_case: idx + 1,
                input: case.input.clone(),
                expected: case.expected.clone(),
                actual: outcome.actual,
                correct: outcome.passed,
                error: outcome.error,
            }
        })
        .collect();

    let passed = details.iter().filter(|detail| detail.correct).count();
    let accuracy = 100.0 * passed as f64 / cases.len() as f64;
    debug!(%function, passed, accuracy, "evaluated solution");
    AccuracyReport { accuracy, details }
}
