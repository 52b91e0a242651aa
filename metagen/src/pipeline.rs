//! Multi-trial evaluation of a generated pipeline over the problem catalog.
//!
//! A candidate is loaded once. Each trial calls the pipeline's entry function
//! for every problem, scores the returned `code` with the accuracy evaluator,
//! and counts a problem as solved only when every test case passes. Trials
//! are reduced into a [`PerformanceSummary`].

use std::time::Instant;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::accuracy::evaluate_accuracy;
use crate::core::record::{LoadFailure, PerformanceSummary, ProblemOutcome, TrialResult};
use crate::core::stats::summarize_trials;
use crate::core::types::ProblemSpec;
use crate::io::pipeline_host::{PipelineHost, PipelineLoad, PipelineSession};
use crate::io::sandbox::CaseRunner;

/// Accuracy a problem must reach to count as solved.
pub const SOLVED_ACCURACY: f64 = 100.0;

/// Everything learned about one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEvaluation {
    pub summary: PerformanceSummary,
    pub trials: Vec<TrialResult>,
    /// Set when the candidate could not be loaded; no trials ran.
    pub load_failure: Option<LoadFailure>,
}

/// Runs candidates through repeated trials.
pub struct PipelineEvaluator<'a, H: ?Sized, R: ?Sized> {
    host: &'a H,
    runner: &'a R,
    catalog: &'a [ProblemSpec],
    trials: u32,
}

impl<'a, H: PipelineHost + ?Sized, R: CaseRunner + ?Sized> PipelineEvaluator<'a, H, R> {
    pub fn new(host: &'a H, runner: &'a R, catalog: &'a [ProblemSpec], trials: u32) -> Self {
        Self {
            host,
            runner,
            catalog,
            trials,
        }
    }

    /// Evaluate `source`. `Err` only for host-side infrastructure failures.
    #[instrument(skip_all, fields(trials = self.trials, problems = self.catalog.len()))]
    pub fn evaluate(&self, source: &str) -> Result<PipelineEvaluation> {
        let mut session = match self.host.open(source)? {
            PipelineLoad::Ready(session) => session,
            PipelineLoad::Failed(failure) => {
                warn!(error_type = %failure.error_type, "candidate rejected before trials");
                return Ok(PipelineEvaluation {
                    summary: PerformanceSummary::default(),
                    trials: Vec::new(),
                    load_failure: Some(failure),
                });
            }
        };

        let trials: Vec<TrialResult> = (1..=self.trials)
            .map(|run_number| self.run_trial(&mut session, run_number))
            .collect();
        let summary = summarize_trials(&trials);
        info!(
            accuracy = summary.accuracy,
            clean = summary.successful_runs,
            "candidate evaluated"
        );
        Ok(PipelineEvaluation {
            summary,
            trials,
            load_failure: None,
        })
    }

    fn run_trial<S: PipelineSession>(&self, session: &mut S, run_number: u32) -> TrialResult {
        let mut problem_results = Vec::with_capacity(self.catalog.len());
        let mut errors = Vec::new();
        let mut correct_count = 0usize;
        let mut total_time = 0.0f64;

        for problem in self.catalog {
            let started = Instant::now();
            let returned = session.solve(problem);
            let execution_time = started.elapsed().as_secs_f64();
            total_time += execution_time;

            let outcome = self.score(problem, returned, execution_time);
            if outcome.success {
                correct_count += 1;
            } else if let Some(error) = &outcome.error {
                errors.push(format!("Problem '{}': {}", problem.title, error));
            } else {
                errors.push(format!(
                    "Problem '{}': accuracy {:.1}% below {SOLVED_ACCURACY}%",
                    problem.title, outcome.accuracy
                ));
            }
            problem_results.push(outcome);
        }

        let total_problems = self.catalog.len();
        let (accuracy, avg_execution_time) = if total_problems == 0 {
            (0.0, 0.0)
        } else {
            (
                100.0 * correct_count as f64 / total_problems as f64,
                total_time / total_problems as f64,
            )
        };
        debug!(run_number, accuracy, errors = errors.len(), "trial finished");
        TrialResult {
            run_number,
            accuracy,
            avg_execution_time,
            total_time,
            correct_count,
            total_problems,
            problem_results,
            errors,
        }
    }

    fn score(
        &self,
        problem: &ProblemSpec,
        returned: std::result::Result<Value, String>,
        execution_time: f64,
    ) -> ProblemOutcome {
        let mut outcome = ProblemOutcome {
            problem: problem.title.clone(),
            problem_id: problem.id.clone(),
            success: false,
            accuracy: 0.0,
            execution_time,
            details: Vec::new(),
            error: None,
        };
        let value = match returned {
            Ok(value) => value,
            Err(raised) => {
                outcome.error = Some(format!("Exception: {raised}"));
                return outcome;
            }
        };
        let Some(code) = value.get("code").and_then(Value::as_str) else {
            outcome.error = Some(format!(
                "Invalid result: expected an object with a string 'code' field, got {}",
                describe(&value)
            ));
            return outcome;
        };

        let report = evaluate_accuracy(self.runner, code, &problem.tests);
        outcome.accuracy = report.accuracy;
        outcome.success = report.accuracy == SOLVED_ACCURACY;
        outcome.details = report.details;
        outcome
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object without 'code'",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedCaseRunner, ScriptedPipelineHost, problem};
    use serde_json::json;

    fn catalog() -> Vec<ProblemSpec> {
        vec![problem("p1", "First", 2), problem("p2", "Second", 2)]
    }

    #[test]
    fn load_failure_skips_trials() {
        let host = ScriptedPipelineHost::failing_load("SyntaxError", "invalid syntax");
        let runner = ScriptedCaseRunner::passing();
        let catalog = catalog();
        let evaluation = PipelineEvaluator::new(&host, &runner, &catalog, 3)
            .evaluate("def (")
            .expect("evaluate");

        let failure = evaluation.load_failure.expect("load failure");
        assert_eq!(failure.error_type, "SyntaxError");
        assert_eq!(failure.problematic_code, "def (");
        assert!(evaluation.trials.is_empty());
        assert_eq!(evaluation.summary.accuracy, 0.0);
        assert_eq!(host.calls(), 0);
        assert_eq!(runner.invocations(), 0);
    }

    #[test]
    fn fully_passing_candidate_solves_everything() {
        let host = ScriptedPipelineHost::returning(vec![json!({"code": "def f(x):\n    return x\n"})]);
        let runner = ScriptedCaseRunner::passing();
        let catalog = catalog();
        let evaluation = PipelineEvaluator::new(&host, &runner, &catalog, 3)
            .evaluate("def solve_problem(p): ...")
            .expect("evaluate");

        assert_eq!(evaluation.trials.len(), 3);
        assert_eq!(evaluation.summary.accuracy, 100.0);
        assert_eq!(evaluation.summary.successful_runs, 3);
        assert_eq!(evaluation.summary.total_runs, 3);
        assert_eq!(host.calls(), 6);
        assert!(evaluation.trials.iter().all(|t| t.correct_count == 2));
    }

    #[test]
    fn invalid_result_and_exception_are_recorded_and_trial_continues() {
        let host = ScriptedPipelineHost::scripted(vec![
            Ok(json!({"answer": 42})),
            Err("ValueError: bad".to_string()),
        ]);
        let runner = ScriptedCaseRunner::passing();
        let catalog = catalog();
        let evaluation = PipelineEvaluator::new(&host, &runner, &catalog, 1)
            .evaluate("src")
            .expect("evaluate");

        let trial = &evaluation.trials[0];
        assert_eq!(trial.accuracy, 0.0);
        assert_eq!(trial.problem_results.len(), 2);
        assert_eq!(trial.errors.len(), 2);
        assert!(trial.errors[0].contains("Invalid result"));
        assert!(trial.errors[1].contains("ValueError: bad"));
        assert!(!trial.is_clean());
        assert_eq!(evaluation.summary.successful_runs, 0);
        assert_eq!(runner.invocations(), 0);
    }

    /// Verifies a majority pass does not count as solved.
    #[test]
    fn partial_pass_is_not_solved_and_marks_trial_unclean() {
        let host = ScriptedPipelineHost::returning(vec![json!({"code": "def f(x):\n    return x\n"})]);
        let runner = ScriptedCaseRunner::with_results(vec![true, false, true, true]);
        let catalog = catalog();
        let evaluation = PipelineEvaluator::new(&host, &runner, &catalog, 1)
            .evaluate("src")
            .expect("evaluate");

        let trial = &evaluation.trials[0];
        assert_eq!(trial.correct_count, 1);
        assert_eq!(trial.accuracy, 50.0);
        assert!(!trial.problem_results[0].success);
        assert_eq!(trial.problem_results[0].accuracy, 50.0);
        assert!(trial.problem_results[1].success);
        assert_eq!(trial.errors.len(), 1);
        assert!(trial.errors[0].contains("First"));
    }

    #[test]
    fn empty_catalog_yields_zero_trials_without_nan() {
        let host = ScriptedPipelineHost::returning(vec![json!({"code": ""})]);
        let runner = ScriptedCaseRunner::passing();
        let evaluation = PipelineEvaluator::new(&host, &runner, &[], 2)
            .evaluate("src")
            .expect("evaluate");
        assert_eq!(evaluation.trials.len(), 2);
        assert_eq!(evaluation.summary.accuracy, 0.0);
        assert_eq!(evaluation.summary.avg_execution_time, 0.0);
    }
}
