//! Multi-iteration generator loop for `metagen run`.

use anyhow::Result;
use rand::Rng;
use tracing::{error, info};

use crate::io::completion::CompletionClient;
use crate::io::history_store::PersistenceError;
use crate::io::pipeline_host::PipelineHost;
use crate::io::sandbox::CaseRunner;
use crate::orchestrator::{CycleOutcome, Orchestrator};

/// What happened in one iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationResult {
    Evaluated {
        agent_id: String,
        name: String,
        accuracy: f64,
        accuracy_std: f64,
        avg_latency: f64,
        clean_runs: u32,
        total_runs: u32,
        load_error: Option<String>,
    },
    GenerationFailed {
        error: String,
    },
    /// The cycle raised; the loop carried on.
    Errored {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    /// 1-based.
    pub iteration: u32,
    pub total: u32,
    pub result: IterationResult,
}

impl IterationReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.result, IterationResult::Evaluated { .. })
    }

    /// One-line summary printed by the CLI.
    pub fn summary_line(&self) -> String {
        let prefix = format!("[{}/{}]", self.iteration, self.total);
        match &self.result {
            IterationResult::Evaluated {
                agent_id,
                name,
                accuracy,
                accuracy_std,
                avg_latency,
                clean_runs,
                total_runs,
                load_error: None,
            } => format!(
                "{prefix} ok #{agent_id} {name}: accuracy {accuracy:.1}% (±{accuracy_std:.1}), latency {avg_latency:.2}s, {clean_runs}/{total_runs} clean"
            ),
            IterationResult::Evaluated {
                agent_id,
                name,
                load_error: Some(load_error),
                ..
            } => format!("{prefix} ok #{agent_id} {name}: failed to load ({load_error})"),
            IterationResult::GenerationFailed { error } => {
                format!("{prefix} FAIL generation: {}", first_line(error))
            }
            IterationResult::Errored { error } => {
                format!("{prefix} FAIL error: {}", first_line(error))
            }
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopOutcome {
    pub iterations_run: u32,
    pub evaluated: u32,
    pub failed: u32,
}

/// Run `iterations` generate/evaluate cycles, calling `on_iteration` after each.
///
/// A failed cycle is reported and the loop continues. The only error that
/// stops the loop is a [`PersistenceError`], which is returned.
pub fn run_loop<C, H, R, G, F>(
    orchestrator: &Orchestrator<'_, C, H, R>,
    task: &str,
    iterations: u32,
    rng: &mut G,
    mut on_iteration: F,
) -> Result<LoopOutcome>
where
    C: CompletionClient + ?Sized,
    H: PipelineHost + ?Sized,
    R: CaseRunner + ?Sized,
    G: Rng + ?Sized,
    F: FnMut(&IterationReport),
{
    let mut outcome = LoopOutcome::default();
    for iteration in 1..=iterations {
        info!(iteration, iterations, "starting cycle");
        let result = match orchestrator.create_and_evaluate(task, rng) {
            Ok(CycleOutcome::Evaluated { record }) => IterationResult::Evaluated {
                agent_id: record.agent_id.clone(),
                name: record.name.clone(),
                accuracy: record.performance.accuracy,
                accuracy_std: record.performance.accuracy_std,
                avg_latency: record.performance.avg_execution_time,
                clean_runs: record.performance.successful_runs,
                total_runs: record.performance.total_runs,
                load_error: record
                    .load_error
                    .as_ref()
                    .map(|load| format!("{}: {}", load.error_type, load.error_message)),
            },
            Ok(CycleOutcome::GenerationFailed { error, .. }) => {
                IterationResult::GenerationFailed { error }
            }
            Err(err) => {
                if err.downcast_ref::<PersistenceError>().is_some() {
                    error!(err = %format!("{err:#}"), "history write failed, stopping");
                    return Err(err);
                }
                IterationResult::Errored {
                    error: format!("{err:#}"),
                }
            }
        };

        let report = IterationReport {
            iteration,
            total: iterations,
            result,
        };
        outcome.iterations_run += 1;
        if report.succeeded() {
            outcome.evaluated += 1;
        } else {
            outcome.failed += 1;
        }
        on_iteration(&report);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lines_are_single_line() {
        let ok = IterationReport {
            iteration: 1,
            total: 3,
            result: IterationResult::Evaluated {
                agent_id: "004".to_string(),
                name: "Debate".to_string(),
                accuracy: 66.666,
                accuracy_std: 4.1,
                avg_latency: 2.314,
                clean_runs: 2,
                total_runs: 3,
                load_error: None,
            },
        };
        assert_eq!(
            ok.summary_line(),
            "[1/3] ok #004 Debate: accuracy 66.7% (±4.1), latency 2.31s, 2/3 clean"
        );

        let failed = IterationReport {
            iteration: 2,
            total: 3,
            result: IterationResult::Errored {
                error: "spawn failed\ncaused by: nope".to_string(),
            },
        };
        assert_eq!(failed.summary_line(), "[2/3] FAIL error: spawn failed");
        assert!(!failed.succeeded());
    }
}
