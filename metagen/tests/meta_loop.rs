//! Multi-iteration loop tests over a real history file.
//!
//! Completion, pipeline host, and case runner are scripted; the history store
//! is the real one, so ids, persistence, and prompt conditioning are exercised
//! end to end.

use metagen::core::types::ProblemSpec;
use metagen::io::config::MetagenConfig;
use metagen::io::history_store::{HistoryStore, PersistenceError};
use metagen::looping::{IterationReport, IterationResult, run_loop};
use metagen::orchestrator::{Orchestrator, OrchestratorSettings};
use metagen::test_support::{
    ScriptedCaseRunner, ScriptedCompletion, ScriptedPipelineHost, candidate_json, problem,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

const IDENTITY: &str = "def f(x):\n    return x\n";

fn settings() -> OrchestratorSettings {
    let mut settings = OrchestratorSettings::from_config(&MetagenConfig::default());
    settings.trials = 2;
    settings
}

fn catalog() -> Vec<ProblemSpec> {
    vec![problem("p1", "Identity", 2), problem("p2", "Echo", 1)]
}

/// Three iterations: success, unparseable response, success.
///
/// Verifies that ids stay contiguous across the failed iteration, the loop
/// reports every iteration, and the third prompt is conditioned on the first
/// candidate.
#[test]
fn loop_survives_failures_and_conditions_later_prompts() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = HistoryStore::new(temp.path().join("agent_history.json"));
    let catalog = catalog();
    let completion = ScriptedCompletion::new(vec![
        Ok(candidate_json("Solo Agent", "def solve_problem(p):\n    ...\n")),
        Ok("I could not come up with anything".to_string()),
        Ok(format!(
            "Here you go:\n```json\n{}\n```",
            candidate_json("Debate Pair", "def solve_problem(p):\n    ...\n")
        )),
    ]);
    let host = ScriptedPipelineHost::returning(vec![json!({ "code": IDENTITY })]);
    let runner = ScriptedCaseRunner::passing();
    let orchestrator = Orchestrator {
        completion: &completion,
        host: &host,
        runner: &runner,
        store: &store,
        catalog: &catalog,
        settings: settings(),
    };

    let mut reports: Vec<IterationReport> = Vec::new();
    let outcome = run_loop(
        &orchestrator,
        "Solve coding problems",
        3,
        &mut StdRng::seed_from_u64(7),
        |report| reports.push(report.clone()),
    )
    .expect("loop");

    assert_eq!(outcome.iterations_run, 3);
    assert_eq!(outcome.evaluated, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(reports.len(), 3);
    assert!(matches!(
        reports[1].result,
        IterationResult::GenerationFailed { .. }
    ));

    let history = store.load();
    let ids: Vec<&str> = history.iter().map(|r| r.agent_id.as_str()).collect();
    assert_eq!(ids, vec!["001", "002"]);
    assert_eq!(history[1].name, "Debate Pair");
    assert!(history.iter().all(|r| r.performance.accuracy == 100.0));
    assert!(history.iter().all(|r| r.performance.total_runs == 2));

    let requests = completion.requests();
    assert_eq!(requests.len(), 3);
    assert!(!requests[0].user_prompt.contains("Solo Agent"));
    assert!(requests[2].user_prompt.contains("### Solo Agent (id 001)"));

    // Two trials over three cases per evaluated candidate.
    assert_eq!(runner.invocations(), 2 * 2 * 3);
}

#[test]
fn failing_candidates_become_negative_examples() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = HistoryStore::new(temp.path().join("agent_history.json"));
    let catalog = catalog();
    let completion = ScriptedCompletion::new(vec![
        Ok(candidate_json("Broken", "def solve_problem(:")),
        Ok(candidate_json("Retry", "def solve_problem(p):\n    ...\n")),
    ]);
    let host = ScriptedPipelineHost::failing_load("SyntaxError", "invalid syntax");
    let runner = ScriptedCaseRunner::passing();
    let orchestrator = Orchestrator {
        completion: &completion,
        host: &host,
        runner: &runner,
        store: &store,
        catalog: &catalog,
        settings: settings(),
    };

    let outcome = run_loop(
        &orchestrator,
        "task",
        2,
        &mut StdRng::seed_from_u64(1),
        |_| {},
    )
    .expect("loop");
    assert_eq!(outcome.evaluated, 2);
    assert_eq!(runner.invocations(), 0);

    let second_prompt = &completion.requests()[1].user_prompt;
    assert!(second_prompt.contains("Broken (id 001) - failed"));
    assert!(second_prompt.contains("Load error (SyntaxError)"));
    assert!(second_prompt.contains("def solve_problem(:"));
}

#[test]
fn persistence_failure_stops_the_loop() {
    let temp = tempfile::tempdir().expect("tempdir");
    let blocker = temp.path().join("not-a-dir");
    std::fs::write(&blocker, "file").expect("write blocker");
    let store = HistoryStore::new(blocker.join("agent_history.json"));
    let catalog = catalog();
    let completion = ScriptedCompletion::new(vec![
        Ok(candidate_json("One", "def solve_problem(p):\n    ...\n")),
        Ok(candidate_json("Two", "def solve_problem(p):\n    ...\n")),
    ]);
    let host = ScriptedPipelineHost::returning(vec![json!({ "code": IDENTITY })]);
    let runner = ScriptedCaseRunner::passing();
    let orchestrator = Orchestrator {
        completion: &completion,
        host: &host,
        runner: &runner,
        store: &store,
        catalog: &catalog,
        settings: settings(),
    };

    let mut seen = 0;
    let err = run_loop(
        &orchestrator,
        "task",
        2,
        &mut StdRng::seed_from_u64(1),
        |_| seen += 1,
    )
    .expect_err("history write should fail");
    assert!(err.downcast_ref::<PersistenceError>().is_some());
    assert_eq!(seen, 0);
    assert_eq!(completion.requests().len(), 1);
}
