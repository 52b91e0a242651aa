//! Process-level tests against a real `python3`.
//!
//! Skipped (with a note on stderr) when no interpreter is on PATH.

use std::process::Command;
use std::time::Duration;

use metagen::accuracy::evaluate_accuracy;
use metagen::core::types::{SandboxErrorKind, TestCase};
use metagen::io::config::{CompletionConfig, CompletionInput};
use metagen::io::pipeline_host::{
    PipelineHost, PipelineLoad, PipelineSession, ProcessHostSettings, ProcessPipelineHost,
};
use metagen::io::sandbox::{Runtime, Sandbox};
use metagen::pipeline::PipelineEvaluator;
use metagen::test_support::problem;
use serde_json::{Value, json};

fn python_available() -> bool {
    let found = Command::new("python3")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success());
    if !found {
        eprintln!("python3 not found, skipping");
    }
    found
}

fn sandbox() -> Sandbox {
    Sandbox::new(Runtime::python(), Duration::from_secs(10))
}

fn case(input: Vec<Value>, expected: Value) -> TestCase {
    TestCase { input, expected }
}

fn host(completion_command: &[&str]) -> ProcessPipelineHost {
    ProcessPipelineHost::new(ProcessHostSettings {
        program: vec!["python3".to_string()],
        entry_function: "solve_problem".to_string(),
        load_timeout: Duration::from_secs(30),
        call_timeout: Some(Duration::from_secs(30)),
        output_limit_bytes: 64_000,
        completion: CompletionConfig {
            command: completion_command.iter().map(|s| s.to_string()).collect(),
            input: CompletionInput::Text,
            ..CompletionConfig::default()
        },
        scratch_dir: None,
    })
}

#[test]
fn palindrome_solution_scores_full_accuracy() {
    if !python_available() {
        return;
    }
    let solution = "\
```python
def isPalindrome(x: int) -> bool:
    if x < 0:
        return False
    s = str(x)
    return s == s[::-1]
```";
    let cases = vec![
        case(vec![json!(121)], json!(true)),
        case(vec![json!(-121)], json!(false)),
        case(vec![json!(10)], json!(false)),
    ];

    let report = evaluate_accuracy(&sandbox(), solution, &cases);
    assert_eq!(report.accuracy, 100.0);
    assert!(report.details.iter().all(|d| d.correct && d.error.is_none()));
    assert_eq!(report.details[1].test_case, 2);
}

/// Candidates that print to stdout must not disturb result parsing.
#[test]
fn candidate_prints_do_not_affect_result() {
    if !python_available() {
        return;
    }
    let solution = "\
def add(a, b):
    print('debugging', a, b)
    print('{\"not\": \"the result\"}')
    return a + b
";
    let report = evaluate_accuracy(
        &sandbox(),
        solution,
        &[case(vec![json!(2), json!(3)], json!(5))],
    );
    assert_eq!(report.accuracy, 100.0);
    assert_eq!(report.details[0].actual, Some(json!(5)));
}

#[test]
fn result_survives_output_larger_than_the_capture_limit() {
    if !python_available() {
        return;
    }
    let solution = "\
def double(x):
    for i in range(20000):
        print('step', i, 'of a long and chatty computation')
    return x * 2
";
    let report = evaluate_accuracy(&sandbox(), solution, &[case(vec![json!(21)], json!(42))]);
    assert_eq!(report.accuracy, 100.0, "{:?}", report.details[0].error);
    assert_eq!(report.details[0].actual, Some(json!(42)));
}

#[test]
fn class_method_solutions_are_found() {
    if !python_available() {
        return;
    }
    let solution = "\
class Solution:
    def twoSum(self, nums, target):
        seen = {}
        for i, n in enumerate(nums):
            if target - n in seen:
                return [seen[target - n], i]
            seen[n] = i
        return []
";
    let report = evaluate_accuracy(
        &sandbox(),
        solution,
        &[case(vec![json!([2, 7, 11, 15]), json!(9)], json!([0, 1]))],
    );
    assert_eq!(report.accuracy, 100.0);
}

#[test]
fn exceptions_surface_as_runtime_errors() {
    if !python_available() {
        return;
    }
    let solution = "def first(xs):\n    return xs[0]\n";
    let report = evaluate_accuracy(&sandbox(), solution, &[case(vec![json!([])], json!(1))]);
    assert_eq!(report.accuracy, 0.0);
    let error = report.details[0].error.as_ref().expect("error");
    assert_eq!(error.kind, SandboxErrorKind::Runtime);
    assert!(error.message.contains("IndexError"));
}

#[test]
fn pipeline_with_syntax_error_fails_to_load() {
    if !python_available() {
        return;
    }
    let load = host(&["cat"])
        .open("def solve_problem(problem_data:\n    return {}\n")
        .expect("open");
    let PipelineLoad::Failed(failure) = load else {
        panic!("expected load failure");
    };
    assert_eq!(failure.error_type, "SyntaxError");
    assert!(failure.problematic_code.starts_with("def solve_problem("));
}

#[test]
fn pipeline_without_entry_function_fails_to_load() {
    if !python_available() {
        return;
    }
    let load = host(&["cat"])
        .open("def something_else(problem_data):\n    return {}\n")
        .expect("open");
    let PipelineLoad::Failed(failure) = load else {
        panic!("expected load failure");
    };
    assert_eq!(failure.error_type, "MissingEntryPoint");
}

/// A pipeline that asks the completion command for code, end to end.
///
/// The completion command is `cat`, so the "model" echoes the prompt back;
/// the pipeline sends a comment as system prompt and the solution as user
/// prompt, which yields a valid module.
#[test]
fn pipeline_calls_completion_and_scores_returned_code() {
    if !python_available() {
        return;
    }
    let source = "\
from metagen_llm import complete

def solve_problem(problem_data):
    print('working on', problem_data['title'])
    code = complete('echo-model', '# generated', 'def f(x):\\n    return x\\n')
    return {'code': code}
";
    let host = host(&["cat"]);
    let PipelineLoad::Ready(mut session) = host.open(source).expect("open") else {
        panic!("expected pipeline to load");
    };
    let value = session
        .solve(&problem("p1", "Identity", 2))
        .expect("solve");
    let code = value["code"].as_str().expect("code string");
    assert!(code.starts_with("# generated"));

    let catalog = vec![problem("p1", "Identity", 2)];
    let evaluation = PipelineEvaluator::new(&host, &sandbox(), &catalog, 1)
        .evaluate(source)
        .expect("evaluate");
    assert!(evaluation.load_failure.is_none());
    assert_eq!(evaluation.summary.accuracy, 100.0);
    assert_eq!(evaluation.summary.successful_runs, 1);
}

#[test]
fn pipeline_result_survives_large_output() {
    if !python_available() {
        return;
    }
    let source = "\
def solve_problem(problem_data):
    print('x' * 200000)
    return {'code': 'def f(x):\\n    return x\\n'}
";
    let PipelineLoad::Ready(mut session) = host(&["cat"]).open(source).expect("open") else {
        panic!("expected pipeline to load");
    };
    let value = session
        .solve(&problem("p1", "Identity", 1))
        .expect("solve");
    assert!(value["code"].as_str().is_some_and(|c| c.starts_with("def f")));
}

#[test]
fn pipeline_exception_is_reported_per_problem() {
    if !python_available() {
        return;
    }
    let source = "def solve_problem(problem_data):\n    raise ValueError('nope')\n";
    let PipelineLoad::Ready(mut session) = host(&["cat"]).open(source).expect("open") else {
        panic!("expected pipeline to load");
    };
    let err = session
        .solve(&problem("p1", "Identity", 1))
        .expect_err("solve should fail");
    assert!(err.contains("ValueError: nope"));
}
