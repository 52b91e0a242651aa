//! Error excerpts pulled from a record's nested trial detail.

use crate::core::record::AgentRecord;

/// Collected excerpts plus the number that did not fit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Excerpts {
    pub lines: Vec<String>,
    pub omitted: usize,
}

/// Collapse a multi-line diagnostic to its last non-blank line.
pub fn last_line(message: &str) -> &str {
    message
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

/// Collapse a trial-level error, keeping its `Problem '<title>': ` prefix.
///
/// Trial errors repeat the problem's own error behind that prefix; collapsing
/// after the prefix lets them dedupe against the per-problem excerpt.
fn collapse_trial_error(error: &str) -> String {
    match error.split_once("': ") {
        Some((head, rest)) if head.starts_with("Problem '") && !head.contains('\n') => {
            format!("{head}': {}", last_line(rest))
        }
        _ => last_line(error).to_string(),
    }
}

/// Truncate to `max_chars` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Deduplicated error strings in encounter order, at most `max` kept.
///
/// Sources, per trial: trial-level errors, per-problem errors prefixed with
/// the problem title, and per-case errors prefixed with `Test case:`.
pub fn error_excerpts(record: &AgentRecord, max: usize, max_chars: usize) -> Excerpts {
    let mut all: Vec<String> = Vec::new();
    let mut push = |text: String| {
        if !text.is_empty() && !all.contains(&text) {
            all.push(text);
        }
    };

    for trial in &record.detailed_results {
        for error in &trial.errors {
            push(truncate_chars(&collapse_trial_error(error), max_chars));
        }
        for problem in &trial.problem_results {
            if let Some(error) = &problem.error {
                push(truncate_chars(
                    &format!("Problem '{}': {}", problem.problem, last_line(error)),
                    max_chars,
                ));
            }
            for case in &problem.details {
                if let Some(error) = &case.error {
                    let line = format!("{}: {}", error.kind.label(), last_line(&error.message));
                    push(truncate_chars(&format!("Test case: {line}"), max_chars));
                }
            }
        }
    }

    let omitted = all.len().saturating_sub(max);
    all.truncate(max);
    Excerpts {
        lines: all,
        omitted,
    }
}
