//! Plain-text rendering of history reports.

use std::fmt::Write as _;

use chrono::DateTime;

use metagen::core::record::AgentRecord;
use metagen::core::selector::rank_records;
use metagen::core::stats::HistoryStats;

/// Ranking score shown next to accuracy: one point per 10s of latency.
pub fn combined_score(record: &AgentRecord) -> f64 {
    record.accuracy() - record.avg_latency() / 10.0
}

/// `YYYY-MM-DD HH:MM` for RFC 3339 stamps; anything else is shown as stored.
pub fn format_created(timestamp: &str) -> String {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(created) => created.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => timestamp.to_string(),
    }
}

pub fn render_top(records: &[AgentRecord], n: usize) -> String {
    let mut out = format!(
        "{:<4} {:<5} {:<28} {:>15} {:>9} {:>7} {:<16} {:>7}\n",
        "rank", "id", "name", "accuracy", "latency", "clean", "created", "score"
    );
    for (idx, record) in rank_records(records).into_iter().take(n).enumerate() {
        let perf = &record.performance;
        let _ = writeln!(
            out,
            "{:<4} {:<5} {:<28} {:>15} {:>8.2}s {:>7} {:<16} {:>7.1}",
            idx + 1,
            record.agent_id,
            truncate_name(&record.name, 28),
            format!("{:.1}% ±{:.1}", perf.accuracy, perf.accuracy_std),
            perf.avg_execution_time,
            format!("{}/{}", perf.successful_runs, perf.total_runs),
            format_created(&record.creation_timestamp),
            combined_score(record)
        );
    }
    out
}

fn truncate_name(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        return name.to_string();
    }
    let kept: String = name.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

pub fn render_stats(stats: &HistoryStats) -> String {
    format!(
        "agents: {}\n\
         accuracy: avg {:.1}% | min {:.1}% | max {:.1}%\n\
         avg latency: {:.2}s\n\
         functional (>= 30%): {}\n\
         high performance (>= 70%): {}\n",
        stats.total_agents,
        stats.avg_accuracy,
        stats.min_accuracy,
        stats.max_accuracy,
        stats.avg_execution_time,
        stats.functional_agents,
        stats.high_performance_agents
    )
}

pub fn render_record(record: &AgentRecord) -> String {
    let perf = &record.performance;
    let mut out = format!(
        "#{} {} ({})\ncreated: {}\naccuracy: {:.1}% ±{:.1} (range {:.1}-{:.1})\nlatency: {:.2}s ±{:.2}\nclean trials: {}/{}\nscore: {:.1}\n",
        record.agent_id,
        record.name,
        record.config.kind,
        format_created(&record.creation_timestamp),
        perf.accuracy,
        perf.accuracy_std,
        perf.accuracy_range[0],
        perf.accuracy_range[1],
        perf.avg_execution_time,
        perf.time_std,
        perf.successful_runs,
        perf.total_runs,
        combined_score(record)
    );

    if !record.testing_stats.all_runs_summary.is_empty() {
        out.push_str("trials:\n");
        for digest in &record.testing_stats.all_runs_summary {
            let _ = writeln!(
                out,
                "  run {}: accuracy {:.1}%, avg {:.2}s, {} errors",
                digest.run, digest.accuracy, digest.avg_time, digest.errors
            );
        }
    }
    if let Some(load) = &record.load_error {
        let _ = writeln!(out, "load error: {}: {}", load.error_type, load.error_message);
    }
    let _ = writeln!(out, "notes: {}", record.narrative.trim());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use metagen::core::record::TrialDigest;
    use metagen::core::stats::history_stats;
    use metagen::test_support::{record, record_with_load_error};

    #[test]
    fn top_is_ranked_and_limited() {
        let records = vec![
            record("001", 50.0, 1.0),
            record("002", 90.0, 3.0),
            record("003", 90.0, 2.0),
        ];
        let table = render_top(&records, 2);
        let rows: Vec<&str> = table.lines().skip(1).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("1    003"));
        assert!(rows[1].starts_with("2    002"));
        assert!(rows[0].contains("90.0% ±0.0"));
        assert!(rows[0].contains("3/3"));
        assert!(rows[0].contains("2026-01-01 00:00"));
    }

    #[test]
    fn combined_score_penalizes_latency() {
        assert_eq!(combined_score(&record("001", 80.0, 5.0)), 79.5);
    }

    #[test]
    fn unparseable_timestamp_is_shown_raw() {
        assert_eq!(format_created("yesterday"), "yesterday");
    }

    #[test]
    fn long_names_are_truncated() {
        assert_eq!(truncate_name("abcdefgh", 6), "abc...");
        assert_eq!(truncate_name("abc", 6), "abc");
    }

    #[test]
    fn stats_report_thresholds() {
        let records = vec![record("001", 20.0, 1.0), record("002", 80.0, 3.0)];
        let text = render_stats(&history_stats(&records));
        assert!(text.contains("agents: 2"));
        assert!(text.contains("avg 50.0% | min 20.0% | max 80.0%"));
        assert!(text.contains("avg latency: 2.00s"));
        assert!(text.contains("functional (>= 30%): 1"));
        assert!(text.contains("high performance (>= 70%): 1"));
    }

    #[test]
    fn record_view_lists_trials_and_load_error() {
        let mut rec = record_with_load_error("005", 0.0);
        rec.testing_stats.all_runs_summary = vec![TrialDigest {
            run: 1,
            accuracy: 0.0,
            avg_time: 0.0,
            errors: 2,
        }];
        let text = render_record(&rec);
        assert!(text.starts_with("#005 agent-005 (generated_pipeline)"));
        assert!(text.contains("run 1: accuracy 0.0%, avg 0.00s, 2 errors"));
        assert!(text.contains("load error: SyntaxError: invalid syntax"));
    }
}
