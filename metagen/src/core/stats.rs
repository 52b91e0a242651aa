//! Trial reduction and history-wide statistics.

use crate::core::record::{AgentRecord, PerformanceSummary, TrialResult};

/// Reduce trials into mean, population standard deviation, and range.
///
/// An empty slice yields an all-zero summary.
pub fn summarize_trials(trials: &[TrialResult]) -> PerformanceSummary {
    if trials.is_empty() {
        return PerformanceSummary::default();
    }
    let accuracies: Vec<f64> = trials.iter().map(|trial| trial.accuracy).collect();
    let latencies: Vec<f64> = trials
        .iter()
        .map(|trial| trial.avg_execution_time)
        .collect();

    let successful_runs = trials.iter().filter(|trial| trial.is_clean()).count();

    PerformanceSummary {
        accuracy: mean(&accuracies),
        accuracy_std: population_std(&accuracies),
        accuracy_range: range(&accuracies),
        avg_execution_time: mean(&latencies),
        time_std: population_std(&latencies),
        time_range: range(&latencies),
        successful_runs: successful_runs as u32,
        total_runs: trials.len() as u32,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values
        .iter()
        .map(|value| (value - avg).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

fn range(values: &[f64]) -> [f64; 2] {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if values.is_empty() {
        [0.0, 0.0]
    } else {
        [min, max]
    }
}

/// Accuracy at or above which a record counts as functional in statistics.
pub const FUNCTIONAL_ACCURACY: f64 = 30.0;
/// Accuracy at or above which a record counts as high performance.
pub const HIGH_PERFORMANCE_ACCURACY: f64 = 70.0;

/// Aggregate view over the whole history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryStats {
    pub total_agents: usize,
    pub avg_accuracy: f64,
    pub max_accuracy: f64,
    pub min_accuracy: f64,
    pub avg_execution_time: f64,
    pub functional_agents: usize,
    pub high_performance_agents: usize,
}

pub fn history_stats(records: &[AgentRecord]) -> HistoryStats {
    if records.is_empty() {
        return HistoryStats::default();
    }
    let accuracies: Vec<f64> = records.iter().map(AgentRecord::accuracy).collect();
    let latencies: Vec<f64> = records.iter().map(AgentRecord::avg_latency).collect();
    let [min_accuracy, max_accuracy] = range(&accuracies);
    HistoryStats {
        total_agents: records.len(),
        avg_accuracy: mean(&accuracies),
        max_accuracy,
        min_accuracy,
        avg_execution_time: mean(&latencies),
        functional_agents: accuracies
            .iter()
            .filter(|acc| **acc >= FUNCTIONAL_ACCURACY)
            .count(),
        high_performance_agents: accuracies
            .iter()
            .filter(|acc| **acc >= HIGH_PERFORMANCE_ACCURACY)
            .count(),
    }
}
