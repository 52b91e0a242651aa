//! Deterministic ranking and exemplar selection over history.
//!
//! The only source of nondeterminism is the caller-supplied RNG used for the
//! single diversity pick, so tests can seed it.

use std::cmp::Ordering;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::core::record::AgentRecord;

/// Accuracy below which a record is surfaced as a negative example.
pub const NON_FUNCTIONAL_ACCURACY: f64 = 30.0;

/// Order by accuracy descending, then average latency ascending.
pub fn by_accuracy_then_latency(left: &AgentRecord, right: &AgentRecord) -> Ordering {
    right
        .accuracy()
        .total_cmp(&left.accuracy())
        .then_with(|| left.avg_latency().total_cmp(&right.avg_latency()))
}

/// All records ranked best first.
pub fn rank_records(records: &[AgentRecord]) -> Vec<&AgentRecord> {
    let mut ranked: Vec<&AgentRecord> = records.iter().collect();
    ranked.sort_by(|left, right| by_accuracy_then_latency(left, right));
    ranked
}

/// A record chosen as a positive exemplar.
#[derive(Debug, Clone, Copy)]
pub struct Exemplar<'a> {
    pub record: &'a AgentRecord,
    /// True for the single record drawn at random from outside the top N.
    pub diversity_pick: bool,
}

/// Top `top_n` records with accuracy > 0, plus one random record from the rest.
pub fn select_functional<'a, R: Rng + ?Sized>(
    records: &'a [AgentRecord],
    top_n: usize,
    rng: &mut R,
) -> Vec<Exemplar<'a>> {
    let mut functional: Vec<&AgentRecord> = records
        .iter()
        .filter(|record| record.accuracy() > 0.0)
        .collect();
    functional.sort_by(|left, right| by_accuracy_then_latency(left, right));

    let split = top_n.min(functional.len());
    let (top, remainder) = functional.split_at(split);
    let mut selected: Vec<Exemplar<'a>> = top
        .iter()
        .copied()
        .map(|record| Exemplar {
            record,
            diversity_pick: false,
        })
        .collect();
    if let Some(&record) = remainder.choose(rng) {
        selected.push(Exemplar {
            record,
            diversity_pick: true,
        });
    }
    selected
}

/// Whether a record qualifies as a negative example.
pub fn is_non_functional(record: &AgentRecord) -> bool {
    record.accuracy() < NON_FUNCTIONAL_ACCURACY || record.load_error.is_some()
}

/// The `max_n` most recent non-functional records, in chronological order.
pub fn select_non_functional(records: &[AgentRecord], max_n: usize) -> Vec<&AgentRecord> {
    let matching: Vec<&AgentRecord> = records
        .iter()
        .filter(|record| is_non_functional(record))
        .collect();
    let skip = matching.len().saturating_sub(max_n);
    matching.into_iter().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record, record_with_load_error};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ids(records: &[&AgentRecord]) -> Vec<String> {
        records.iter().map(|r| r.agent_id.clone()).collect()
    }

    #[test]
    fn ties_break_on_latency() {
        let history = vec![
            record("001", 80.0, 3.0),
            record("002", 90.0, 5.0),
            record("003", 80.0, 1.0),
        ];
        assert_eq!(ids(&rank_records(&history)), vec!["002", "003", "001"]);
    }

    #[test]
    fn functional_excludes_zero_accuracy_and_adds_one_random() {
        let history = vec![
            record("001", 0.0, 1.0),
            record("002", 60.0, 1.0),
            record("003", 70.0, 1.0),
            record("004", 80.0, 1.0),
            record("005", 40.0, 1.0),
            record("006", 20.0, 1.0),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        let selected = select_functional(&history, 3, &mut rng);

        assert_eq!(selected.len(), 4);
        let top: Vec<&str> = selected[..3]
            .iter()
            .map(|e| e.record.agent_id.as_str())
            .collect();
        assert_eq!(top, vec!["004", "003", "002"]);
        assert!(selected[3].diversity_pick);
        assert!(["005", "006"].contains(&selected[3].record.agent_id.as_str()));
        assert!(selected.iter().all(|e| e.record.accuracy() > 0.0));
    }

    #[test]
    fn functional_without_remainder_has_no_random_pick() {
        let history = vec![record("001", 50.0, 1.0), record("002", 0.0, 1.0)];
        let mut rng = StdRng::seed_from_u64(1);
        let selected = select_functional(&history, 3, &mut rng);
        assert_eq!(selected.len(), 1);
        assert!(!selected[0].diversity_pick);
    }

    #[test]
    fn non_functional_includes_low_accuracy_and_load_errors() {
        let history = vec![
            record("001", 29.9, 1.0),
            record("002", 30.0, 1.0),
            record_with_load_error("003", 95.0),
            record("004", 100.0, 1.0),
        ];
        let selected = select_non_functional(&history, 5);
        assert_eq!(ids(&selected), vec!["001", "003"]);
        assert!(
            selected
                .iter()
                .all(|r| r.accuracy() < 30.0 || r.load_error.is_some())
        );
    }

    #[test]
    fn non_functional_keeps_most_recent() {
        let history: Vec<AgentRecord> = (1..=7)
            .map(|i| record(&format!("{i:03}"), 0.0, 1.0))
            .collect();
        let selected = select_non_functional(&history, 3);
        assert_eq!(ids(&selected), vec!["005", "006", "007"]);
    }
}
