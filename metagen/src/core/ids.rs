//! Agent id assignment.

use crate::core::record::AgentRecord;

/// Minimum number of digits in a formatted id.
pub const ID_WIDTH: usize = 3;

/// Numeric value of an id; non-numeric ids count as zero.
pub fn parse_agent_id(id: &str) -> u64 {
    id.trim().parse().unwrap_or(0)
}

pub fn format_agent_id(value: u64) -> String {
    format!("{value:0width$}", width = ID_WIDTH)
}

/// `max(existing) + 1`, or `001` for an empty history.
pub fn next_agent_id(records: &[AgentRecord]) -> String {
    let max = records
        .iter()
        .map(|record| parse_agent_id(&record.agent_id))
        .max()
        .unwrap_or(0);
    format_agent_id(max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;

    #[test]
    fn empty_history_starts_at_one() {
        assert_eq!(next_agent_id(&[]), "001");
    }

    #[test]
    fn uses_max_not_last() {
        let history = vec![
            record("007", 1.0, 1.0),
            record("003", 1.0, 1.0),
            record("bogus", 1.0, 1.0),
        ];
        assert_eq!(next_agent_id(&history), "008");
    }

    #[test]
    fn widens_past_three_digits() {
        assert_eq!(format_agent_id(1234), "1234");
        assert_eq!(parse_agent_id("0042"), 42);
    }
}
