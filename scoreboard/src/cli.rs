//! CLI command implementations.

use std::path::Path;

use anyhow::{Result, bail};
use tracing::debug;

use metagen::core::ids::parse_agent_id;
use metagen::core::record::AgentRecord;
use metagen::core::stats::history_stats;
use metagen::io::history_store::HistoryStore;

use crate::report::{render_record, render_stats, render_top};

fn load(history: &Path) -> Vec<AgentRecord> {
    let records = HistoryStore::new(history).load();
    debug!(path = %history.display(), records = records.len(), "history loaded");
    records
}

pub fn top(history: &Path, n: usize) -> Result<()> {
    let records = load(history);
    if records.is_empty() {
        println!("no agents in {}", history.display());
        return Ok(());
    }
    print!("{}", render_top(&records, n));
    Ok(())
}

pub fn stats(history: &Path) -> Result<()> {
    print!("{}", render_stats(&history_stats(&load(history))));
    Ok(())
}

pub fn show(history: &Path, agent_id: &str) -> Result<()> {
    let records = load(history);
    match find_record(&records, agent_id) {
        Some(record) => {
            print!("{}", render_record(record));
            Ok(())
        }
        None => bail!("agent {} not found in {}", agent_id, history.display()),
    }
}

/// Exact id match first, then numeric (`4` finds `004`).
pub fn find_record<'a>(records: &'a [AgentRecord], agent_id: &str) -> Option<&'a AgentRecord> {
    records
        .iter()
        .find(|record| record.agent_id == agent_id)
        .or_else(|| {
            let wanted = parse_agent_id(agent_id);
            (wanted > 0)
                .then(|| {
                    records
                        .iter()
                        .find(|record| parse_agent_id(&record.agent_id) == wanted)
                })
                .flatten()
        })
}
