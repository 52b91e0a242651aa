//! Few-shot example curation over the history.
//!
//! Pure: reads records and returns rendered text blocks for the generation
//! prompt. The only randomness is the caller's RNG for the diversity pick.

use std::fmt::Write as _;

use rand::Rng;

use crate::core::classifier::classify_record;
use crate::core::excerpts::error_excerpts;
use crate::core::record::AgentRecord;
use crate::core::selector::{select_functional, select_non_functional};
use crate::io::config::CurationConfig;

/// Rendered examples ready for the prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CuratedExamples {
    /// Top records, best first.
    pub functional: Vec<String>,
    /// One record drawn at random from outside the top.
    pub exemplar: Option<String>,
    pub non_functional: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Curator {
    cfg: CurationConfig,
}

impl Curator {
    pub fn new(cfg: CurationConfig) -> Self {
        Self { cfg }
    }

    pub fn curate<R: Rng + ?Sized>(&self, history: &[AgentRecord], rng: &mut R) -> CuratedExamples {
        let (functional, exemplar) = self.functional_examples(history, rng);
        CuratedExamples {
            functional,
            exemplar,
            non_functional: self.non_functional_examples(history),
        }
    }

    pub fn functional_examples<R: Rng + ?Sized>(
        &self,
        history: &[AgentRecord],
        rng: &mut R,
    ) -> (Vec<String>, Option<String>) {
        let mut functional = Vec::new();
        let mut exemplar = None;
        for pick in select_functional(history, self.cfg.top_n, rng) {
            let block = render_functional(pick.record);
            if pick.diversity_pick {
                exemplar = Some(block);
            } else {
                functional.push(block);
            }
        }
        (functional, exemplar)
    }

    pub fn non_functional_examples(&self, history: &[AgentRecord]) -> Vec<String> {
        select_non_functional(history, self.cfg.max_non_functional)
            .into_iter()
            .map(|record| self.render_non_functional(record))
            .collect()
    }

    pub fn render_non_functional(&self, record: &AgentRecord) -> String {
        let mut out = format!(
            "### {} (id {}) - failed\nAccuracy: {:.1}%\nFailure class: {}\n",
            record.name,
            record.agent_id,
            record.accuracy(),
            classify_record(record).label()
        );

        let excerpts = error_excerpts(
            record,
            self.cfg.max_error_excerpts,
            self.cfg.max_excerpt_chars,
        );
        if !excerpts.lines.is_empty() {
            out.push_str("Errors observed:\n");
            for (idx, line) in excerpts.lines.iter().enumerate() {
                let _ = writeln!(out, "{}. {}", idx + 1, line);
            }
            if excerpts.omitted > 0 {
                let _ = writeln!(out, "... and {} more", excerpts.omitted);
            }
        }

        if let Some(load) = &record.load_error {
            let _ = write!(
                out,
                "Load error ({}):\n```\n{}\n```\nOffending source:\n```python\n{}\n```\n",
                load.error_type,
                load.error_message.trim(),
                load.problematic_code.trim()
            );
        }

        let _ = write!(
            out,
            "Notes: {}\nConfig that did not work:\n{}",
            record.narrative.trim(),
            config_json(record)
        );
        out
    }
}

/// Compact block describing a functional record.
pub fn render_functional(record: &AgentRecord) -> String {
    format!(
        "### {} (id {})\nAccuracy: {:.1}% | Avg latency: {:.2}s | Clean trials: {}/{}\nNotes: {}\nConfig:\n{}",
        record.name,
        record.agent_id,
        record.accuracy(),
        record.avg_latency(),
        record.performance.successful_runs,
        record.performance.total_runs,
        record.narrative.trim(),
        config_json(record)
    )
}

fn config_json(record: &AgentRecord) -> String {
    serde_json::to_string_pretty(&record.config).unwrap_or_else(|_| record.config.code.clone())
}
