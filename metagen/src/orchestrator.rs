//! One generate → evaluate → persist cycle.

use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use anyhow::Result;

use crate::core::record::{AgentConfig, AgentRecord, TestingStats, TrialDigest};
use crate::core::response::parse_candidate;
use crate::core::types::{CandidateSpec, ProblemSpec};
use crate::curator::Curator;
use crate::io::completion::{CompletionClient, CompletionRequest};
use crate::io::config::{CurationConfig, MetagenConfig};
use crate::io::history_store::HistoryStore;
use crate::io::pipeline_host::PipelineHost;
use crate::io::prompt::{GenerationInputs, PromptBuilder, PromptPair};
use crate::io::sandbox::CaseRunner;
use crate::pipeline::{PipelineEvaluation, PipelineEvaluator};

/// `config.type` of records produced by the generator.
pub const GENERATED_KIND: &str = "generated_pipeline";
/// `config.type` of hand-written candidates.
pub const MANUAL_KIND: &str = "manual_pipeline";
/// Name given to the placeholder candidate when a response cannot be parsed.
pub const PARSE_ERROR_NAME: &str = "generation_parse_error";

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The candidate was evaluated and appended to history.
    Evaluated { record: AgentRecord },
    /// No candidate could be obtained. Nothing was appended.
    GenerationFailed {
        error: String,
        /// Placeholder whose `source_code` holds the raw response, when there was one.
        candidate: Option<CandidateSpec>,
    },
}

impl CycleOutcome {
    pub fn success(&self) -> bool {
        matches!(self, CycleOutcome::Evaluated { .. })
    }
}

/// Generation-side settings.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub model: String,
    pub temperature: f64,
    pub trials: u32,
    pub entry_function: String,
    pub available_models: Vec<String>,
    pub prompt_budget_bytes: usize,
    pub curation: CurationConfig,
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &MetagenConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            trials: cfg.trials,
            entry_function: cfg.pipeline.entry_function.clone(),
            available_models: cfg.available_models.clone(),
            prompt_budget_bytes: cfg.prompt_budget_bytes,
            curation: cfg.curation.clone(),
        }
    }
}

/// Wires the collaborators of one cycle together.
pub struct Orchestrator<'a, C: ?Sized, H: ?Sized, R: ?Sized> {
    pub completion: &'a C,
    pub host: &'a H,
    pub runner: &'a R,
    pub store: &'a HistoryStore,
    pub catalog: &'a [ProblemSpec],
    pub settings: OrchestratorSettings,
}

impl<C, H, R> Orchestrator<'_, C, H, R>
where
    C: CompletionClient + ?Sized,
    H: PipelineHost + ?Sized,
    R: CaseRunner + ?Sized,
{
    /// System and user prompts for `task`, conditioned on the current history.
    pub fn build_prompt<G: Rng + ?Sized>(&self, task: &str, rng: &mut G) -> Result<PromptPair> {
        let history = self.store.load();
        let curated = Curator::new(self.settings.curation.clone()).curate(&history, rng);
        PromptBuilder::new(self.settings.prompt_budget_bytes).build(&GenerationInputs {
            task: task.to_string(),
            entry_function: self.settings.entry_function.clone(),
            available_models: self.settings.available_models.clone(),
            functional: curated.functional,
            exemplar: curated.exemplar,
            non_functional: curated.non_functional,
        })
    }

    /// Generate a candidate for `task`, evaluate it, and append it to history.
    ///
    /// Completion and parse failures come back as
    /// [`CycleOutcome::GenerationFailed`]. `Err` means evaluation or
    /// persistence infrastructure failed.
    #[instrument(skip_all, fields(model = %self.settings.model))]
    pub fn create_and_evaluate<G: Rng + ?Sized>(
        &self,
        task: &str,
        rng: &mut G,
    ) -> Result<CycleOutcome> {
        let prompt = self.build_prompt(task, rng)?;
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            system_prompt: prompt.system,
            user_prompt: prompt.user,
        };

        let raw = match self.completion.complete(&request) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "completion failed");
                return Ok(CycleOutcome::GenerationFailed {
                    error: format!("{err:#}"),
                    candidate: None,
                });
            }
        };

        let candidate = match parse_candidate(&raw) {
            Ok(candidate) => candidate,
            Err(failure) => {
                warn!(reason = %failure.reason, "unparseable generation response");
                return Ok(CycleOutcome::GenerationFailed {
                    error: failure.reason.clone(),
                    candidate: Some(CandidateSpec {
                        name: PARSE_ERROR_NAME.to_string(),
                        rationale: failure.reason,
                        source_code: failure.raw,
                    }),
                });
            }
        };

        info!(name = %candidate.name, "candidate generated");
        let record = self.evaluate_candidate(&candidate, GENERATED_KIND)?;
        Ok(CycleOutcome::Evaluated { record })
    }

    /// Evaluate `candidate` and append the resulting record.
    #[instrument(skip_all, fields(name = %candidate.name, kind))]
    pub fn evaluate_candidate(&self, candidate: &CandidateSpec, kind: &str) -> Result<AgentRecord> {
        let evaluation = PipelineEvaluator::new(
            self.host,
            self.runner,
            self.catalog,
            self.settings.trials,
        )
        .evaluate(&candidate.source_code)?;
        let record = build_record(candidate, kind, evaluation);
        self.store.append(record)
    }
}

/// Assemble an un-numbered record; the store assigns the id.
pub fn build_record(
    candidate: &CandidateSpec,
    kind: &str,
    evaluation: PipelineEvaluation,
) -> AgentRecord {
    let PipelineEvaluation {
        summary,
        trials,
        load_failure,
    } = evaluation;

    let narrative = match &load_failure {
        Some(failure) => format!(
            "{}\n\nFailed to load: {}: {}",
            candidate.rationale.trim(),
            failure.error_type,
            failure.error_message
        ),
        None => format!(
            "{}\n\nTested {} times with {} clean runs. Mean accuracy {:.1}%.",
            candidate.rationale.trim(),
            summary.total_runs,
            summary.successful_runs,
            summary.accuracy
        ),
    };

    AgentRecord {
        agent_id: String::new(),
        name: candidate.name.clone(),
        creation_timestamp: chrono::Utc::now().to_rfc3339(),
        config: AgentConfig {
            kind: kind.to_string(),
            code: candidate.source_code.clone(),
            description: candidate.rationale.clone(),
            source_sha256: hex::encode(Sha256::digest(candidate.source_code.as_bytes())),
        },
        testing_stats: TestingStats {
            successful_runs: summary.successful_runs,
            total_runs: summary.total_runs,
            all_runs_summary: trials.iter().map(TrialDigest::from_trial).collect(),
        },
        performance: summary,
        narrative,
        detailed_results: trials,
        load_error: load_failure,
    }
}
