//! Self-improving pipeline generator.
//!
//! Generates candidate multi-agent pipelines with a language model, scores
//! them against a benchmark catalog, and keeps an append-only history that
//! conditions future generations.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;

use metagen::core::types::CandidateSpec;
use metagen::exit_codes;
use metagen::io::catalog::load_catalog;
use metagen::io::completion::CommandCompletion;
use metagen::io::config::{CONFIG_FILE, MetagenConfig, init_config, load_config};
use metagen::io::history_store::{HistoryStore, PersistenceError};
use metagen::io::pipeline_host::{ProcessHostSettings, ProcessPipelineHost};
use metagen::io::sandbox::Sandbox;
use metagen::looping::run_loop;
use metagen::orchestrator::{MANUAL_KIND, Orchestrator, OrchestratorSettings};

#[derive(Parser)]
#[command(
    name = "metagen",
    version,
    about = "Self-improving generator of multi-agent problem-solving pipelines"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Generate and evaluate candidates for a number of iterations.
    Run {
        /// Task statement embedded in every generation prompt.
        #[arg(long)]
        task: String,
        #[arg(long, default_value_t = 1)]
        iterations: u32,
        /// Seed for the diversity pick among functional examples.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Evaluate a hand-written pipeline and append it to history.
    Evaluate {
        #[arg(long)]
        name: String,
        /// Pipeline source file.
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        description: Option<String>,
    },
    /// Print the prompts the next generation would send, without calling the model.
    Prompt {
        #[arg(long)]
        task: String,
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() {
    metagen::logging::init();
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{:#}", err);
            if err.downcast_ref::<PersistenceError>().is_some() {
                exit_codes::PERSISTENCE
            } else {
                exit_codes::INVALID
            }
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => {
            init_config(&cli.config, force)?;
            println!("wrote {}", cli.config.display());
            Ok(())
        }
        Command::Run {
            task,
            iterations,
            seed,
        } => cmd_run(&cli.config, &task, iterations, seed),
        Command::Evaluate {
            name,
            source,
            description,
        } => cmd_evaluate(&cli.config, name, &source, description),
        Command::Prompt { task, seed } => cmd_prompt(&cli.config, &task, seed),
    }
}

fn load_resolved(path: &Path) -> Result<MetagenConfig> {
    let mut cfg = load_config(path)?;
    let base = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    cfg.resolve_paths(base);
    Ok(cfg)
}

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Collaborators built from config, borrowed by the orchestrator.
struct Wiring {
    completion: CommandCompletion,
    host: ProcessPipelineHost,
    sandbox: Sandbox,
    store: HistoryStore,
    catalog: Vec<metagen::core::types::ProblemSpec>,
    settings: OrchestratorSettings,
}

impl Wiring {
    fn from_config(cfg: &MetagenConfig) -> Result<Self> {
        Ok(Self {
            completion: CommandCompletion::from_config(&cfg.completion),
            host: ProcessPipelineHost::new(ProcessHostSettings::from_config(cfg)),
            sandbox: Sandbox::from_config(&cfg.sandbox)?,
            store: HistoryStore::new(&cfg.history_path),
            catalog: load_catalog(&cfg.catalog_path).context("load problem catalog")?,
            settings: OrchestratorSettings::from_config(cfg),
        })
    }

    fn orchestrator(
        &self,
    ) -> Orchestrator<'_, CommandCompletion, ProcessPipelineHost, Sandbox> {
        Orchestrator {
            completion: &self.completion,
            host: &self.host,
            runner: &self.sandbox,
            store: &self.store,
            catalog: &self.catalog,
            settings: self.settings.clone(),
        }
    }
}

fn cmd_run(config: &Path, task: &str, iterations: u32, seed: Option<u64>) -> Result<()> {
    let cfg = load_resolved(config)?;
    let wiring = Wiring::from_config(&cfg)?;
    let mut rng = rng(seed);

    let outcome = run_loop(&wiring.orchestrator(), task, iterations, &mut rng, |report| {
        println!("{}", report.summary_line());
    })?;
    println!(
        "{} of {} iterations produced evaluated candidates",
        outcome.evaluated, outcome.iterations_run
    );
    Ok(())
}

fn cmd_evaluate(
    config: &Path,
    name: String,
    source: &Path,
    description: Option<String>,
) -> Result<()> {
    let cfg = load_resolved(config)?;
    let wiring = Wiring::from_config(&cfg)?;
    let source_code =
        fs::read_to_string(source).with_context(|| format!("read {}", source.display()))?;
    let candidate = CandidateSpec {
        name,
        rationale: description.unwrap_or_else(|| "Hand-written pipeline.".to_string()),
        source_code,
    };

    let record = wiring
        .orchestrator()
        .evaluate_candidate(&candidate, MANUAL_KIND)?;
    match &record.load_error {
        Some(load) => println!(
            "#{} {}: failed to load ({}: {})",
            record.agent_id, record.name, load.error_type, load.error_message
        ),
        None => println!(
            "#{} {}: accuracy {:.1}% (±{:.1}), latency {:.2}s, {}/{} clean",
            record.agent_id,
            record.name,
            record.performance.accuracy,
            record.performance.accuracy_std,
            record.performance.avg_execution_time,
            record.performance.successful_runs,
            record.performance.total_runs
        ),
    }
    Ok(())
}

fn cmd_prompt(config: &Path, task: &str, seed: Option<u64>) -> Result<()> {
    let cfg = load_resolved(config)?;
    let wiring = Wiring::from_config(&cfg)?;
    let prompt = wiring.orchestrator().build_prompt(task, &mut rng(seed))?;
    println!("=== system ===\n{}\n\n=== user ===\n{}", prompt.system, prompt.user);
    Ok(())
}
