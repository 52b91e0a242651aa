mod cli;
mod report;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "scoreboard",
    version,
    about = "Read-only reports over a metagen history file"
)]
struct Cli {
    /// History file written by `metagen run`.
    #[arg(long, global = true, default_value = "agent_history.json")]
    history: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Best agents by accuracy, then latency.
    Top {
        #[arg(short, default_value_t = 10)]
        n: usize,
    },
    /// Aggregate statistics over the whole history.
    Stats,
    /// One record with its per-trial summary.
    Show { agent_id: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(metagen::logging::DEFAULT_FILTER)),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Top { n } => cli::top(&cli.history, n),
        Command::Stats => cli::stats(&cli.history),
        Command::Show { agent_id } => cli::show(&cli.history, &agent_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_defaults_to_ten() {
        let cli = Cli::parse_from(["scoreboard", "top"]);
        assert!(matches!(cli.command, Command::Top { n: 10 }));
        assert_eq!(cli.history, PathBuf::from("agent_history.json"));
    }

    #[test]
    fn show_takes_id_and_history() {
        let cli = Cli::parse_from(["scoreboard", "show", "004", "--history", "h.json"]);
        assert!(matches!(cli.command, Command::Show { ref agent_id } if agent_id == "004"));
        assert_eq!(cli.history, PathBuf::from("h.json"));
    }
}
