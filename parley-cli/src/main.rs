//! Parley command-line entry point

use clap::Parser;
use parley_cli::commands::{Commands, ListCommands};

/// Ensemble language detection for chat messages
#[derive(Debug, Parser)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Detect(args) => args.execute(),
        Commands::Converse(args) => args.execute(),
        Commands::List { subcommand } => match subcommand {
            ListCommands::Backends => parley_cli::commands::list::backends(),
            ListCommands::Strategies => parley_cli::commands::list::strategies(),
        },
    }
}
