mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "epigraph",
    version,
    about = "Gateway replaying sequential data files into a graph store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace); overrides the config
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway: acquisition, replay, and the HTTP façade
    Run {
        /// Path to the YAML config file
        #[arg(long, default_value = "epigraph.yaml")]
        config: PathBuf,
    },
    /// Validate configuration, storage, and graph connectivity
    Check {
        /// Path to the YAML config file
        #[arg(long, default_value = "epigraph.yaml")]
        config: PathBuf,
    },
    /// Delete an expert's replay checkpoint so it replays from scratch
    ResetExpert {
        /// Path to the YAML config file
        #[arg(long, default_value = "epigraph.yaml")]
        config: PathBuf,
        /// Expert whose checkpoint to drop
        expert: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => commands::run::execute(&config, cli.log_level.as_deref()).await,
        Commands::Check { config } => {
            commands::check::execute(&config, cli.log_level.as_deref()).await
        }
        Commands::ResetExpert { config, expert } => {
            commands::reset::execute(&config, cli.log_level.as_deref(), &expert)
        }
    }
}
