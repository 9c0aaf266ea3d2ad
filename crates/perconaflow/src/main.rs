mod commands;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "perconaflow")]
#[command(about = "Percona clusters on AWS and GCP, declared in KDL", long_about = None)]
struct Cli {
    /// Cluster file (default: discovered from the current directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the cluster described by the cluster file
    Create,
    /// Delete everything a previous create made
    Destroy {
        /// ResourceID printed by create
        #[arg(long)]
        id: String,
    },
    /// Check the cluster file
    Validate,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs on stderr; stdout carries the JSON outputs
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    match cli.command {
        Commands::Version => {
            println!("perconaflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Validate => commands::validate::handle(cli.config.as_deref()),
        Commands::Create => commands::create::handle(cli.config.as_deref()).await,
        Commands::Destroy { id } => commands::destroy::handle(cli.config.as_deref(), &id).await,
    }
}
