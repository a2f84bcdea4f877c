use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "lathe")]
#[command(version, about = "AI-powered 3D asset pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build, verify and assemble an asset from a prompt
    Run {
        /// Natural-language description of the asset
        prompt: String,
        /// Override the per-component and per-attachment attempt budget
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Plan only: print the component decomposition for a prompt
    Plan {
        prompt: String,
    },
    /// Summarize the most recent run
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_filter = if cli.verbose { "lathe=debug" } else { "lathe=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    match &cli.command {
        Commands::Run { prompt, max_attempts } => {
            cmd::run::execute(&cli, &project_dir, prompt, *max_attempts).await
        }
        Commands::Plan { prompt } => cmd::run::plan_only(&project_dir, prompt).await,
        Commands::Status => cmd::status::execute(&project_dir),
    }
}
