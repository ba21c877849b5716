//! Longform CLI — the main entry point.
//!
//! Commands:
//! - `onboard`   — Initialize config
//! - `generate`  — Generate long-form learning material on a topic
//! - `providers` — List supported providers
//! - `doctor`    — Diagnose config and provider health

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use longform_generator::Level;

mod commands;

#[derive(Parser)]
#[command(
    name = "longform",
    about = "Longform — continuation-bounded long document generation",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Generate a document on a topic
    Generate(GenerateArgs),

    /// List supported LLM providers
    Providers {
        /// Also ask the configured provider which models it serves
        #[arg(long)]
        models: bool,
    },

    /// Diagnose config and provider health
    Doctor,
}

#[derive(clap::Args)]
pub struct GenerateArgs {
    /// Topic of the document (also the seed text)
    #[arg(short, long)]
    pub topic: String,

    /// Audience level: beginner, intermediate or advanced
    #[arg(short, long, default_value = "beginner")]
    pub level: Level,

    /// Target length in characters (0 = no limit, <= 300 = overview)
    #[arg(long, default_value_t = 1000)]
    pub length: usize,

    /// Override the model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Override the provider (name, or `custom:<base url>`)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Override the round cap
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Override the prompt window, in characters
    #[arg(long)]
    pub window: Option<usize>,

    /// Directory to write the artifact to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Prepend the seed text to the saved artifact
    #[arg(long)]
    pub include_seed: bool,

    /// Stream only, do not write an artifact
    #[arg(long)]
    pub no_save: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so the streamed document on stdout stays clean
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Generate(args) => commands::generate::run(args).await?,
        Commands::Providers { models } => commands::providers::run(models).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
