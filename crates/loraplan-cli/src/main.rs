//! loraplan CLI - LoRA inspection and schedule resolution
//!
//! A front end over `LoraEngine` for checking what the engine makes of a
//! set of LoRA files and schedules.

use clap::{Parser, Subcommand};
use loraplan_core::{ArchitectureTag, UnknownTagError};
use loraplan_pipeline::{EngineConfig, LoraEngine};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

/// loraplan - LoRA architecture detection and schedule resolution
#[derive(Parser)]
#[command(name = "loraplan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Extra LoRA search root, searched before the configured ones
    #[arg(short, long = "root", global = true)]
    roots: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the architecture of a LoRA file
    Detect {
        /// LoRA file, or a name to look up in the search roots
        target: String,

        /// Ignore cached results
        #[arg(long)]
        force: bool,

        /// Refine generic SDXL into its lineage from weight statistics
        #[arg(long)]
        lineage: bool,
    },

    /// Compute weight statistics
    Stats {
        /// LoRA files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Architecture to assume instead of detecting it
        #[arg(short, long, value_parser = parse_arch)]
        arch: Option<ArchitectureTag>,
    },

    /// Parse schedule text and print it in canonical form
    Parse {
        /// Schedule text, or `-` to read stdin
        input: String,
    },

    /// Resolve schedule sources into an activation plan
    Resolve {
        /// Structured schedule file (JSON)
        #[arg(short, long)]
        schedule: Option<PathBuf>,

        /// Schedule text
        #[arg(short, long)]
        text: Option<String>,

        /// Schedule text resolved first and passed in as the prior plan
        #[arg(short, long)]
        prior: Option<String>,
    },

    /// Print the UI configuration document
    Presets,
}

fn parse_arch(value: &str) -> Result<ArchitectureTag, UnknownTagError> {
    value.parse()
}

fn build_engine(
    config: Option<PathBuf>,
    roots: Vec<PathBuf>,
) -> Result<LoraEngine, Box<dyn std::error::Error>> {
    let config = match config {
        Some(path) => EngineConfig::from_file(&path)?,
        None => EngineConfig::default(),
    };

    // Command-line roots go first, in the order given
    let config = roots.into_iter().rev().fold(config, EngineConfig::with_root);
    Ok(LoraEngine::new(config))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let engine = build_engine(cli.config, cli.roots)?;

    match cli.command {
        Commands::Detect {
            target,
            force,
            lineage,
        } => {
            commands::detect::run(&engine, &target, force, lineage);
        }

        Commands::Stats { paths, arch } => {
            commands::stats::run(&engine, paths, arch).await?;
        }

        Commands::Parse { input } => {
            commands::parse::run(&input)?;
        }

        Commands::Resolve {
            schedule,
            text,
            prior,
        } => {
            commands::resolve::run(
                &engine,
                schedule.as_deref(),
                text.as_deref(),
                prior.as_deref(),
            )?;
        }

        Commands::Presets => {
            commands::presets::run()?;
        }
    }

    Ok(())
}
