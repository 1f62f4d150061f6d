//! Reelcut CLI: the command-line interface for the edit plan render engine.
//!
//! Usage:
//!   reelcut validate <PLAN> --source <VIDEO>     Validate a plan against a recording
//!   reelcut plan <PLAN> --duration <SECS>        Show the compiled timeline
//!   reelcut render <PLAN> --source <VIDEO> -o <OUT>
//!   reelcut check                                Check for ffmpeg/ffprobe

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reelcut_common::config::EngineConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "reelcut",
    about = "Render timestamped edit plans into finished tutorial videos",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Engine config file (defaults to $XDG_CONFIG_HOME/reelcut/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an edit plan (and optional narration) against a source
    Validate {
        #[command(flatten)]
        job: commands::JobArgs,
    },

    /// Print the compiled segments, transitions, overlays and cue placements
    Plan {
        #[command(flatten)]
        job: commands::JobArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Render a plan to a finished video
    Render(commands::render::RenderArgs),

    /// Check that the external tools needed for rendering are available
    Check {
        /// ffmpeg binary to look for
        #[arg(long, default_value = "ffmpeg")]
        ffmpeg: String,

        /// ffprobe binary to look for
        #[arg(long, default_value = "ffprobe")]
        ffprobe: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    reelcut_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Validate { job } => commands::validate::run(&config, job).await,
        Commands::Plan { job, json } => commands::plan::run(&config, job, json).await,
        Commands::Render(args) => commands::render::run(config, args).await,
        Commands::Check { ffmpeg, ffprobe } => commands::check::run(&config, &ffmpeg, &ffprobe),
    }
}
