use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use supercut::contracts::validate::ArtifactKind;
use supercut::pipeline::RunOptions;
use supercut::planner::BeatGridPlanner;

#[derive(Parser)]
#[command(name = "supercut", version, about = "Beat-synced montage pipeline")]
struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    ClipAnalysis,
    MusicAnalysis,
    Timeline,
}

impl KindArg {
    fn kind(&self) -> ArtifactKind {
        match self {
            Self::ClipAnalysis => ArtifactKind::ClipAnalysis,
            Self::MusicAnalysis => ArtifactKind::MusicAnalysis,
            Self::Timeline => ArtifactKind::Timeline,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run all four montage phases in one command
    Run {
        /// Clip files or directories to cut from (directories are walked)
        #[arg(long, num_args = 1.., required = true)]
        clips: Vec<PathBuf>,

        /// Music track the montage is cut to
        #[arg(long)]
        music: PathBuf,

        /// Run directory (defaults to a fresh timestamped directory)
        #[arg(long)]
        run_dir: Option<PathBuf>,

        /// Rendered montage filename (inside the run directory unless absolute)
        #[arg(long, default_value = "final.mp4")]
        output: PathBuf,

        /// Accept legacy field names from older analyzer builds
        #[arg(long)]
        planner_compat_mode: bool,
    },

    /// Validate a pipeline artifact against its schema
    Validate {
        /// Which artifact the file claims to be
        #[arg(value_enum)]
        kind: KindArg,

        /// Path to the JSON artifact
        path: PathBuf,

        /// Relax the check: ignore schema_version, accept legacy field names
        #[arg(long)]
        lenient: bool,
    },

    /// Print the JSON schema descriptor for an artifact
    Schema {
        /// Which artifact to describe
        #[arg(value_enum)]
        kind: KindArg,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    match cli.command {
        Commands::Run {
            clips,
            music,
            run_dir,
            output,
            planner_compat_mode,
        } => {
            // Load config file (optional, defaults if missing)
            let config = supercut::config::AppConfig::load();

            let clips = supercut::pipeline::inputs::collect_clips(&clips);
            if clips.is_empty() {
                anyhow::bail!("No clip files found in the given --clips arguments.");
            }

            // Resolve run directory: CLI > fresh timestamped default
            let run_dir = run_dir.unwrap_or_else(|| config.fresh_run_dir());

            let opts = RunOptions {
                clips,
                music,
                run_dir,
                output,
                compat_mode: planner_compat_mode,
            };
            let manifest = supercut::pipeline::run_pipeline(opts, &config.stages, &BeatGridPlanner)
                .context("Pipeline run failed")?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }

        Commands::Validate { kind, path, lenient } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            let payload: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?;
            supercut::contracts::validate::validate(kind.kind(), &payload, !lenient)
                .with_context(|| format!("{} failed validation", path.display()))?;
            let mode = if lenient { "lenient" } else { "strict" };
            println!("{}: valid {} ({} mode)", path.display(), kind.kind(), mode);
        }

        Commands::Schema { kind } => {
            let desc = supercut::contracts::validate::descriptor(kind.kind());
            println!("{}", serde_json::to_string_pretty(&desc)?);
        }
    }

    Ok(())
}
