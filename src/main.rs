mod app;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use match_core::config::{Difficulty, MatchConfig};

/// Ply cap when neither the command line nor the config sets one
const DEFAULT_MAX_MOVES: u32 = 200;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Strength {
    Novice,
    Standard,
    Full,
}

impl From<Strength> for Difficulty {
    fn from(strength: Strength) -> Self {
        match strength {
            Strength::Novice => Difficulty::Novice,
            Strength::Standard => Difficulty::Standard,
            Strength::Full => Difficulty::Full,
        }
    }
}

/// Play an engine-vs-engine chess match without a UI
#[derive(Parser, Debug)]
#[command(name = "match-runner", version)]
struct Args {
    /// Engine strength for white
    #[arg(long, value_enum, default_value_t = Strength::Standard)]
    white: Strength,

    /// Engine strength for black
    #[arg(long, value_enum, default_value_t = Strength::Novice)]
    black: Strength,

    /// Search depth for both engines
    #[arg(long)]
    depth: Option<u32>,

    /// Draw the match after this many plies [default: from the config, else 200]
    #[arg(long)]
    max_moves: Option<u32>,

    /// UCI engine binary for `full` strength (overrides CHESS_ENGINE_PATH)
    #[arg(long)]
    engine_path: Option<PathBuf>,

    /// Match configuration as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Starting position
    #[arg(long)]
    fen: Option<String>,

    /// Seed for the novice engine
    #[arg(long)]
    seed: Option<u64>,

    /// Write the match record here
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Continue a saved match record instead of starting a new match
    #[arg(long, conflicts_with = "config")]
    resume: Option<PathBuf>,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    print_schema: bool,
}

fn load_config(args: &Args) -> Result<MatchConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            MatchConfig::from_json(&text)
                .with_context(|| format!("invalid configuration in {}", path.display()))?
        }
        None => MatchConfig::default(),
    }
    .with_env_overrides();

    if let Some(path) = &args.engine_path {
        config.engine.uci_path = Some(path.clone());
    }
    if let Some(depth) = args.depth {
        config.engine.search_depth = depth;
    }
    if let Some(fen) = &args.fen {
        config.start_fen = Some(fen.clone());
    }
    if args.seed.is_some() {
        config.engine.novice_seed = args.seed;
    }
    config.max_moves = args.max_moves.or(config.max_moves).or(Some(DEFAULT_MAX_MOVES));
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let args = Args::parse();

    if args.print_schema {
        println!("{}", MatchConfig::json_schema());
        return Ok(());
    }

    let config = load_config(&args)?;
    let record = app::run(app::RunOptions {
        config,
        white: args.white.into(),
        black: args.black.into(),
        output: args.output.clone(),
        resume: args.resume.clone(),
    })?;

    println!("{:?} after {} plies", record.result, record.moves.len());
    Ok(())
}
