use brer::directory;
use brer::engine::CommandEngine;
use brer::history::HistoryLedger;
use brer::pair_data::{DistributionResampler, MultiPair};
use brer::run_config::{RunConfig, RunSettings};
use brer::run_data::RunData;
use brer::BrerError;
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "brer")]
#[command(about = "Drive BRER training/convergence/production steps for one ensemble member", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the next phase step of a member
    Run(RunArgs),
    /// Print a member's state document
    Show {
        #[arg(long, env = "BRER_ENSEMBLE_DIR")]
        ensemble_dir: PathBuf,
        #[arg(long, env = "BRER_ENSEMBLE_NUM", default_value_t = 1)]
        ensemble_num: u32,
    },
    /// Merge the history of member state documents into a shared history file
    MergeHistory {
        /// Shared history file, created if missing
        #[arg(long)]
        into: PathBuf,
        /// Member state documents (mem_<n>/state.json)
        #[arg(required = true)]
        states: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Top directory containing every ensemble member
    #[arg(long, env = "BRER_ENSEMBLE_DIR")]
    ensemble_dir: PathBuf,
    #[arg(long, env = "BRER_ENSEMBLE_NUM", default_value_t = 1)]
    ensemble_num: u32,
    #[arg(long, env = "BRER_WORK_SAMPLE", default_value_t = 1)]
    work_sample: u32,
    /// Metadata for every restrained pair
    #[arg(long, env = "BRER_PAIRS_JSON", default_value = "pair_data.json")]
    pairs_json: PathBuf,
    /// Run input file, or a directory to pick a random *.tpr from
    #[arg(long, env = "BRER_TPR")]
    tpr: PathBuf,
    /// Engine command; receives the phase request as JSON on stdin
    #[arg(long, env = "BRER_ENGINE")]
    engine: String,
    /// General parameter override, e.g. --set A=100 (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_override)]
    overrides: Vec<(String, String)>,
    /// Ensemble-wide history file merged in before and written back after the step
    #[arg(long, env = "BRER_HISTORY")]
    history: Option<PathBuf>,
    /// Seed for target resampling and topology choice
    #[arg(long, env = "BRER_SEED")]
    seed: Option<u64>,
    /// Also log to a file (defaults to brer<ensemble_num>.log)
    #[arg(long, num_args = 0..=1)]
    log_file: Option<Option<PathBuf>>,
}

fn parse_override(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn choose_topology(path: &Path, rng: &mut StdRng) -> Result<PathBuf, BrerError> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }
    let mut candidates: Vec<PathBuf> = fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|ext| ext == "tpr").unwrap_or(false))
        .collect();
    candidates.sort();
    candidates
        .choose(rng)
        .cloned()
        .ok_or_else(|| BrerError::Configuration(format!("no .tpr files in {}", path.display())))
}

fn run(args: RunArgs) -> Result<(), BrerError> {
    let log_file = args
        .log_file
        .map(|path| path.unwrap_or_else(|| PathBuf::from(format!("brer{}.log", args.ensemble_num))));
    brer::init_tracing(log_file.as_deref())?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    // Only matters when a phase starts fresh; a resumed checkpoint pins the system
    let topology = choose_topology(&args.tpr, &mut rng)?;

    let pairs = MultiPair::read_from_json(&args.pairs_json)?;
    let resampler = DistributionResampler::new(&pairs, args.seed)?;
    let engine = CommandEngine::from_command_line(&args.engine)?;
    let settings = RunSettings {
        topology,
        ensemble_dir: args.ensemble_dir,
        ensemble_num: args.ensemble_num,
        work_sample: args.work_sample,
    };

    let mut config = RunConfig::new(settings, &pairs, engine, resampler)?;
    config.apply_overrides(&args.overrides)?;

    if let Some(history_path) = &args.history {
        let shared = HistoryLedger::load(history_path)?;
        let added = config.merge_history(&shared)?;
        info!(added, path = %history_path.display(), "merged ensemble history");
    }

    let next = config.run()?;
    info!(next_phase = %next, "step finished");

    if let Some(history_path) = &args.history {
        let added = config.history().merge_into_file(history_path)?;
        info!(added, path = %history_path.display(), "updated ensemble history");
    }
    Ok(())
}

fn main() -> Result<(), BrerError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Show { ensemble_dir, ensemble_num } => {
            let data = RunData::load(&directory::state_path(&ensemble_dir, ensemble_num))?;
            println!("{}", serde_json::to_string_pretty(&data.as_dictionary()?)?);
            Ok(())
        }
        Commands::MergeHistory { into, states } => {
            for state in &states {
                let data = RunData::load(state)?;
                let added = data.history().merge_into_file(&into)?;
                println!("[brer] {}: {} new entries", state.display(), added);
            }
            println!("[brer] {} now holds {} entries", into.display(), HistoryLedger::load(&into)?.len());
            Ok(())
        }
    }
}
