//! CLI for gambit.
//!
//! Drives a persisted [`Coordinator`] from the terminal: the interactive play
//! loop, editing the choice set, inspecting tallies, offline simulations and
//! significance queries for two-choice experiments.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use gambit_bandits::{Coordinator, CoordinatorConfig, StrategyConfig};
use gambit_core::LeverSummary;
use gambit_significance::{
    GraphPadClient, LocalChiSquare, SignificanceService, DEFAULT_ENDPOINT,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const DEFAULT_STATE: &str = "data/gambit.state.json";
const SIGNIFICANCE_URL_ENV: &str = "GAMBIT_SIGNIFICANCE_URL";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show recommendations and count a success whenever the typed line matches
    Play {
        /// Path to the state file
        #[arg(long, default_value = DEFAULT_STATE)]
        state: PathBuf,

        /// Choice to add if missing (repeatable); adding restarts the experiment
        #[arg(long = "choice")]
        choices: Vec<String>,

        #[command(flatten)]
        strategy: StrategyArgs,

        /// Minimum seconds between automatic saves
        #[arg(long, default_value = "5")]
        autosave_secs: u64,

        /// Stop after this many recommendations (default: until EOF)
        #[arg(long)]
        rounds: Option<u64>,
    },
    /// Add a choice
    Add {
        /// Path to the state file
        #[arg(long, default_value = DEFAULT_STATE)]
        state: PathBuf,

        #[command(flatten)]
        strategy: StrategyArgs,

        value: String,
    },
    /// Remove a choice by id
    Remove {
        /// Path to the state file
        #[arg(long, default_value = DEFAULT_STATE)]
        state: PathBuf,

        id: Uuid,
    },
    /// Zero all tallies and statistics and issue new choice ids
    Reset {
        /// Path to the state file
        #[arg(long, default_value = DEFAULT_STATE)]
        state: PathBuf,
    },
    /// Print choices, tallies and per-lever statistics
    Show {
        /// Path to the state file
        #[arg(long, default_value = DEFAULT_STATE)]
        state: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Run a strategy against Bernoulli arms with known success probabilities
    Simulate {
        #[command(flatten)]
        strategy: StrategyArgs,

        /// Success probability per arm, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        probs: Vec<f64>,

        /// Number of recommendations
        #[arg(long, default_value = "1000")]
        rounds: u64,

        /// Seed for the strategy and the simulated rewards
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Two-tailed chi-square p-value for a two-choice experiment
    Significance {
        /// Path to the state file
        #[arg(long, default_value = DEFAULT_STATE)]
        state: PathBuf,

        /// Compute locally instead of asking the online calculator
        #[arg(long)]
        offline: bool,
    },
}

#[derive(Args, Debug, Clone)]
struct StrategyArgs {
    /// Strategy used when a new state is created [default: epsilon-greedy]
    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,

    /// Strategy tunable (epsilon, alpha, temperature, ...)
    #[arg(long)]
    param: Option<f64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum StrategyKind {
    PureLuck,
    EpsilonGreedy,
    EpsilonDecreasing,
    EpsilonFirst,
    LeastTaken,
    IntervalEstimation,
    GaussMatch,
    Poker,
    SoftMax,
    SoftMix,
    Exp3,
}

impl StrategyKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::PureLuck => "pure_luck",
            Self::EpsilonGreedy => "epsilon_greedy",
            Self::EpsilonDecreasing => "epsilon_decreasing",
            Self::EpsilonFirst => "epsilon_first",
            Self::LeastTaken => "least_taken",
            Self::IntervalEstimation => "interval_estimation",
            Self::GaussMatch => "gauss_match",
            Self::Poker => "poker",
            Self::SoftMax => "soft_max",
            Self::SoftMix => "soft_mix",
            Self::Exp3 => "exp3",
        }
    }
}

impl StrategyArgs {
    fn kind(&self) -> StrategyKind {
        self.strategy.unwrap_or(StrategyKind::EpsilonGreedy)
    }

    fn to_config(&self) -> Result<StrategyConfig> {
        let name = self.kind().as_str();
        StrategyConfig::from_name(name, self.param)
            .with_context(|| format!("Invalid strategy {name}"))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn format_epoch(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string())
}

fn format_ratio(ratio: Option<f64>) -> String {
    ratio.map_or_else(|| "n/a".to_string(), |r| format!("{r:.4}"))
}

fn load_state(path: &Path, strategy: Option<&StrategyArgs>) -> Result<Coordinator<String>> {
    let mut config = CoordinatorConfig::default();
    if let Some(args) = strategy {
        config.strategy = args.to_config()?;
    }
    let wanted = config.strategy;
    let bandit = Coordinator::load_or(path, config)
        .with_context(|| format!("Failed to load state from {}", path.display()))?;
    let explicit = strategy.is_some_and(|args| args.strategy.is_some());
    if explicit && bandit.config().strategy != wanted {
        tracing::warn!(
            stored = bandit.strategy_name(),
            "state file keeps its stored strategy, --strategy only applies to new state"
        );
    }
    Ok(bandit)
}

fn save_state(bandit: &Coordinator<String>, path: &Path) -> Result<()> {
    bandit
        .save(path)
        .with_context(|| format!("Failed to save state to {}", path.display()))
}

/// Console harness: one recommendation per input line.
fn run_play<R: BufRead, W: Write>(
    bandit: &Coordinator<String>,
    state: &Path,
    input: R,
    out: &mut W,
    autosave: Duration,
    rounds: Option<u64>,
) -> Result<()> {
    let mut last_save: Option<Instant> = None;
    let mut lines = input.lines();
    let mut played = 0u64;

    while rounds.map_or(true, |max| played < max) {
        if last_save.map_or(true, |t| t.elapsed() >= autosave) {
            // autosave failures are logged by the coordinator and not fatal here
            if bandit.save(state).is_ok() {
                last_save = Some(Instant::now());
            }
        }

        let shown = bandit.get_next().context("No recommendation available")?;
        writeln!(out, "Result: {}", shown.value())?;
        out.flush()?;
        played += 1;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("Failed to read input")?;
        if line.trim_end_matches('\r') == shown.value() {
            bandit.succeeded(&shown)?;
        }
    }

    for (i, choice) in bandit.choices().iter().enumerate() {
        writeln!(
            out,
            "Choice {} ({}) - Success: {}, Failure: {}, Total: {}, Ratio {}",
            i + 1,
            choice.value(),
            choice.success(),
            choice.failure(),
            choice.total(),
            format_ratio(choice.ratio()),
        )?;
    }
    save_state(bandit, state)
}

#[derive(Serialize)]
struct ChoiceView {
    id: Uuid,
    value: String,
    total: u64,
    success: u64,
    failure: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    ratio: Option<f64>,
}

#[derive(Serialize)]
struct StateView {
    name: String,
    strategy: StrategyConfig,
    epoch_start: String,
    choices: Vec<ChoiceView>,
    levers: Vec<LeverSummary>,
}

fn state_view(bandit: &Coordinator<String>) -> StateView {
    StateView {
        name: bandit.name(),
        strategy: bandit.config().strategy,
        epoch_start: format_epoch(bandit.epoch_start()),
        choices: bandit
            .choices()
            .iter()
            .map(|c| ChoiceView {
                id: c.id(),
                value: c.value().clone(),
                total: c.total(),
                success: c.success(),
                failure: c.failure(),
                ratio: c.ratio(),
            })
            .collect(),
        levers: bandit.lever_summaries(),
    }
}

fn print_view<W: Write>(view: &StateView, out: &mut W) -> Result<()> {
    writeln!(out, "{} ({}), epoch since {}", view.name, view.strategy.name(), view.epoch_start)?;
    if view.choices.is_empty() {
        writeln!(out, "no choices")?;
        return Ok(());
    }
    for (choice, lever) in view.choices.iter().zip(&view.levers) {
        writeln!(
            out,
            "{}  {:<20} shown {:>6}  success {:>6}  ratio {:>6}  mean {:.4}",
            choice.id,
            choice.value,
            choice.total,
            choice.success,
            format_ratio(choice.ratio),
            lever.mean.unwrap_or(0.0),
        )?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
struct ArmResult {
    probability: f64,
    shown: u64,
    success: u64,
}

fn simulate(
    strategy: StrategyConfig,
    probs: &[f64],
    rounds: u64,
    seed: Option<u64>,
) -> Result<Vec<ArmResult>> {
    if probs.is_empty() {
        bail!("At least one arm probability is required");
    }
    if let Some(p) = probs.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        bail!("Arm probability {p} is outside [0, 1]");
    }

    let config = CoordinatorConfig {
        name: "simulation".to_string(),
        horizon: u32::try_from(rounds).unwrap_or(u32::MAX),
        seed,
        ..CoordinatorConfig::with_strategy(strategy)
    };
    let bandit = Coordinator::new(config)?;
    for arm in 0..probs.len() {
        bandit.add_choice(arm);
    }
    let mut rewards = match seed {
        Some(s) => StdRng::seed_from_u64(s.wrapping_add(1)),
        None => StdRng::from_entropy(),
    };

    for _ in 0..rounds {
        let shown = bandit.get_next()?;
        if rewards.gen::<f64>() < probs[*shown.value()] {
            bandit.succeeded(&shown)?;
        }
    }

    Ok(bandit
        .choices()
        .iter()
        .map(|c| ArmResult {
            probability: probs[*c.value()],
            shown: c.total(),
            success: c.success(),
        })
        .collect())
}

fn significance_service(offline: bool) -> Result<Box<dyn SignificanceService>> {
    if offline {
        return Ok(Box::new(LocalChiSquare::default()));
    }
    let endpoint = env::var(SIGNIFICANCE_URL_ENV).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
    let client = GraphPadClient::with_endpoint(endpoint)
        .context("Failed to build significance client")?;
    Ok(Box::new(client))
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Play {
            state,
            choices,
            strategy,
            autosave_secs,
            rounds,
        } => {
            let bandit = load_state(&state, Some(&strategy))?;
            for value in choices {
                if !bandit.choices().iter().any(|c| *c.value() == value) {
                    bandit.add_choice(value);
                }
            }
            if bandit.is_empty() {
                bail!("No choices yet; pass --choice or use `gambit add`");
            }
            let stdin = io::stdin();
            run_play(
                &bandit,
                &state,
                stdin.lock(),
                &mut out,
                Duration::from_secs(autosave_secs),
                rounds,
            )?;
        }
        Commands::Add {
            state,
            strategy,
            value,
        } => {
            let bandit = load_state(&state, Some(&strategy))?;
            let choice = bandit.add_choice(value);
            save_state(&bandit, &state)?;
            writeln!(out, "{}", choice.id())?;
        }
        Commands::Remove { state, id } => {
            let bandit = load_state(&state, None)?;
            if bandit.remove_choice(id).is_none() {
                bail!("No choice with id {id}");
            }
            save_state(&bandit, &state)?;
        }
        Commands::Reset { state } => {
            let bandit = load_state(&state, None)?;
            bandit.reset_stats();
            save_state(&bandit, &state)?;
        }
        Commands::Show { state, json } => {
            let bandit = load_state(&state, None)?;
            let view = state_view(&bandit);
            if json {
                serde_json::to_writer_pretty(&mut out, &view)?;
                writeln!(out)?;
            } else {
                print_view(&view, &mut out)?;
            }
        }
        Commands::Simulate {
            strategy,
            probs,
            rounds,
            seed,
        } => {
            let config = strategy.to_config()?;
            let arms = simulate(config, &probs, rounds, seed)?;
            writeln!(out, "strategy {} over {rounds} rounds", config.name())?;
            let mut rewards = 0;
            for (i, arm) in arms.iter().enumerate() {
                writeln!(
                    out,
                    "arm {i}  p={:.3}  shown {:>8}  success {:>8}",
                    arm.probability, arm.shown, arm.success
                )?;
                rewards += arm.success;
            }
            writeln!(out, "total successes {rewards}")?;
        }
        Commands::Significance { state, offline } => {
            let bandit = load_state(&state, None)?;
            let service = significance_service(offline)?;
            match bandit.significance_p(service.as_ref()) {
                Some(p) => writeln!(out, "p = {p:.4}")?,
                None => writeln!(
                    out,
                    "p-value unavailable: needs exactly two choices with successes and failures on both"
                )?,
            }
        }
    }

    Ok(())
}
