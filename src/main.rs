#![recursion_limit = "256"]

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use drone_pursuit::ai::algorithms::DqnAgent;
use drone_pursuit::ai::{Agent, RandomAgent};
use drone_pursuit::checkpoint::{CheckpointManager, CheckpointManagerConfig};
use drone_pursuit::config::AppConfig;
use drone_pursuit::sim::{Frame, StrategyKind};
use drone_pursuit::training::trainer::Trainer;

/// Run greedy pursuit episodes and report the outcome of each.
#[derive(Parser)]
#[command(name = "drone-pursuit", about = "Evaluate a drone pursuit policy")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Checkpoint directory to load; defaults to the latest checkpoint
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Steer with a uniformly random policy instead of a trained one
    #[arg(long, conflicts_with = "checkpoint")]
    random: bool,

    /// Number of evaluation episodes
    #[arg(long, default_value_t = 10)]
    episodes: usize,

    /// Chaser strategy: simple_pursuit, flocking_wander or learned_policy
    #[arg(long)]
    strategy: Option<StrategyKind>,

    /// Seed for the simulation
    #[arg(long)]
    seed: Option<u64>,

    /// Write one JSON frame per tick to this file
    #[arg(long)]
    frames: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut app_config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if let Some(strategy) = cli.strategy {
        app_config.chaser.strategy = strategy;
    }
    if let Some(seed) = cli.seed {
        app_config.training.seed = Some(seed);
    }

    let params = app_config.sim_params();
    let checkpoint_config = CheckpointManagerConfig {
        checkpoint_dir: app_config.training.checkpoint_dir.clone(),
        ..app_config.checkpoint.clone()
    };

    let mut agent: Box<dyn Agent> = if cli.random {
        Box::new(match app_config.training.seed {
            Some(seed) => RandomAgent::with_seed(params.action_dim(), seed),
            None => RandomAgent::new(params.action_dim()),
        })
    } else {
        let mut dqn = DqnAgent::new(
            app_config.dqn.clone(),
            params.observation_dim(),
            params.action_dim(),
        );
        load_policy(&mut dqn, cli.checkpoint.as_ref(), &checkpoint_config)?;
        Box::new(dqn)
    };

    let trainer = Trainer::new(
        app_config.training.clone(),
        params,
        app_config.reward.clone(),
        checkpoint_config,
    );

    let mut writer = match &cli.frames {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => None,
    };
    let mut write_err = None;

    println!(
        "Evaluating {} with strategy {} for {} episodes",
        agent.name(),
        app_config.chaser.strategy.name(),
        cli.episodes
    );
    let on_frame = |episode: usize, frame: &Frame| {
        let Some(w) = writer.as_mut() else { return };
        if write_err.is_some() {
            return;
        }
        let line = serde_json::json!({ "episode": episode, "frame": frame });
        if let Err(e) = writeln!(w, "{}", line) {
            write_err = Some(e);
        }
    };
    let results = trainer
        .evaluate_episodes(Some(agent.as_mut() as &mut dyn Agent), cli.episodes, on_frame)
        .context("evaluation failed")?;

    if let Some(e) = write_err {
        return Err(e).context("writing frames");
    }
    if let Some(mut w) = writer {
        w.flush().context("flushing frames")?;
    }

    let mut captures = 0;
    for (i, m) in results.iter().enumerate() {
        let outcome = if m.capture_success == 1 { "capture" } else { "timeout" };
        println!(
            "Episode {:>3}: {:<7} steps {:>4}  reward {:>9.2}  explored {:>5.1}%  switches {}",
            i + 1,
            outcome,
            m.steps,
            m.total_reward,
            m.explored_percentage * 100.0,
            m.mode_switches
        );
        captures += m.capture_success as usize;
    }
    if !results.is_empty() {
        println!(
            "Capture rate: {}/{} ({:.1}%)",
            captures,
            results.len(),
            captures as f32 / results.len() as f32 * 100.0
        );
    }
    Ok(())
}

/// Load weights from `dir` or, without one, from the latest checkpoint.
/// Falls back to the untrained network when nothing has been saved yet.
fn load_policy(
    agent: &mut DqnAgent,
    dir: Option<&PathBuf>,
    config: &CheckpointManagerConfig,
) -> Result<()> {
    let manager = CheckpointManager::new(config.clone());
    match dir {
        Some(dir) => {
            let meta = manager
                .load_checkpoint(dir, agent)
                .with_context(|| format!("loading checkpoint {}", dir.display()))?;
            println!("Loaded checkpoint from episode {}", meta.episode);
        }
        None => match manager
            .resume_latest(agent)
            .context("loading latest checkpoint")?
        {
            Some(meta) => println!("Loaded latest checkpoint (episode {})", meta.episode),
            None => println!("No checkpoint found, using an untrained network"),
        },
    }
    Ok(())
}
