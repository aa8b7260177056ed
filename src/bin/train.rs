#![recursion_limit = "256"]

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use drone_pursuit::ai::algorithms::DqnAgent;
use drone_pursuit::checkpoint::{CheckpointManager, CheckpointManagerConfig};
use drone_pursuit::config::AppConfig;
use drone_pursuit::sim::StrategyKind;
use drone_pursuit::training::trainer::Trainer;

/// Train the chaser swarm's DQN pursuit policy.
#[derive(Parser)]
#[command(name = "train", about = "Train the drone pursuit DQN policy")]
struct Cli {
    /// Resume training from the latest checkpoint
    #[arg(long)]
    resume: bool,

    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override number of training episodes
    #[arg(long)]
    episodes: Option<usize>,

    /// Override learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Seed for the simulation and the agent
    #[arg(long)]
    seed: Option<u64>,

    /// Chaser strategy: simple_pursuit, flocking_wander or learned_policy
    #[arg(long)]
    strategy: Option<StrategyKind>,

    /// Write the default configuration to stdout and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", AppConfig::default_toml().context("serializing default config")?);
        return Ok(());
    }

    // Load configuration
    let mut app_config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    // Apply CLI overrides
    if let Some(episodes) = cli.episodes {
        app_config.training.num_episodes = episodes;
    }
    if let Some(lr) = cli.lr {
        app_config.dqn.learning_rate = lr;
    }
    if let Some(seed) = cli.seed {
        app_config.training.seed = Some(seed);
    }
    if let Some(strategy) = cli.strategy {
        app_config.chaser.strategy = strategy;
    }
    app_config.validate().context("validating config overrides")?;

    let params = app_config.sim_params();
    let mut agent = match app_config.training.seed {
        Some(seed) => DqnAgent::with_seed(
            app_config.dqn.clone(),
            params.observation_dim(),
            params.action_dim(),
            seed,
        ),
        None => DqnAgent::new(
            app_config.dqn.clone(),
            params.observation_dim(),
            params.action_dim(),
        ),
    };

    let checkpoint_config = CheckpointManagerConfig {
        checkpoint_dir: app_config.training.checkpoint_dir.clone(),
        ..app_config.checkpoint.clone()
    };
    if cli.resume {
        let manager = CheckpointManager::new(checkpoint_config.clone());
        match manager
            .resume_latest(&mut agent)
            .context("resuming from latest checkpoint")?
        {
            Some(meta) => println!(
                "Resumed from episode {} (epsilon {:.3})",
                meta.episode,
                agent.epsilon()
            ),
            None => println!("No checkpoint found, starting fresh"),
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    spawn_quit_listener(Arc::clone(&stop));

    let eval_episodes = app_config.training.eval_episodes;
    let trainer = Trainer::new(
        app_config.training.clone(),
        params,
        app_config.reward.clone(),
        checkpoint_config,
    );
    println!(
        "Training {} episodes with strategy {} (type 'q' + Enter to stop)",
        app_config.training.num_episodes,
        app_config.chaser.strategy.name()
    );

    let summary = trainer.train(&mut agent, &stop).context("training failed")?;

    println!();
    println!("Episodes completed: {}", summary.episodes_completed);
    if summary.interrupted {
        println!("Stopped early on request");
    }
    println!("Capture rate (last window): {:.1}%", summary.capture_rate * 100.0);
    println!("Final epsilon: {:.4}", agent.epsilon());
    println!("Training steps: {}", agent.step_count());
    if let Some(path) = &summary.last_checkpoint {
        println!("Last checkpoint: {}", path.display());
    }

    if !summary.interrupted && eval_episodes > 0 {
        let rate = trainer
            .evaluate(&mut agent, eval_episodes)
            .context("evaluation failed")?;
        println!(
            "Greedy capture rate over {} episodes: {:.1}%",
            eval_episodes,
            rate * 100.0
        );
    }

    Ok(())
}

/// Set `stop` when a line starting with `q` arrives on stdin.
fn spawn_quit_listener(stop: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) if l.trim_start().starts_with('q') => {
                    stop.store(true, Ordering::Relaxed);
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });
}
