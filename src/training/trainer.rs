use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::ai::{Agent, RewardConfig, TrainableAgent};
use crate::checkpoint::{CheckpointManager, CheckpointManagerConfig, CheckpointMetrics};
use crate::error::TrainingError;
use crate::sim::{Coordinator, Frame, SimParams};
use crate::training::metrics::{EpisodeMetrics, MetricsLogger, TrainingMetrics};

/// Offset mixed into the seed for evaluation runs so they do not replay the
/// training episodes.
const EVAL_SEED_OFFSET: u64 = 0x5eed;

/// Trainer configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub num_episodes: usize,
    pub max_steps: usize,
    pub log_interval: usize,
    pub checkpoint_interval: usize,
    /// Greedy episodes run by [`Trainer::evaluate`] after training.
    pub eval_episodes: usize,
    pub checkpoint_dir: PathBuf,
    pub metrics_dir: PathBuf,
    pub seed: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            num_episodes: 1000,
            max_steps: 1000,
            log_interval: 10,
            checkpoint_interval: 50,
            eval_episodes: 10,
            checkpoint_dir: PathBuf::from("checkpoints"),
            metrics_dir: PathBuf::from("logs"),
            seed: None,
        }
    }
}

/// How a training run ended.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub episodes_completed: usize,
    pub interrupted: bool,
    /// Capture rate over the last log window.
    pub capture_rate: f32,
    pub last_checkpoint: Option<PathBuf>,
}

struct EpisodeRun {
    metrics: EpisodeMetrics,
    losses: Vec<f32>,
    interrupted: bool,
}

/// Runs pursuit episodes against a learning agent.
pub struct Trainer {
    config: TrainerConfig,
    params: SimParams,
    reward: RewardConfig,
    checkpoint_manager: CheckpointManager,
}

impl Trainer {
    pub fn new(
        config: TrainerConfig,
        params: SimParams,
        reward: RewardConfig,
        checkpoint: CheckpointManagerConfig,
    ) -> Self {
        let checkpoint_manager = CheckpointManager::new(CheckpointManagerConfig {
            checkpoint_dir: config.checkpoint_dir.clone(),
            ..checkpoint
        });
        Trainer {
            config,
            params,
            reward,
            checkpoint_manager,
        }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    fn rng(&self, offset: u64) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(offset)),
            None => StdRng::from_os_rng(),
        }
    }

    /// Run the full training loop. `stop` is checked between ticks; an
    /// interrupted episode is discarded and the run ends with a final
    /// checkpoint. Checkpoint and metrics write failures abort training.
    pub fn train<A: TrainableAgent>(
        &self,
        agent: &mut A,
        stop: &AtomicBool,
    ) -> Result<TrainingSummary, TrainingError> {
        let mut world = Coordinator::new(self.params.clone(), self.reward.clone(), self.rng(0))?;
        let mut metrics = TrainingMetrics::new();
        let mut logger = MetricsLogger::new();
        let window = self.config.log_interval.max(1);

        let start_episode = agent.episode_count() + 1;
        let end_episode = agent.episode_count() + self.config.num_episodes;
        info!(
            algorithm = agent.algorithm_name(),
            strategy = self.params.chaser.strategy.name(),
            start_episode,
            end_episode,
            "starting training"
        );

        let mut completed = 0;
        let mut last_episode = None;
        let mut last_checkpoint = None;
        let mut checkpointed_episode = None;
        let mut interrupted = false;

        for episode in start_episode..=end_episode {
            if episode > start_episode {
                world.reset()?;
            }
            let run = self.run_episode(
                &mut world,
                Some(&mut *agent as &mut dyn Agent),
                true,
                stop,
                |_| {},
            );
            if run.interrupted {
                interrupted = true;
                info!(episode, "stop requested, discarding partial episode");
                break;
            }

            for loss in &run.losses {
                metrics.record_update(*loss);
            }
            agent.end_episode();
            metrics.record_episode(run.metrics.clone());
            logger.log_episode(episode, run.metrics);
            completed += 1;
            last_episode = Some(episode);

            if episode % window == 0 {
                info!(
                    episode,
                    epsilon = agent.epsilon(),
                    avg_reward = metrics.average_reward(window),
                    capture_rate = metrics.capture_rate(window),
                    avg_steps = metrics.average_steps(window),
                    explored = metrics.average_explored(window),
                    loss = metrics.average_loss(window),
                    "training progress"
                );
            }

            if self.config.checkpoint_interval > 0 && episode % self.config.checkpoint_interval == 0 {
                last_checkpoint = Some(self.checkpoint(agent, &metrics, window, episode)?);
                checkpointed_episode = Some(episode);
                logger.save(&MetricsLogger::snapshot_path(&self.config.metrics_dir, episode))?;
            }
        }

        if let Some(episode) = last_episode {
            if checkpointed_episode != Some(episode) {
                last_checkpoint = Some(self.checkpoint(agent, &metrics, window, episode)?);
            }
            logger.save(&self.config.metrics_dir.join("metrics_final.json"))?;
        }

        info!(completed, interrupted, "training finished");
        Ok(TrainingSummary {
            episodes_completed: completed,
            interrupted,
            capture_rate: metrics.capture_rate(window),
            last_checkpoint,
        })
    }

    fn checkpoint<A: TrainableAgent>(
        &self,
        agent: &A,
        metrics: &TrainingMetrics,
        window: usize,
        episode: usize,
    ) -> Result<PathBuf, TrainingError> {
        let ckpt_metrics = CheckpointMetrics {
            capture_rate: metrics.capture_rate(window),
            average_reward: metrics.average_reward(window),
            average_steps: metrics.average_steps(window),
            explored_percentage: metrics.average_explored(window),
            current_loss: metrics.average_loss(window),
            training_steps: agent.step_count(),
        };
        Ok(self
            .checkpoint_manager
            .save_agent_checkpoint(agent, &ckpt_metrics, episode)?)
    }

    /// Play one episode until capture, `max_steps` or a stop request.
    /// `on_tick` sees the world after every tick.
    fn run_episode<F: FnMut(&Coordinator)>(
        &self,
        world: &mut Coordinator,
        mut agent: Option<&mut dyn Agent>,
        training: bool,
        stop: &AtomicBool,
        mut on_tick: F,
    ) -> EpisodeRun {
        let mut metrics = EpisodeMetrics::default();
        let mut q_values = Vec::new();
        let mut losses = Vec::new();
        let mut interrupted = false;

        for step in 0..self.config.max_steps {
            if stop.load(Ordering::Relaxed) {
                interrupted = true;
                break;
            }
            let outcome = world.tick(agent.as_mut().map(|a| &mut **a as &mut dyn Agent), training);
            on_tick(world);

            metrics.total_reward += outcome.total_reward();
            metrics.steps = step + 1;
            metrics.mode_switches += outcome.mode_switches;
            q_values.extend_from_slice(&outcome.q_values);
            losses.extend(outcome.loss);

            if outcome.capture.is_some() {
                metrics.capture_success = 1;
                break;
            }
        }

        metrics.explored_percentage = world.explored_fraction();
        if !q_values.is_empty() {
            metrics.avg_q_value = q_values.iter().sum::<f32>() / q_values.len() as f32;
        }
        EpisodeRun {
            metrics,
            losses,
            interrupted,
        }
    }

    /// Run `episodes` greedy episodes without storing or training, calling
    /// `on_frame` with the render snapshot after every tick.
    pub fn evaluate_episodes<F: FnMut(usize, &Frame)>(
        &self,
        mut agent: Option<&mut dyn Agent>,
        episodes: usize,
        mut on_frame: F,
    ) -> Result<Vec<EpisodeMetrics>, TrainingError> {
        let never = AtomicBool::new(false);
        let mut world = Coordinator::new(
            self.params.clone(),
            self.reward.clone(),
            self.rng(EVAL_SEED_OFFSET),
        )?;

        let mut results = Vec::with_capacity(episodes);
        for episode in 0..episodes {
            if episode > 0 {
                world.reset()?;
            }
            let run = self.run_episode(
                &mut world,
                agent.as_mut().map(|a| &mut **a as &mut dyn Agent),
                false,
                &never,
                |w| on_frame(episode, &w.frame()),
            );
            results.push(run.metrics);
        }
        Ok(results)
    }

    /// Greedy capture rate over `episodes` episodes. Exploration is switched
    /// off for the duration and restored afterwards, even on error.
    pub fn evaluate<A: TrainableAgent>(
        &self,
        agent: &mut A,
        episodes: usize,
    ) -> Result<f32, TrainingError> {
        if episodes == 0 {
            return Ok(0.0);
        }
        let saved = agent.enter_eval_mode();
        let results = self.evaluate_episodes(Some(&mut *agent as &mut dyn Agent), episodes, |_, _| {});
        agent.exit_eval_mode(saved);

        let results = results?;
        let captures = results.iter().filter(|m| m.capture_success == 1).count();
        Ok(captures as f32 / episodes as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::algorithms::{DqnAgent, DqnConfig};
    use crate::sim::{ArenaConfig, StrategyKind};

    fn small_agent(params: &SimParams) -> DqnAgent {
        let config = DqnConfig {
            batch_size: 8,
            replay_capacity: 256,
            hidden_size: 16,
            ..Default::default()
        };
        DqnAgent::with_seed(config, params.observation_dim(), params.action_dim(), 17)
    }

    fn trainer(dir: &std::path::Path, episodes: usize, params: SimParams) -> Trainer {
        let config = TrainerConfig {
            num_episodes: episodes,
            max_steps: 15,
            log_interval: 1,
            checkpoint_interval: 2,
            eval_episodes: 1,
            checkpoint_dir: dir.join("checkpoints"),
            metrics_dir: dir.join("logs"),
            seed: Some(42),
        };
        Trainer::new(
            config,
            params,
            RewardConfig::default(),
            CheckpointManagerConfig::default(),
        )
    }

    #[test]
    fn test_train_runs_episodes_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let params = SimParams::default();
        let mut agent = small_agent(&params);
        let trainer = trainer(dir.path(), 3, params);

        let stop = AtomicBool::new(false);
        let summary = trainer.train(&mut agent, &stop).unwrap();

        assert_eq!(summary.episodes_completed, 3);
        assert!(!summary.interrupted);
        assert_eq!(TrainableAgent::episode_count(&agent), 3);
        // 3 chasers x 15 ticks per episode fill the batch quickly
        assert!(agent.step_count() > 0);

        let ckpt = dir.path().join("checkpoints");
        assert!(ckpt.join("checkpoint_0000002").exists());
        assert!(ckpt.join("checkpoint_0000003").exists());
        assert!(summary.last_checkpoint.unwrap().ends_with("checkpoint_0000003"));
        assert!(dir.path().join("logs").join("metrics_ep2.json").exists());
        assert!(dir.path().join("logs").join("metrics_final.json").exists());
    }

    #[test]
    fn test_stop_flag_ends_before_first_tick() {
        let dir = tempfile::tempdir().unwrap();
        let params = SimParams::default();
        let mut agent = small_agent(&params);
        let trainer = trainer(dir.path(), 5, params);

        let stop = AtomicBool::new(true);
        let summary = trainer.train(&mut agent, &stop).unwrap();
        assert_eq!(summary.episodes_completed, 0);
        assert!(summary.interrupted);
        assert!(summary.last_checkpoint.is_none());
        assert_eq!(agent.replay_len(), 0);
    }

    #[test]
    fn test_resumed_run_continues_episode_numbering() {
        let dir = tempfile::tempdir().unwrap();
        let params = SimParams::default();
        let mut agent = small_agent(&params);
        for _ in 0..10 {
            agent.end_episode();
        }
        let trainer = trainer(dir.path(), 2, params);
        let summary = trainer.train(&mut agent, &AtomicBool::new(false)).unwrap();
        assert_eq!(summary.episodes_completed, 2);
        assert!(dir.path().join("checkpoints").join("checkpoint_0000012").exists());
    }

    #[test]
    fn test_evaluate_restores_epsilon() {
        let dir = tempfile::tempdir().unwrap();
        let params = SimParams::default();
        let mut agent = small_agent(&params);
        agent.set_epsilon(0.6);
        let trainer = trainer(dir.path(), 1, params);

        let rate = trainer.evaluate(&mut agent, 2).unwrap();
        assert!((0.0..=1.0).contains(&rate));
        assert!((agent.epsilon() - 0.6).abs() < 1e-6);
        assert_eq!(agent.replay_len(), 0);
    }

    #[test]
    fn test_evaluate_episodes_without_agent() {
        let dir = tempfile::tempdir().unwrap();
        let mut params = SimParams {
            arena: ArenaConfig {
                width: 800.0,
                height: 600.0,
                ..Default::default()
            },
            ..Default::default()
        };
        params.chaser.strategy = StrategyKind::SimplePursuit;
        params.chaser.formation_radius = 100.0;
        params.arena.sense_radius = 150.0;
        let trainer = trainer(dir.path(), 1, params);

        let mut frames = 0;
        let results = trainer
            .evaluate_episodes(None, 2, |_, frame| {
                assert_eq!(frame.chasers.len(), 3);
                frames += 1;
            })
            .unwrap();
        assert_eq!(results.len(), 2);
        let steps: usize = results.iter().map(|m| m.steps).sum();
        assert_eq!(frames, steps);
        for m in &results {
            assert!(m.steps <= 15);
            assert!(m.explored_percentage > 0.0);
        }
    }
}
