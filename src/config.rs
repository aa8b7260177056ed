use std::path::Path;

use tracing::warn;

use crate::ai::algorithms::DqnConfig;
use crate::ai::RewardConfig;
use crate::checkpoint::CheckpointManagerConfig;
use crate::error::ConfigError;
use crate::sim::{ArenaConfig, ChaserConfig, RunnerConfig, SimParams};
use crate::training::trainer::TrainerConfig;

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub arena: ArenaConfig,
    pub chaser: ChaserConfig,
    pub runner: RunnerConfig,
    pub reward: RewardConfig,
    pub dqn: DqnConfig,
    pub training: TrainerConfig,
    pub checkpoint: CheckpointManagerConfig,
}

fn check(ok: bool, msg: &str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Validation(msg.into()))
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Simulation parameters handed to the coordinator.
    pub fn sim_params(&self) -> SimParams {
        SimParams {
            arena: self.arena.clone(),
            chaser: self.chaser.clone(),
            runner: self.runner.clone(),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sim_params()
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        let d = &self.dqn;
        check(d.learning_rate > 0.0, "dqn.learning_rate must be > 0")?;
        check((0.0..=1.0).contains(&d.gamma), "dqn.gamma must be in [0, 1]")?;
        check((0.0..=1.0).contains(&d.epsilon_start), "dqn.epsilon_start must be in [0, 1]")?;
        check((0.0..=1.0).contains(&d.epsilon_min), "dqn.epsilon_min must be in [0, 1]")?;
        check(
            d.epsilon_min <= d.epsilon_start,
            "dqn.epsilon_min must be <= dqn.epsilon_start",
        )?;
        check(d.epsilon_decay > 0.0 && d.epsilon_decay <= 1.0, "dqn.epsilon_decay must be in (0, 1]")?;
        check(d.tau > 0.0 && d.tau <= 1.0, "dqn.tau must be in (0, 1]")?;
        check(d.batch_size > 0, "dqn.batch_size must be > 0")?;
        check(
            d.replay_capacity >= d.batch_size,
            "dqn.replay_capacity must be >= dqn.batch_size",
        )?;
        check(d.hidden_size > 0, "dqn.hidden_size must be > 0")?;

        let t = &self.training;
        check(t.num_episodes > 0, "training.num_episodes must be > 0")?;
        check(t.max_steps > 0, "training.max_steps must be > 0")?;
        check(t.log_interval > 0, "training.log_interval must be > 0")?;

        check(self.checkpoint.keep_last_n > 0, "checkpoint.keep_last_n must be >= 1")?;

        Ok(())
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::StrategyKind;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().expect("default config should be valid");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[dqn]
learning_rate = 0.0005

[chaser]
strategy = "simple_pursuit"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!((config.dqn.learning_rate - 0.0005).abs() < 1e-9);
        assert_eq!(config.chaser.strategy, StrategyKind::SimplePursuit);
        // Other fields should be defaults
        assert!((config.dqn.gamma - 0.99).abs() < 1e-6);
        assert_eq!(config.chaser.count, 3);
        assert_eq!(config.training.num_episodes, 1000);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!((config.arena.width - 1920.0).abs() < 1e-6);
        assert!((config.arena.capture_radius - 30.0).abs() < 1e-6);
        assert!((config.reward.capture_bonus - 100.0).abs() < 1e-6);
        assert_eq!(config.chaser.sighting_cooldown, 30);
        assert_eq!(config.checkpoint.keep_best_n, 3);
    }

    #[test]
    fn test_sim_params_carry_sections() {
        let mut config = AppConfig::default();
        config.runner.count = 4;
        config.chaser.num_actions = 16;
        let params = config.sim_params();
        assert_eq!(params.observation_dim(), 3 * 4 + 6);
        assert_eq!(params.action_dim(), 16);
    }

    #[test]
    fn test_validation_rejects_zero_episodes() {
        let mut config = AppConfig::default();
        config.training.num_episodes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_negative_lr() {
        let mut config = AppConfig::default();
        config.dqn.learning_rate = -0.001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_invalid_gamma() {
        let mut config = AppConfig::default();
        config.dqn.gamma = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_epsilon_min_gt_start() {
        let mut config = AppConfig::default();
        config.dqn.epsilon_start = 0.1;
        config.dqn.epsilon_min = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_decay_and_tau() {
        let mut config = AppConfig::default();
        config.dqn.epsilon_decay = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.dqn.tau = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_replay_capacity_lt_batch() {
        let mut config = AppConfig::default();
        config.dqn.replay_capacity = 10;
        config.dqn.batch_size = 64;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_arena() {
        let mut config = AppConfig::default();
        config.arena.capture_radius = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.arena.communication_radius = -1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.arena.cell_size = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_swarm() {
        let mut config = AppConfig::default();
        config.chaser.count = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.runner.count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_probability_out_of_range() {
        let mut config = AppConfig::default();
        config.runner.turn_probability = 1.2;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.chaser.steering_strength = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AppConfig::load_or_default(Path::new("nonexistent_config.toml")).unwrap();
        assert_eq!(config.training.num_episodes, 1000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
[training]
num_episodes = 500
seed = 7

[arena]
sense_radius = 250.0
"#
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.training.num_episodes, 500);
        assert_eq!(config.training.seed, Some(7));
        assert!((config.arena.sense_radius - 250.0).abs() < 1e-6);
        // Others are defaults
        assert!((config.dqn.learning_rate - 1e-3).abs() < 1e-9);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[dqn]\nbatch_size = 0\n").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_default_toml_roundtrips() {
        let toml_str = AppConfig::default_toml().unwrap();
        let config: AppConfig = toml::from_str(&toml_str).unwrap();
        config.validate().expect("roundtripped config should be valid");
    }
}
