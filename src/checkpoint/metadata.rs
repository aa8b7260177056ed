use serde::{Deserialize, Serialize};

/// Metrics snapshot at checkpoint time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointMetrics {
    pub capture_rate: f32,
    pub average_reward: f32,
    pub average_steps: f32,
    pub explored_percentage: f32,
    pub current_loss: f32,
    pub training_steps: usize,
}

/// Hyperparameters recorded in checkpoint metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointHyperparameters {
    pub learning_rate: f64,
    pub gamma: f32,
    pub epsilon: f32,
    pub epsilon_start: f32,
    pub epsilon_min: f32,
    pub epsilon_decay: f32,
    pub tau: f32,
    pub batch_size: usize,
    pub replay_capacity: usize,
    pub hidden_size: usize,
}

/// Top-level checkpoint metadata written to metadata.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub episode: usize,
    pub timestamp: u64,
    pub algorithm: String,
    pub state_dim: usize,
    pub action_dim: usize,
    pub metrics: CheckpointMetrics,
    pub hyperparameters: CheckpointHyperparameters,
}

/// DQN training state written to training_state.json. Carries epsilon so a
/// resumed run continues the same exploration schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DqnTrainingState {
    pub epsilon: f32,
    pub step_count: usize,
    pub episode_count: usize,
    pub learning_rate: f64,
    pub gamma: f32,
    pub epsilon_start: f32,
    pub epsilon_min: f32,
    pub epsilon_decay: f32,
    pub tau: f32,
    pub batch_size: usize,
    pub replay_capacity: usize,
    pub hidden_size: usize,
}
