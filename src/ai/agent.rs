use std::path::Path;

use crate::checkpoint::{CheckpointMetadata, CheckpointMetrics};
use crate::error::CheckpointError;

/// A single chaser transition for replay training.
#[derive(Debug, Clone, PartialEq)]
pub struct Experience {
    pub state: Vec<f32>,
    pub action: usize,
    pub reward: f32,
    pub next_state: Vec<f32>,
    pub done: bool,
}

/// Metrics returned from a training update.
#[derive(Debug, Clone, Default)]
pub struct UpdateMetrics {
    pub loss: f32,
    pub epsilon: f32,
}

/// Interface the coordinator drives every tick.
pub trait Agent {
    /// Pick a discrete heading for `state`. When `training` is true the agent
    /// may explore; otherwise it exploits.
    fn select_action(&mut self, state: &[f32], training: bool) -> usize;

    /// Return the agent's display name.
    fn name(&self) -> &str;

    /// Remember a transition for later training.
    fn store_experience(&mut self, _experience: Experience) {}

    /// Run one training step if enough experience is available.
    fn train(&mut self) -> Option<UpdateMetrics> {
        None
    }

    /// Highest action value the agent assigns to `state`, if it has a value
    /// estimate.
    fn max_q_value(&self, _state: &[f32]) -> Option<f32> {
        None
    }
}

/// Exploration rate saved by [`TrainableAgent::enter_eval_mode`].
pub struct EvalState(pub(crate) f32);

/// Extension trait for agents that support the full training lifecycle.
pub trait TrainableAgent: Agent {
    /// Algorithm name for logging and checkpoint metadata.
    fn algorithm_name(&self) -> &str;
    /// Completed episode count (for resume offset).
    fn episode_count(&self) -> usize;
    /// Mark the end of an episode.
    fn end_episode(&mut self);
    /// Current training step count.
    fn step_count(&self) -> usize;
    /// Current exploration rate.
    fn epsilon(&self) -> f32;
    /// Enter eval mode (epsilon = 0). Returns state to restore.
    fn enter_eval_mode(&mut self) -> EvalState;
    /// Exit eval mode, restoring previous state.
    fn exit_eval_mode(&mut self, state: EvalState);
    /// Write networks, optimizer and training state into `dir` as one unit.
    fn save(&self, dir: &Path) -> Result<(), CheckpointError>;
    /// Restore everything written by [`TrainableAgent::save`]. On error the
    /// agent is left exactly as it was.
    fn load(&mut self, dir: &Path) -> Result<(), CheckpointError>;
    /// Build checkpoint metadata for this agent's algorithm.
    fn build_checkpoint_metadata(
        &self,
        metrics: &CheckpointMetrics,
        episode: usize,
        timestamp: u64,
    ) -> CheckpointMetadata;
}
