mod manager;
mod metadata;

pub use manager::{rank_metrics, CheckpointEntry, CheckpointManager, CheckpointManagerConfig};
pub use metadata::{
    CheckpointHyperparameters, CheckpointMetadata, CheckpointMetrics, DqnTrainingState,
};
