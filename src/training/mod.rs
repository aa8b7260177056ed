//! Training infrastructure: episode trainer, replay buffer and metrics
//! collection.

pub mod metrics;
pub mod replay_buffer;
pub mod trainer;
