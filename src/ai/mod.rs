mod agent;
pub mod algorithms;
pub mod networks;
mod random;
pub mod reward;
pub mod state_encoding;

pub use agent::{Agent, EvalState, Experience, TrainableAgent, UpdateMetrics};
pub use algorithms::{DqnAgent, DqnConfig};
pub use networks::{QNetwork, QNetworkConfig};
pub use random::RandomAgent;
pub use reward::{compute_reward, RewardConfig};
