use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{DefaultRecorder, Recorder};
use burn::tensor::{ElementConversion, TensorData};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::ai::agent::{Agent, EvalState, Experience, TrainableAgent, UpdateMetrics};
use crate::ai::networks::{QNetwork, QNetworkConfig};
use crate::ai::state_encoding::{encode_state, encode_states_batch};
use crate::checkpoint::{
    CheckpointHyperparameters, CheckpointMetadata, CheckpointMetrics, DqnTrainingState,
};
use crate::error::CheckpointError;
use crate::training::replay_buffer::ReplayBuffer;

type InferBackend = NdArray<f32>;
type TrainBackend = Autodiff<InferBackend>;
type DqnOptimizer = OptimizerAdaptor<Adam, QNetwork<TrainBackend>, TrainBackend>;

const TRAINING_STATE_FILE: &str = "training_state.json";

/// DQN hyperparameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DqnConfig {
    pub learning_rate: f64,
    pub gamma: f32,
    pub epsilon_start: f32,
    pub epsilon_min: f32,
    /// Multiplicative decay applied after every training step.
    pub epsilon_decay: f32,
    /// Target network smoothing rate.
    pub tau: f32,
    pub batch_size: usize,
    pub replay_capacity: usize,
    pub hidden_size: usize,
}

impl Default for DqnConfig {
    fn default() -> Self {
        DqnConfig {
            learning_rate: 1e-3,
            gamma: 0.99,
            epsilon_start: 1.0,
            epsilon_min: 0.1,
            epsilon_decay: 0.995,
            tau: 0.01,
            batch_size: 64,
            replay_capacity: 10_000,
            hidden_size: 64,
        }
    }
}

/// DQN agent with online + soft-updated target networks, replay buffer, and
/// Adam optimizer.
pub struct DqnAgent {
    q_network: QNetwork<TrainBackend>,
    target_network: QNetwork<InferBackend>,
    optimizer: DqnOptimizer,
    replay_buffer: ReplayBuffer,
    config: DqnConfig,
    state_dim: usize,
    action_dim: usize,
    device: <TrainBackend as Backend>::Device,
    epsilon: f32,
    step_count: usize,
    episode_count: usize,
    rng: StdRng,
}

impl DqnAgent {
    pub fn new(config: DqnConfig, state_dim: usize, action_dim: usize) -> Self {
        let replay_buffer = ReplayBuffer::new(config.replay_capacity);
        Self::build(config, state_dim, action_dim, replay_buffer, StdRng::from_os_rng())
    }

    /// Deterministic construction: seeds the backend, the exploration rng and
    /// the replay sampler.
    pub fn with_seed(config: DqnConfig, state_dim: usize, action_dim: usize, seed: u64) -> Self {
        <TrainBackend as Backend>::seed(seed);
        let replay_buffer = ReplayBuffer::with_seed(config.replay_capacity, seed.wrapping_add(1));
        Self::build(config, state_dim, action_dim, replay_buffer, StdRng::seed_from_u64(seed))
    }

    fn build(
        config: DqnConfig,
        state_dim: usize,
        action_dim: usize,
        replay_buffer: ReplayBuffer,
        rng: StdRng,
    ) -> Self {
        let device = Default::default();
        let net_config = network_config(&config, state_dim, action_dim);
        let q_network: QNetwork<TrainBackend> = net_config.init(&device);
        // Both networks start from the same parameters.
        let target_network = q_network.valid();
        let epsilon = config.epsilon_start;

        DqnAgent {
            q_network,
            target_network,
            optimizer: AdamConfig::new().init(),
            replay_buffer,
            config,
            state_dim,
            action_dim,
            device,
            epsilon,
            step_count: 0,
            episode_count: 0,
            rng,
        }
    }

    /// Q-values of the online network for a single observation.
    pub fn q_values(&self, state: &[f32]) -> Vec<f32> {
        let input = encode_state::<InferBackend>(state, &self.device);
        tensor_values(self.q_network.valid().forward(input))
    }

    /// Epsilon-greedy when training, greedy otherwise.
    fn pick_action(&mut self, state: &[f32], training: bool) -> usize {
        assert!(self.action_dim > 0, "No actions available");

        if training && self.rng.random::<f32>() < self.epsilon {
            return self.rng.random_range(0..self.action_dim);
        }
        argmax(&self.q_values(state))
    }

    /// One gradient step on a uniformly sampled batch. Returns the loss.
    fn train_step(&mut self) -> f32 {
        let batch_size = self.config.batch_size;
        let dim = self.state_dim;
        let num_actions = self.action_dim;

        let (states, next_states, actions, rewards, not_done) = {
            let batch = self.replay_buffer.sample(batch_size);
            let states: Vec<&[f32]> = batch.iter().map(|e| e.state.as_slice()).collect();
            let next_states: Vec<&[f32]> =
                batch.iter().map(|e| e.next_state.as_slice()).collect();
            (
                encode_states_batch::<TrainBackend>(&states, dim, &self.device),
                encode_states_batch::<InferBackend>(&next_states, dim, &self.device),
                batch.iter().map(|e| e.action).collect::<Vec<_>>(),
                batch.iter().map(|e| e.reward).collect::<Vec<_>>(),
                batch
                    .iter()
                    .map(|e| if e.done { 0.0 } else { 1.0 })
                    .collect::<Vec<f32>>(),
            )
        };

        // Q(s, a) via a one-hot mask over the action dimension: [B, 1]
        let q_all = self.q_network.forward(states);
        let mut mask = vec![0.0f32; batch_size * num_actions];
        for (i, &a) in actions.iter().enumerate() {
            mask[i * num_actions + a] = 1.0;
        }
        let mask = Tensor::<TrainBackend, 1>::from_data(TensorData::from(mask.as_slice()), &self.device)
            .reshape([batch_size, num_actions]);
        let q_taken = (q_all * mask).sum_dim(1);

        // r + gamma * max_a' Q_target(s', a') * (1 - done)
        let next_q = tensor_values(self.target_network.forward(next_states));
        let targets: Vec<f32> = (0..batch_size)
            .map(|i| {
                let row = &next_q[i * num_actions..(i + 1) * num_actions];
                let max_q = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                rewards[i] + self.config.gamma * max_q * not_done[i]
            })
            .collect();
        let targets =
            Tensor::<TrainBackend, 1>::from_data(TensorData::from(targets.as_slice()), &self.device)
                .reshape([batch_size, 1]);

        let diff = q_taken - targets;
        let loss = (diff.clone() * diff).mean();
        let loss_val: f32 = loss.clone().into_scalar().elem();

        let grads = GradientsParams::from_grads(loss.backward(), &self.q_network);
        self.q_network = self
            .optimizer
            .step(self.config.learning_rate, self.q_network.clone(), grads);

        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
        self.target_network = self
            .target_network
            .clone()
            .soft_update(&self.q_network.valid(), self.config.tau);
        self.step_count += 1;

        loss_val
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Set epsilon directly (e.g. 0.0 for pure greedy inference).
    pub fn set_epsilon(&mut self, eps: f32) {
        self.epsilon = eps;
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn episode_count(&self) -> usize {
        self.episode_count
    }

    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    pub fn replay_len(&self) -> usize {
        self.replay_buffer.len()
    }

    /// Write networks, optimizer and training state to `path` as one unit.
    /// Everything goes to a sibling `.tmp` directory first, which is renamed
    /// into place once complete.
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let tmp = tmp_sibling(path);
        if tmp.exists() {
            fs::remove_dir_all(&tmp)?;
        }
        fs::create_dir_all(&tmp)?;

        self.write_records(&tmp)?;
        let state_json = serde_json::to_string_pretty(&self.training_state())?;
        fs::write(tmp.join(TRAINING_STATE_FILE), state_json)?;

        if path.exists() {
            fs::remove_dir_all(path)?;
        }
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "saved DQN agent");
        Ok(())
    }

    /// Restore everything written by [`DqnAgent::save`]. The training state
    /// is parsed and every record read before anything is replaced, so a
    /// failure leaves the agent as it was.
    pub fn load(&mut self, path: &Path) -> Result<(), CheckpointError> {
        if !path.is_dir() {
            return Err(CheckpointError::DirNotFound(path.to_path_buf()));
        }
        let ts_path = path.join(TRAINING_STATE_FILE);
        let json = fs::read_to_string(&ts_path).map_err(|e| CheckpointError::MetadataRead {
            path: ts_path.clone(),
            source: e,
        })?;
        let state: DqnTrainingState =
            serde_json::from_str(&json).map_err(|e| CheckpointError::MetadataParse {
                path: ts_path,
                source: e,
            })?;
        let (q_network, target_network, optimizer) = self.read_dir(path)?;

        self.q_network = q_network;
        self.target_network = target_network;
        self.optimizer = optimizer;
        self.restore_training_state(&state);
        Ok(())
    }

    fn write_records(&self, dir: &Path) -> Result<(), CheckpointError> {
        let recorder = DefaultRecorder::default();
        let save_err = |e: burn::record::RecorderError| CheckpointError::ModelSave(e.to_string());

        self.q_network
            .valid()
            .save_file(dir.join("q_network"), &recorder)
            .map_err(save_err)?;
        self.target_network
            .clone()
            .save_file(dir.join("target_network"), &recorder)
            .map_err(save_err)?;
        Recorder::<TrainBackend>::record(&recorder, self.optimizer.to_record(), dir.join("optimizer"))
            .map_err(save_err)?;
        Ok(())
    }

    fn read_dir(
        &self,
        dir: &Path,
    ) -> Result<(QNetwork<TrainBackend>, QNetwork<InferBackend>, DqnOptimizer), CheckpointError>
    {
        let recorder = DefaultRecorder::default();
        let load_err = |e: burn::record::RecorderError| CheckpointError::ModelLoad(e.to_string());
        let net_config = network_config(&self.config, self.state_dim, self.action_dim);

        let q_network: QNetwork<TrainBackend> = net_config
            .init(&self.device)
            .load_file(dir.join("q_network"), &recorder, &self.device)
            .map_err(load_err)?;
        let target_network: QNetwork<InferBackend> = net_config
            .init(&self.device)
            .load_file(dir.join("target_network"), &recorder, &self.device)
            .map_err(load_err)?;
        let record = Recorder::<TrainBackend>::load(&recorder, dir.join("optimizer"), &self.device)
            .map_err(load_err)?;
        let optimizer: DqnOptimizer = AdamConfig::new().init();

        Ok((q_network, target_network, optimizer.load_record(record)))
    }

    /// Export current training state for checkpointing.
    pub fn training_state(&self) -> DqnTrainingState {
        DqnTrainingState {
            epsilon: self.epsilon,
            step_count: self.step_count,
            episode_count: self.episode_count,
            learning_rate: self.config.learning_rate,
            gamma: self.config.gamma,
            epsilon_start: self.config.epsilon_start,
            epsilon_min: self.config.epsilon_min,
            epsilon_decay: self.config.epsilon_decay,
            tau: self.config.tau,
            batch_size: self.config.batch_size,
            replay_capacity: self.config.replay_capacity,
            hidden_size: self.config.hidden_size,
        }
    }

    /// Continue the exploration trajectory and counters of a saved run.
    /// Hyperparameters always come from this agent's own config, so a
    /// resumed run picks up config and command-line changes.
    pub fn restore_training_state(&mut self, state: &DqnTrainingState) {
        if (state.learning_rate - self.config.learning_rate).abs() > f64::EPSILON
            || state.batch_size != self.config.batch_size
            || state.hidden_size != self.config.hidden_size
        {
            warn!(
                saved_lr = state.learning_rate,
                lr = self.config.learning_rate,
                "checkpoint hyperparameters differ from config, using config"
            );
        }
        self.epsilon = state.epsilon;
        self.step_count = state.step_count;
        self.episode_count = state.episode_count;
    }
}

fn network_config(config: &DqnConfig, state_dim: usize, action_dim: usize) -> QNetworkConfig {
    QNetworkConfig::new(state_dim, action_dim).with_hidden_size(config.hidden_size)
}

fn tensor_values<B: Backend>(tensor: Tensor<B, 2>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

/// Index of the largest value; ties go to the lowest index.
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

impl Agent for DqnAgent {
    fn select_action(&mut self, state: &[f32], training: bool) -> usize {
        self.pick_action(state, training)
    }

    fn name(&self) -> &str {
        "DQN"
    }

    fn store_experience(&mut self, experience: Experience) {
        self.replay_buffer.push(experience);
    }

    fn train(&mut self) -> Option<UpdateMetrics> {
        if self.replay_buffer.len() < self.config.batch_size {
            return None;
        }
        let loss = self.train_step();
        Some(UpdateMetrics {
            loss,
            epsilon: self.epsilon,
        })
    }

    fn max_q_value(&self, state: &[f32]) -> Option<f32> {
        self.q_values(state).into_iter().reduce(f32::max)
    }
}

impl TrainableAgent for DqnAgent {
    fn algorithm_name(&self) -> &str {
        "DQN"
    }

    fn episode_count(&self) -> usize {
        self.episode_count
    }

    fn end_episode(&mut self) {
        self.episode_count += 1;
    }

    fn step_count(&self) -> usize {
        self.step_count
    }

    fn epsilon(&self) -> f32 {
        self.epsilon
    }

    fn enter_eval_mode(&mut self) -> EvalState {
        let saved = EvalState(self.epsilon);
        self.epsilon = 0.0;
        saved
    }

    fn exit_eval_mode(&mut self, state: EvalState) {
        self.epsilon = state.0;
    }

    fn save(&self, dir: &Path) -> Result<(), CheckpointError> {
        DqnAgent::save(self, dir)
    }

    fn load(&mut self, dir: &Path) -> Result<(), CheckpointError> {
        DqnAgent::load(self, dir)
    }

    fn build_checkpoint_metadata(
        &self,
        metrics: &CheckpointMetrics,
        episode: usize,
        timestamp: u64,
    ) -> CheckpointMetadata {
        let ts = self.training_state();
        CheckpointMetadata {
            episode,
            timestamp,
            algorithm: "DQN".to_string(),
            state_dim: self.state_dim,
            action_dim: self.action_dim,
            metrics: metrics.clone(),
            hyperparameters: CheckpointHyperparameters {
                learning_rate: ts.learning_rate,
                gamma: ts.gamma,
                epsilon: ts.epsilon,
                epsilon_start: ts.epsilon_start,
                epsilon_min: ts.epsilon_min,
                epsilon_decay: ts.epsilon_decay,
                tau: ts.tau,
                batch_size: ts.batch_size,
                replay_capacity: ts.replay_capacity,
                hidden_size: ts.hidden_size,
            },
        }
    }
}
