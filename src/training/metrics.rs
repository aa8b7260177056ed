use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::TrainingError;

/// Per-episode summary handed to the metrics logger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetrics {
    pub total_reward: f32,
    pub steps: usize,
    /// 1 if the episode ended in a capture, else 0.
    pub capture_success: u8,
    /// Visited cells over total cells.
    pub explored_percentage: f32,
    /// Mean of `max_a Q(next_state, a)` over the episode.
    pub avg_q_value: f32,
    pub mode_switches: usize,
}

impl EpisodeMetrics {
    fn fields(&self) -> [(&'static str, f64); 6] {
        [
            ("total_reward", self.total_reward as f64),
            ("steps", self.steps as f64),
            ("capture_success", self.capture_success as f64),
            ("explored_percentage", self.explored_percentage as f64),
            ("avg_q_value", self.avg_q_value as f64),
            ("mode_switches", self.mode_switches as f64),
        ]
    }
}

#[derive(Serialize)]
struct MetricsFile<'a> {
    episode_data: &'a BTreeMap<usize, EpisodeMetrics>,
    aggregated_metrics: &'a BTreeMap<&'static str, Vec<f64>>,
    training_duration: f64,
}

/// Collects episode metrics for the whole run and writes them as JSON.
pub struct MetricsLogger {
    episode_data: BTreeMap<usize, EpisodeMetrics>,
    aggregated: BTreeMap<&'static str, Vec<f64>>,
    started: Instant,
}

impl MetricsLogger {
    pub fn new() -> Self {
        MetricsLogger {
            episode_data: BTreeMap::new(),
            aggregated: BTreeMap::new(),
            started: Instant::now(),
        }
    }

    pub fn log_episode(&mut self, episode: usize, metrics: EpisodeMetrics) {
        for (name, value) in metrics.fields() {
            self.aggregated.entry(name).or_default().push(value);
        }
        self.episode_data.insert(episode, metrics);
    }

    /// Mean of the last `window` values of `field`, or of all of them when
    /// fewer were logged. Unknown fields give 0.
    pub fn get_stats(&self, field: &str, window: usize) -> f64 {
        let Some(values) = self.aggregated.get(field) else {
            return 0.0;
        };
        let n = values.len().min(window);
        if n == 0 {
            return 0.0;
        }
        values[values.len() - n..].iter().sum::<f64>() / n as f64
    }

    pub fn episodes_logged(&self) -> usize {
        self.episode_data.len()
    }

    /// Write `{episode_data, aggregated_metrics, training_duration}` to `path`,
    /// creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), TrainingError> {
        let write_err = |source: std::io::Error| TrainingError::MetricsWrite {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let file = MetricsFile {
            episode_data: &self.episode_data,
            aggregated_metrics: &self.aggregated,
            training_duration: self.started.elapsed().as_secs_f64(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| write_err(std::io::Error::other(e)))?;
        fs::write(path, json).map_err(write_err)
    }

    /// Conventional file name for the snapshot taken after `episode`.
    pub fn snapshot_path(dir: &Path, episode: usize) -> PathBuf {
        dir.join(format!("metrics_ep{}.json", episode))
    }
}

impl Default for MetricsLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Rolling windows over recent episodes and updates for periodic logging.
pub struct TrainingMetrics {
    episodes: VecDeque<EpisodeMetrics>,
    update_losses: VecDeque<f32>,
    capacity: usize,
    total_episodes: usize, // lifetime count, never capped
}

impl TrainingMetrics {
    pub fn with_capacity(capacity: usize) -> Self {
        TrainingMetrics {
            episodes: VecDeque::with_capacity(capacity),
            update_losses: VecDeque::with_capacity(capacity),
            capacity,
            total_episodes: 0,
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn record_episode(&mut self, metrics: EpisodeMetrics) {
        self.total_episodes += 1;
        self.episodes.push_back(metrics);
        if self.episodes.len() > self.capacity {
            self.episodes.pop_front();
        }
    }

    pub fn record_update(&mut self, loss: f32) {
        self.update_losses.push_back(loss);
        if self.update_losses.len() > self.capacity {
            self.update_losses.pop_front();
        }
    }

    fn recent_mean(&self, last_n: usize, f: impl Fn(&EpisodeMetrics) -> f32) -> f32 {
        let n = self.episodes.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        self.episodes.iter().rev().take(n).map(f).sum::<f32>() / n as f32
    }

    /// Fraction of the last N episodes that ended in a capture.
    pub fn capture_rate(&self, last_n: usize) -> f32 {
        self.recent_mean(last_n, |m| m.capture_success as f32)
    }

    pub fn average_reward(&self, last_n: usize) -> f32 {
        self.recent_mean(last_n, |m| m.total_reward)
    }

    pub fn average_steps(&self, last_n: usize) -> f32 {
        self.recent_mean(last_n, |m| m.steps as f32)
    }

    pub fn average_explored(&self, last_n: usize) -> f32 {
        self.recent_mean(last_n, |m| m.explored_percentage)
    }

    /// Average loss over the last N updates.
    pub fn average_loss(&self, last_n: usize) -> f32 {
        let n = self.update_losses.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        let sum: f32 = self.update_losses.iter().rev().take(n).sum();
        sum / n as f32
    }

    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new()
    }
}
