use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::ai::TrainableAgent;
use crate::checkpoint::metadata::{CheckpointMetadata, CheckpointMetrics};
use crate::error::CheckpointError;

const METADATA_FILE: &str = "metadata.json";
const LATEST_LINK: &str = "latest";

/// Configuration for the checkpoint manager.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CheckpointManagerConfig {
    pub checkpoint_dir: PathBuf,
    /// Most recent checkpoints that are never pruned.
    pub keep_last_n: usize,
    /// Best-ranked checkpoints that are never pruned.
    pub keep_best_n: usize,
}

impl Default for CheckpointManagerConfig {
    fn default() -> Self {
        CheckpointManagerConfig {
            checkpoint_dir: PathBuf::from("checkpoints"),
            keep_last_n: 5,
            keep_best_n: 3,
        }
    }
}

/// A complete checkpoint on disk.
#[derive(Debug, Clone)]
pub struct CheckpointEntry {
    pub path: PathBuf,
    pub metadata: CheckpointMetadata,
}

/// Better pursuit first: higher capture rate, then fewer steps per episode,
/// then higher reward.
pub fn rank_metrics(a: &CheckpointMetrics, b: &CheckpointMetrics) -> Ordering {
    b.capture_rate
        .total_cmp(&a.capture_rate)
        .then(a.average_steps.total_cmp(&b.average_steps))
        .then(b.average_reward.total_cmp(&a.average_reward))
}

fn checkpoint_name(episode: usize) -> String {
    format!("checkpoint_{:07}", episode)
}

/// Saves agents as `checkpoint_{episode:07}` directories, tracks the most
/// recent one through a `latest` symlink and prunes the rest.
///
/// A directory only counts as a checkpoint once its `metadata.json` exists;
/// the agent's state is written first, the metadata last.
pub struct CheckpointManager {
    config: CheckpointManagerConfig,
}

impl CheckpointManager {
    pub fn new(config: CheckpointManagerConfig) -> Self {
        CheckpointManager { config }
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.config.checkpoint_dir
    }

    /// Save `agent` for `episode`, point `latest` at it and prune.
    pub fn save_agent_checkpoint(
        &self,
        agent: &dyn TrainableAgent,
        metrics: &CheckpointMetrics,
        episode: usize,
    ) -> Result<PathBuf, CheckpointError> {
        fs::create_dir_all(&self.config.checkpoint_dir)?;
        let name = checkpoint_name(episode);
        let dir = self.config.checkpoint_dir.join(&name);

        agent.save(&dir)?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let metadata = agent.build_checkpoint_metadata(metrics, episode, timestamp);
        let tmp_meta = dir.join(format!("{}.tmp", METADATA_FILE));
        fs::write(&tmp_meta, serde_json::to_string_pretty(&metadata)?)?;
        fs::rename(&tmp_meta, dir.join(METADATA_FILE))?;

        self.point_latest_at(&name)?;
        let pruned = self.prune()?;

        info!(
            episode,
            capture_rate = metrics.capture_rate,
            pruned,
            path = %dir.display(),
            "checkpoint saved"
        );
        Ok(dir)
    }

    /// Read the metadata of the checkpoint in `dir`.
    pub fn read_metadata(dir: &Path) -> Result<CheckpointMetadata, CheckpointError> {
        let path = dir.join(METADATA_FILE);
        let json = fs::read_to_string(&path).map_err(|e| CheckpointError::MetadataRead {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| CheckpointError::MetadataParse { path, source: e })
    }

    /// The checkpoint `latest` points at.
    pub fn latest(&self) -> Result<CheckpointEntry, CheckpointError> {
        let link = self.config.checkpoint_dir.join(LATEST_LINK);
        let target = match fs::read_link(&link) {
            Ok(target) => target,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CheckpointError::NoLatestSymlink(
                    self.config.checkpoint_dir.clone(),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        let path = self.config.checkpoint_dir.join(target);
        let metadata = Self::read_metadata(&path)?;
        Ok(CheckpointEntry { path, metadata })
    }

    /// Load the checkpoint in `dir` into `agent` in one step.
    pub fn load_checkpoint(
        &self,
        dir: &Path,
        agent: &mut dyn TrainableAgent,
    ) -> Result<CheckpointMetadata, CheckpointError> {
        if !dir.is_dir() {
            return Err(CheckpointError::DirNotFound(dir.to_path_buf()));
        }
        let metadata = Self::read_metadata(dir)?;
        agent.load(dir)?;
        Ok(metadata)
    }

    /// Load the latest checkpoint into `agent`. Returns `None` when there is
    /// nothing to resume from; on error the agent is unchanged.
    pub fn resume_latest(
        &self,
        agent: &mut dyn TrainableAgent,
    ) -> Result<Option<CheckpointMetadata>, CheckpointError> {
        let entry = match self.latest() {
            Ok(entry) => entry,
            Err(CheckpointError::NoLatestSymlink(dir)) => {
                warn!(dir = %dir.display(), "no checkpoint to resume from");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        agent.load(&entry.path)?;
        info!(episode = entry.metadata.episode, "resumed from checkpoint");
        Ok(Some(entry.metadata))
    }

    /// All complete checkpoints, oldest episode first. A missing checkpoint
    /// directory has none.
    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointEntry>, CheckpointError> {
        let read = match fs::read_dir(&self.config.checkpoint_dir) {
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for item in read {
            let path = item?.path();
            let complete = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("checkpoint_") && !n.ends_with(".tmp"))
                && path.join(METADATA_FILE).is_file();
            if path.is_dir() && complete {
                let metadata = Self::read_metadata(&path)?;
                entries.push(CheckpointEntry { path, metadata });
            }
        }
        entries.sort_by_key(|e| e.metadata.episode);
        Ok(entries)
    }

    /// Delete every checkpoint outside the last N and the best N by
    /// [`rank_metrics`]. Returns how many were removed.
    fn prune(&self) -> Result<usize, CheckpointError> {
        let entries = self.list_checkpoints()?;
        let Some(older) = entries.len().checked_sub(self.config.keep_last_n) else {
            return Ok(0);
        };

        let mut ranked: Vec<&CheckpointEntry> = entries.iter().collect();
        ranked.sort_by(|a, b| rank_metrics(&a.metadata.metrics, &b.metadata.metrics));
        let best: HashSet<&Path> = ranked
            .iter()
            .take(self.config.keep_best_n)
            .map(|e| e.path.as_path())
            .collect();

        let mut removed = 0;
        for entry in &entries[..older] {
            if !best.contains(entry.path.as_path()) {
                fs::remove_dir_all(&entry.path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Swap `latest` over to `name` by renaming a fresh link on top of it.
    fn point_latest_at(&self, name: &str) -> Result<(), CheckpointError> {
        let link = self.config.checkpoint_dir.join(LATEST_LINK);
        let tmp_link = self.config.checkpoint_dir.join(format!("{}.tmp", LATEST_LINK));
        if tmp_link.symlink_metadata().is_ok() {
            fs::remove_file(&tmp_link)?;
        }
        std::os::unix::fs::symlink(name, &tmp_link)?;
        fs::rename(&tmp_link, &link)?;
        Ok(())
    }
}
