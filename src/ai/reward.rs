use serde::{Deserialize, Serialize};

use crate::sim::{Chaser, ExplorationGrid, Runner, SimParams};

/// Reward magnitudes. The per-chaser shaping terms are applied by
/// [`compute_reward`]; `capture_bonus` and `cooperative_bonus` are layered on
/// top by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Penalty per prior visit of the chaser's current cell.
    pub exploration_penalty: f32,
    pub step_penalty: f32,
    /// Bonus when the chaser's own target was captured this tick.
    pub target_capture_bonus: f32,
    /// Scale of the `1 - dist / sense_radius` closeness bonus.
    pub proximity_bonus: f32,
    pub target_switch_penalty: f32,
    /// Bonus for the chaser that made the capture.
    pub capture_bonus: f32,
    /// Bonus for every other pursuing chaser when a capture happens.
    pub cooperative_bonus: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        RewardConfig {
            exploration_penalty: 0.1,
            step_penalty: 0.01,
            target_capture_bonus: 2.0,
            proximity_bonus: 0.1,
            target_switch_penalty: 0.2,
            capture_bonus: 100.0,
            cooperative_bonus: 20.0,
        }
    }
}

/// Shaped per-chaser reward for one tick.
///
/// A `current_target` that does not index into `runners` (or into
/// `capture_flags`) is treated as no target at all.
pub fn compute_reward(
    chaser: &Chaser,
    runners: &[Runner],
    capture_flags: &[bool],
    grid: &ExplorationGrid,
    params: &SimParams,
    config: &RewardConfig,
) -> f32 {
    let mut reward = 0.0f32;

    reward -= config.exploration_penalty * grid.visit_count(chaser.pos) as f32;
    reward -= config.step_penalty;

    let target = chaser
        .current_target
        .filter(|&i| i < runners.len() && i < capture_flags.len());

    if let Some(i) = target {
        if capture_flags[i] {
            reward += config.target_capture_bonus;
        }

        let sense = params.arena.sense_radius;
        let dist = chaser.pos.distance(runners[i].pos);
        if dist < sense {
            reward += config.proximity_bonus * (1.0 - dist / sense);
        }
    }

    if let (Some(current), Some(last)) = (chaser.current_target, chaser.last_target) {
        if current != last {
            reward -= config.target_switch_penalty;
        }
    }

    reward
}
