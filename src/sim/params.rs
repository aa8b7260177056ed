use serde::{Deserialize, Serialize};

use super::chaser::StrategyKind;
use super::vector::Vec2;
use crate::error::SimulationError;

/// Arena geometry and perception radii.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub width: f32,
    pub height: f32,
    /// Chasers are clamped to `[border_margin, dim - border_margin]`.
    pub border_margin: f32,
    /// Fraction of velocity kept (and reversed) on the clamped axis.
    pub bounce_factor: f32,
    pub cell_size: f32,
    pub sense_radius: f32,
    pub capture_radius: f32,
    pub communication_radius: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        ArenaConfig {
            width: 1920.0,
            height: 1080.0,
            border_margin: 15.0,
            bounce_factor: 0.8,
            cell_size: 30.0,
            sense_radius: 400.0,
            capture_radius: 30.0,
            communication_radius: 500.0,
        }
    }
}

impl ArenaConfig {
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }

    /// Total number of exploration cells covering the arena.
    pub fn total_cells(&self) -> usize {
        let cols = (self.width / self.cell_size).floor() as usize;
        let rows = (self.height / self.cell_size).floor() as usize;
        cols * rows
    }
}

/// Chaser kinematics, mode timing and exploration search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaserConfig {
    pub count: usize,
    pub formation_radius: f32,
    pub strategy: StrategyKind,
    pub num_actions: usize,
    pub max_speed: f32,
    pub steering_strength: f32,
    pub pursuit_speed_factor: f32,
    pub explore_speed_factor: f32,
    pub policy_speed_factor: f32,
    /// Cooldown applied after an individual (direct or relayed) sighting.
    pub sighting_cooldown: i32,
    /// Cooldown applied when the swarm forces a chaser into pursuit.
    pub escalation_cooldown: i32,
    /// Per-tick probability of picking a fresh wander target.
    pub retarget_probability: f32,
    pub search_min_distance: f32,
    pub search_radius: f32,
    pub search_angle_step_deg: f32,
    /// Wander targets must lie at least this far inside the arena edge.
    pub search_margin: f32,
    pub target_reached_distance: f32,
    /// Distance of the four cardinal grid probes in the observation.
    pub probe_distance: f32,
}

impl Default for ChaserConfig {
    fn default() -> Self {
        ChaserConfig {
            count: 3,
            formation_radius: 500.0,
            strategy: StrategyKind::LearnedPolicy,
            num_actions: 8,
            max_speed: 3.5,
            steering_strength: 0.08,
            pursuit_speed_factor: 1.2,
            explore_speed_factor: 0.8,
            policy_speed_factor: 1.0,
            sighting_cooldown: 30,
            escalation_cooldown: 15,
            retarget_probability: 0.1,
            search_min_distance: 50.0,
            search_radius: 300.0,
            search_angle_step_deg: 30.0,
            search_margin: 20.0,
            target_reached_distance: 15.0,
            probe_distance: 30.0,
        }
    }
}

/// Runner random-walk parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub count: usize,
    pub max_speed: f32,
    pub steering_strength: f32,
    /// 0..1, higher means gentler heading changes.
    pub smoothness: f32,
    pub turn_probability: f32,
    /// Distance from the edge at which the runner starts turning back.
    pub border_margin: f32,
    pub spawn_margin: f32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            count: 2,
            max_speed: 2.0,
            steering_strength: 0.05,
            smoothness: 0.7,
            turn_probability: 0.5,
            border_margin: 80.0,
            spawn_margin: 50.0,
        }
    }
}

/// Everything the simulation core needs, passed explicitly to the encoder,
/// the reward function and the controllers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    pub arena: ArenaConfig,
    pub chaser: ChaserConfig,
    pub runner: RunnerConfig,
}

impl SimParams {
    /// Observation length: 3 per runner, 4 grid probes, 2 for the nearest
    /// neighbour.
    pub fn observation_dim(&self) -> usize {
        3 * self.runner.count + 4 + 2
    }

    pub fn action_dim(&self) -> usize {
        self.chaser.num_actions
    }

    /// Reject parameters the simulation cannot run with, such as a zero cell
    /// size (the wander search would never terminate) or an empty swarm.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let a = &self.arena;
        check(a.width > 0.0 && a.height > 0.0, "arena width and height must be > 0")?;
        check(a.cell_size > 0.0, "arena.cell_size must be > 0")?;
        check(a.sense_radius > 0.0, "arena.sense_radius must be > 0")?;
        check(a.capture_radius > 0.0, "arena.capture_radius must be > 0")?;
        check(a.communication_radius >= 0.0, "arena.communication_radius must be >= 0")?;
        check(
            a.border_margin >= 0.0 && 2.0 * a.border_margin < a.width.min(a.height),
            "arena.border_margin must be >= 0 and leave room inside the arena",
        )?;
        check(unit(a.bounce_factor), "arena.bounce_factor must be in [0, 1]")?;

        let c = &self.chaser;
        check(c.count > 0, "chaser.count must be > 0")?;
        check(c.num_actions > 0, "chaser.num_actions must be > 0")?;
        check(c.formation_radius >= 0.0, "chaser.formation_radius must be >= 0")?;
        check(c.max_speed > 0.0, "chaser.max_speed must be > 0")?;
        check(
            c.pursuit_speed_factor > 0.0
                && c.explore_speed_factor > 0.0
                && c.policy_speed_factor > 0.0,
            "chaser speed factors must be > 0",
        )?;
        check(positive_unit(c.steering_strength), "chaser.steering_strength must be in (0, 1]")?;
        check(unit(c.retarget_probability), "chaser.retarget_probability must be in [0, 1]")?;
        check(c.sighting_cooldown >= 0, "chaser.sighting_cooldown must be >= 0")?;
        check(c.escalation_cooldown >= 0, "chaser.escalation_cooldown must be >= 0")?;
        check(
            c.search_min_distance > 0.0 && c.search_radius >= c.search_min_distance,
            "chaser.search_radius must be >= chaser.search_min_distance > 0",
        )?;
        check(c.search_angle_step_deg > 0.0, "chaser.search_angle_step_deg must be > 0")?;
        check(
            c.search_margin >= 0.0 && 2.0 * c.search_margin < a.width.min(a.height),
            "chaser.search_margin must be >= 0 and leave room inside the arena",
        )?;
        check(c.target_reached_distance > 0.0, "chaser.target_reached_distance must be > 0")?;
        check(c.probe_distance > 0.0, "chaser.probe_distance must be > 0")?;

        let r = &self.runner;
        check(r.count > 0, "runner.count must be > 0")?;
        check(r.max_speed > 0.0, "runner.max_speed must be > 0")?;
        check(positive_unit(r.steering_strength), "runner.steering_strength must be in (0, 1]")?;
        check(unit(r.smoothness), "runner.smoothness must be in [0, 1]")?;
        check(unit(r.turn_probability), "runner.turn_probability must be in [0, 1]")?;
        check(
            r.border_margin >= 0.0 && r.spawn_margin >= 0.0,
            "runner margins must be >= 0",
        )?;
        Ok(())
    }
}

fn check(ok: bool, msg: &str) -> Result<(), SimulationError> {
    if ok {
        Ok(())
    } else {
        Err(SimulationError::InvalidParams(msg.into()))
    }
}

fn unit(x: f32) -> bool {
    (0.0..=1.0).contains(&x)
}

/// Half-open `(0, 1]`.
fn positive_unit(x: f32) -> bool {
    x > 0.0 && x <= 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_observation_dim() {
        let params = SimParams::default();
        assert_eq!(params.observation_dim(), 12);
        assert_eq!(params.action_dim(), 8);
    }

    #[test]
    fn test_default_params_are_valid() {
        SimParams::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_degenerate_geometry() {
        let cases: [fn(&mut SimParams); 6] = [
            |p| p.arena.cell_size = 0.0,
            |p| p.arena.capture_radius = 0.0,
            |p| p.chaser.probe_distance = 0.0,
            |p| p.chaser.formation_radius = -1.0,
            |p| p.chaser.search_margin = 600.0,
            |p| p.runner.count = 0,
        ];
        for mutate in cases {
            let mut params = SimParams::default();
            mutate(&mut params);
            assert!(matches!(
                params.validate(),
                Err(SimulationError::InvalidParams(_))
            ));
        }
    }

    #[test]
    fn test_total_cells() {
        let arena = ArenaConfig::default();
        assert_eq!(arena.total_cells(), 64 * 36);
    }
}
