use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::params::{ArenaConfig, RunnerConfig};
use super::vector::Vec2;

/// Standard deviation of the per-turn heading change, in degrees.
const TURN_STDDEV_DEG: f32 = 15.0;

/// An evading agent that wanders the arena with smoothly varying heading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runner {
    pub pos: Vec2,
    pub velocity: Vec2,
    pub target_velocity: Vec2,
    pub captured: bool,
}

impl Runner {
    /// Create a runner at `pos` heading in a random direction at low speed.
    pub fn new<R: Rng + ?Sized>(pos: Vec2, rng: &mut R) -> Self {
        let heading = Vec2::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0));
        let heading = if heading == Vec2::ZERO {
            Vec2::new(1.0, 0.0)
        } else {
            heading.normalize()
        };
        let velocity = heading * 0.5;
        Runner {
            pos,
            velocity,
            target_velocity: velocity,
            captured: false,
        }
    }

    /// Runner with a fixed velocity, used for deterministic setups.
    pub fn with_velocity(pos: Vec2, velocity: Vec2) -> Self {
        Runner {
            pos,
            velocity,
            target_velocity: velocity,
            captured: false,
        }
    }

    /// Advance one tick of smooth random wandering.
    pub fn step<R: Rng + ?Sized>(&mut self, arena: &ArenaConfig, config: &RunnerConfig, rng: &mut R) {
        if rng.random::<f32>() < config.turn_probability {
            self.target_velocity = self.next_heading(config, rng) * config.max_speed;
        }

        self.velocity += (self.target_velocity - self.velocity) * config.steering_strength;

        // Turn back before reaching the edge
        if self.pos.x < config.border_margin {
            self.target_velocity.x = self.target_velocity.x.abs();
        } else if self.pos.x > arena.width - config.border_margin {
            self.target_velocity.x = -self.target_velocity.x.abs();
        }
        if self.pos.y < config.border_margin {
            self.target_velocity.y = self.target_velocity.y.abs();
        } else if self.pos.y > arena.height - config.border_margin {
            self.target_velocity.y = -self.target_velocity.y.abs();
        }

        self.pos += self.velocity;
        self.pos = self
            .pos
            .clamp(Vec2::ZERO, Vec2::new(arena.width, arena.height));
    }

    fn next_heading<R: Rng + ?Sized>(&self, config: &RunnerConfig, rng: &mut R) -> Vec2 {
        let turn_deg = Normal::new(0.0, TURN_STDDEV_DEG)
            .map(|n| n.sample(rng))
            .unwrap_or(0.0)
            * (1.0 - config.smoothness);
        let base = if self.target_velocity == Vec2::ZERO {
            self.velocity.normalize()
        } else {
            self.target_velocity.normalize()
        };
        base.rotate(turn_deg.to_radians()).normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_new_runner_not_captured() {
        let mut rng = StdRng::seed_from_u64(7);
        let runner = Runner::new(Vec2::new(100.0, 100.0), &mut rng);
        assert!(!runner.captured);
        assert!((runner.velocity.length() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_runner_stays_in_arena() {
        let mut rng = StdRng::seed_from_u64(11);
        let arena = ArenaConfig {
            width: 400.0,
            height: 300.0,
            ..Default::default()
        };
        let config = RunnerConfig::default();
        let mut runner = Runner::new(Vec2::new(200.0, 150.0), &mut rng);
        for _ in 0..5000 {
            runner.step(&arena, &config, &mut rng);
            assert!(runner.pos.x >= 0.0 && runner.pos.x <= arena.width);
            assert!(runner.pos.y >= 0.0 && runner.pos.y <= arena.height);
        }
    }

    #[test]
    fn test_runner_speed_bounded() {
        let mut rng = StdRng::seed_from_u64(3);
        let arena = ArenaConfig::default();
        let config = RunnerConfig::default();
        let mut runner = Runner::new(arena.center(), &mut rng);
        for _ in 0..1000 {
            runner.step(&arena, &config, &mut rng);
            assert!(runner.velocity.length() <= config.max_speed + 1e-3);
        }
    }
}
