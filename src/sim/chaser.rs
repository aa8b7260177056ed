use std::f32::consts::TAU;

use rand::seq::IndexedRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::grid::ExplorationGrid;
use super::params::{ArenaConfig, ChaserConfig, SimParams};
use super::runner::Runner;
use super::vector::Vec2;
use crate::ai::Agent;

/// Behavioural mode of a chaser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Exploration,
    Pursuit,
}

/// How a chaser turns its mode into a target velocity.
///
/// All strategies share the same observation, mode machine and motion
/// integration; they differ only in how pursuit steering is decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Steer straight at the best-known runner position while pursuing.
    SimplePursuit,
    /// Always wander the exploration grid, ignoring sightings for motion.
    FlockingWander,
    /// Let the learning agent pick one of the discrete headings while pursuing.
    #[default]
    LearnedPolicy,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::SimplePursuit,
        StrategyKind::FlockingWander,
        StrategyKind::LearnedPolicy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::SimplePursuit => "simple_pursuit",
            StrategyKind::FlockingWander => "flocking_wander",
            StrategyKind::LearnedPolicy => "learned_policy",
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = StrategyKind::ALL.iter().map(|k| k.name()).collect();
                format!("unknown strategy '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// A runner position seen directly or relayed by a teammate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sighting {
    pub runner: usize,
    pub position: Vec2,
}

/// Read-only view of the world a chaser decides against.
pub struct TickContext<'a> {
    pub params: &'a SimParams,
    pub grid: &'a ExplorationGrid,
    pub runners: &'a [Runner],
}

/// A pursuing agent and its per-episode controller state.
#[derive(Debug, Clone)]
pub struct Chaser {
    pub pos: Vec2,
    pub velocity: Vec2,
    pub target_velocity: Vec2,
    pub mode: Mode,
    /// Ticks remaining before the mode may be re-evaluated.
    pub switch_cooldown: i32,
    pub last_state: Option<Vec<f32>>,
    pub last_action: Option<usize>,
    pub current_target: Option<usize>,
    pub last_target: Option<usize>,
    /// Last runner position relayed by a teammate.
    pub relayed: Option<Sighting>,
    pub explore_target: Option<Vec2>,
    relayed_this_tick: bool,
}

impl Chaser {
    pub fn new(pos: Vec2) -> Self {
        Chaser {
            pos,
            velocity: Vec2::ZERO,
            target_velocity: Vec2::ZERO,
            mode: Mode::Exploration,
            switch_cooldown: 0,
            last_state: None,
            last_action: None,
            current_target: None,
            last_target: None,
            relayed: None,
            explore_target: None,
            relayed_this_tick: false,
        }
    }

    /// Nearest uncaptured runner within `sense_radius`, ties going to the
    /// lowest index.
    pub fn direct_sighting(&self, runners: &[Runner], sense_radius: f32) -> Option<Sighting> {
        let mut best: Option<(f32, Sighting)> = None;
        for (i, runner) in runners.iter().enumerate() {
            if runner.captured {
                continue;
            }
            let dist = self.pos.distance(runner.pos);
            if dist > sense_radius {
                continue;
            }
            if best.map_or(true, |(d, _)| dist < d) {
                best = Some((
                    dist,
                    Sighting {
                        runner: i,
                        position: runner.pos,
                    },
                ));
            }
        }
        best.map(|(_, s)| s)
    }

    /// Accept a sighting broadcast by a teammate. When several arrive in one
    /// tick the one closest to this chaser wins.
    pub fn receive_sighting(&mut self, sighting: Sighting) {
        let replace = match self.relayed {
            Some(current) if self.relayed_this_tick => {
                self.pos.distance(sighting.position) < self.pos.distance(current.position)
            }
            _ => true,
        };
        if replace {
            self.relayed = Some(sighting);
        }
        self.relayed_this_tick = true;
    }

    pub fn received_sighting(&self) -> bool {
        self.relayed_this_tick
    }

    /// Roll `current_target` into `last_target` and pick this tick's target:
    /// the direct sighting if any, else a sighting relayed this tick.
    pub fn update_target(&mut self, direct: Option<Sighting>) {
        self.last_target = self.current_target;
        self.current_target = match direct {
            Some(s) => Some(s.runner),
            None if self.relayed_this_tick => self.relayed.map(|s| s.runner),
            None => None,
        };
    }

    /// Individual mode transition. Only takes effect once the cooldown has
    /// run out; a sighting (direct or relayed) re-arms it.
    pub fn evaluate_mode(&mut self, sighted: bool, sighting_cooldown: i32) {
        if self.switch_cooldown > 0 {
            return;
        }
        if sighted {
            self.mode = Mode::Pursuit;
            self.switch_cooldown = sighting_cooldown;
        } else {
            self.mode = Mode::Exploration;
        }
    }

    /// Swarm escalation: force pursuit with a shortened cooldown. Returns
    /// whether the mode changed.
    pub fn escalate(&mut self, escalation_cooldown: i32) -> bool {
        if self.mode == Mode::Pursuit {
            return false;
        }
        self.mode = Mode::Pursuit;
        self.switch_cooldown = escalation_cooldown;
        true
    }

    /// Choose this tick's target velocity and record the observed state and
    /// the action taken.
    pub fn decide<R: Rng + ?Sized>(
        &mut self,
        ctx: &TickContext<'_>,
        strategy: StrategyKind,
        direct: Option<Sighting>,
        state: Vec<f32>,
        agent: Option<&mut dyn Agent>,
        training: bool,
        rng: &mut R,
    ) {
        let cfg = &ctx.params.chaser;
        let num_actions = cfg.num_actions;

        let pursuing = self.mode == Mode::Pursuit && strategy != StrategyKind::FlockingWander;
        let pursuit_point = direct.or(self.relayed).map(|s| s.position);

        let action = match (pursuing, strategy, agent, pursuit_point) {
            (true, StrategyKind::LearnedPolicy, Some(agent), _) => {
                let action = agent.select_action(&state, training);
                self.target_velocity = heading_for_action(action, num_actions)
                    * (cfg.max_speed * cfg.policy_speed_factor);
                action
            }
            (true, _, _, Some(point)) => {
                self.target_velocity =
                    (point - self.pos).normalize() * (cfg.max_speed * cfg.pursuit_speed_factor);
                action_for_heading(self.target_velocity, num_actions)
            }
            _ => {
                self.wander(ctx, rng);
                action_for_heading(self.target_velocity, num_actions)
            }
        };

        self.last_state = Some(state);
        self.last_action = Some(action);
    }

    /// Steer, move, keep inside the arena and count down the cooldown.
    pub fn integrate(&mut self, params: &SimParams) {
        self.velocity +=
            (self.target_velocity - self.velocity) * params.chaser.steering_strength;
        self.pos += self.velocity;
        self.enforce_bounds(&params.arena);
        self.switch_cooldown = (self.switch_cooldown - 1).max(0);
        self.relayed_this_tick = false;
    }

    fn wander<R: Rng + ?Sized>(&mut self, ctx: &TickContext<'_>, rng: &mut R) {
        let cfg = &ctx.params.chaser;
        let retarget = match self.explore_target {
            None => true,
            Some(target) => {
                ctx.grid.visit_count(target) > 1
                    || self.pos.distance(target) < cfg.target_reached_distance
                    || rng.random::<f32>() < cfg.retarget_probability
            }
        };
        if retarget {
            self.explore_target = Some(self.pick_wander_target(ctx, rng));
        }
        if let Some(target) = self.explore_target {
            self.target_velocity =
                (target - self.pos).normalize() * (cfg.max_speed * cfg.explore_speed_factor);
        }
    }

    /// Sample a spiral of points around the chaser and pick a random one in a
    /// cell visited at most once; fall back to a centre-biased random point.
    fn pick_wander_target<R: Rng + ?Sized>(&self, ctx: &TickContext<'_>, rng: &mut R) -> Vec2 {
        let arena = &ctx.params.arena;
        let cfg = &ctx.params.chaser;
        let candidates = spiral_candidates(self.pos, arena, cfg, ctx.grid);
        if let Some(&target) = candidates.choose(rng) {
            return target;
        }

        let gauss = |mean: f32, std: f32, rng: &mut R| {
            Normal::new(mean, std)
                .map(|n| n.sample(rng))
                .unwrap_or(mean)
        };
        let x = gauss(arena.width / 2.0, arena.width / 4.0, rng);
        let y = gauss(arena.height / 2.0, arena.height / 4.0, rng);
        Vec2::new(x, y).clamp(
            Vec2::new(cfg.search_margin, cfg.search_margin),
            Vec2::new(arena.width - cfg.search_margin, arena.height - cfg.search_margin),
        )
    }

    /// Clamp to the arena margins, reversing and damping the clamped velocity
    /// component.
    fn enforce_bounds(&mut self, arena: &ArenaConfig) {
        let margin = arena.border_margin;
        let bounce = arena.bounce_factor;

        if self.pos.x < margin {
            self.pos.x = margin;
            self.velocity.x *= -bounce;
        } else if self.pos.x > arena.width - margin {
            self.pos.x = arena.width - margin;
            self.velocity.x *= -bounce;
        }

        if self.pos.y < margin {
            self.pos.y = margin;
            self.velocity.y *= -bounce;
        } else if self.pos.y > arena.height - margin {
            self.pos.y = arena.height - margin;
            self.velocity.y *= -bounce;
        }
    }
}

fn spiral_candidates(
    origin: Vec2,
    arena: &ArenaConfig,
    cfg: &ChaserConfig,
    grid: &ExplorationGrid,
) -> Vec<Vec2> {
    let mut out = Vec::new();
    let step = grid.cell_size();
    let angle_step = cfg.search_angle_step_deg.max(1.0);
    let lo = Vec2::new(cfg.search_margin, cfg.search_margin);
    let hi = Vec2::new(arena.width - cfg.search_margin, arena.height - cfg.search_margin);

    let mut distance = cfg.search_min_distance;
    while distance < cfg.search_radius {
        let mut angle = 0.0f32;
        while angle < 360.0 {
            let p = origin + Vec2::from_angle(angle.to_radians()) * distance;
            let inside = p.x >= lo.x && p.x <= hi.x && p.y >= lo.y && p.y <= hi.y;
            if inside && grid.visit_count(p) <= 1 {
                out.push(p);
            }
            angle += angle_step;
        }
        distance += step;
    }
    out
}

/// Unit heading for discrete action `action` out of `num_actions` evenly
/// spaced directions.
pub fn heading_for_action(action: usize, num_actions: usize) -> Vec2 {
    let angle = action as f32 * TAU / num_actions as f32;
    Vec2::from_angle(angle)
}

/// Nearest discrete action to a heading. The zero vector maps to action 0.
pub fn action_for_heading(heading: Vec2, num_actions: usize) -> usize {
    if heading == Vec2::ZERO || num_actions == 0 {
        return 0;
    }
    let sector = TAU / num_actions as f32;
    (heading.angle() / sector).round() as usize % num_actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::RandomAgent;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ctx_parts() -> (SimParams, ExplorationGrid) {
        let params = SimParams::default();
        let grid = ExplorationGrid::new(params.arena.cell_size);
        (params, grid)
    }

    #[test]
    fn test_strategy_parses_from_name() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.name().parse::<StrategyKind>(), Ok(kind));
        }
        assert!("boids".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_sighting_enters_pursuit_and_sets_cooldown() {
        let mut chaser = Chaser::new(Vec2::new(100.0, 100.0));
        assert_eq!(chaser.switch_cooldown, 0);
        chaser.evaluate_mode(true, 30);
        assert_eq!(chaser.mode, Mode::Pursuit);
        assert_eq!(chaser.switch_cooldown, 30);
    }

    #[test]
    fn test_no_sighting_returns_to_exploration() {
        let mut chaser = Chaser::new(Vec2::new(100.0, 100.0));
        chaser.mode = Mode::Pursuit;
        chaser.evaluate_mode(false, 30);
        assert_eq!(chaser.mode, Mode::Exploration);
        assert_eq!(chaser.switch_cooldown, 0);
    }

    #[test]
    fn test_cooldown_holds_mode() {
        let (params, _) = ctx_parts();
        let mut chaser = Chaser::new(Vec2::new(100.0, 100.0));
        chaser.evaluate_mode(true, 3);
        for _ in 0..3 {
            chaser.evaluate_mode(false, 3);
            assert_eq!(chaser.mode, Mode::Pursuit);
            chaser.integrate(&params);
        }
        assert_eq!(chaser.switch_cooldown, 0);
        chaser.evaluate_mode(false, 3);
        assert_eq!(chaser.mode, Mode::Exploration);
    }

    #[test]
    fn test_relayed_sighting_counts_as_sighting() {
        let mut chaser = Chaser::new(Vec2::new(100.0, 100.0));
        chaser.receive_sighting(Sighting {
            runner: 1,
            position: Vec2::new(900.0, 900.0),
        });
        chaser.update_target(None);
        chaser.evaluate_mode(chaser.received_sighting(), 15);
        assert_eq!(chaser.mode, Mode::Pursuit);
        assert_eq!(chaser.current_target, Some(1));
    }

    #[test]
    fn test_escalate_only_changes_non_pursuers() {
        let mut chaser = Chaser::new(Vec2::ZERO);
        assert!(chaser.escalate(15));
        assert_eq!(chaser.switch_cooldown, 15);
        chaser.switch_cooldown = 4;
        assert!(!chaser.escalate(15));
        assert_eq!(chaser.switch_cooldown, 4);
    }

    #[test]
    fn test_direct_sighting_picks_nearest_visible() {
        let mut rng = StdRng::seed_from_u64(1);
        let chaser = Chaser::new(Vec2::new(0.0, 0.0));
        let runners = vec![
            Runner::new(Vec2::new(300.0, 0.0), &mut rng),
            Runner::new(Vec2::new(100.0, 0.0), &mut rng),
            Runner::new(Vec2::new(1000.0, 0.0), &mut rng),
        ];
        let s = chaser.direct_sighting(&runners, 400.0).unwrap();
        assert_eq!(s.runner, 1);
        assert!(chaser.direct_sighting(&runners[2..], 400.0).is_none());
    }

    #[test]
    fn test_sense_radius_is_inclusive() {
        let chaser = Chaser::new(Vec2::ZERO);
        let runners = vec![Runner::with_velocity(Vec2::new(400.0, 0.0), Vec2::ZERO)];
        assert!(chaser.direct_sighting(&runners, 400.0).is_some());
    }

    #[test]
    fn test_bounds_bounce() {
        let (params, _) = ctx_parts();
        let mut chaser = Chaser::new(Vec2::new(16.0, 500.0));
        chaser.velocity = Vec2::new(-5.0, 0.0);
        chaser.target_velocity = Vec2::new(-5.0, 0.0);
        chaser.integrate(&params);
        assert_eq!(chaser.pos.x, params.arena.border_margin);
        assert!(chaser.velocity.x > 0.0);
        assert!((chaser.velocity.x - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_action_heading_roundtrip() {
        for a in 0..8 {
            assert_eq!(action_for_heading(heading_for_action(a, 8), 8), a);
        }
        assert_eq!(action_for_heading(Vec2::ZERO, 8), 0);
    }

    #[test]
    fn test_simple_pursuit_steers_at_runner() {
        let (params, grid) = ctx_parts();
        let runners = vec![Runner::with_velocity(Vec2::new(500.0, 100.0), Vec2::ZERO)];
        let ctx = TickContext {
            params: &params,
            grid: &grid,
            runners: &runners,
        };
        let mut rng = StdRng::seed_from_u64(5);
        let mut chaser = Chaser::new(Vec2::new(100.0, 100.0));
        let direct = chaser.direct_sighting(&runners, params.arena.sense_radius);
        chaser.evaluate_mode(direct.is_some(), 30);
        chaser.decide(
            &ctx,
            StrategyKind::SimplePursuit,
            direct,
            vec![0.0; params.observation_dim()],
            None,
            true,
            &mut rng,
        );
        assert!(chaser.target_velocity.x > 0.0);
        assert!(chaser.target_velocity.y.abs() < 1e-5);
        assert_eq!(chaser.last_action, Some(0));
    }

    #[test]
    fn test_pursuit_follows_relayed_position_without_direct_sighting() {
        let (params, grid) = ctx_parts();
        // runner has moved on, far outside sense range
        let runners = vec![Runner::with_velocity(Vec2::new(1800.0, 1000.0), Vec2::ZERO)];
        let ctx = TickContext {
            params: &params,
            grid: &grid,
            runners: &runners,
        };
        let mut rng = StdRng::seed_from_u64(5);
        let mut chaser = Chaser::new(Vec2::new(100.0, 100.0));
        chaser.receive_sighting(Sighting {
            runner: 0,
            position: Vec2::new(100.0, 700.0),
        });
        let direct = chaser.direct_sighting(&runners, params.arena.sense_radius);
        assert!(direct.is_none());
        chaser.evaluate_mode(chaser.received_sighting(), 30);
        assert_eq!(chaser.mode, Mode::Pursuit);

        chaser.decide(
            &ctx,
            StrategyKind::SimplePursuit,
            direct,
            vec![0.0; params.observation_dim()],
            None,
            true,
            &mut rng,
        );
        let speed = params.chaser.max_speed * params.chaser.pursuit_speed_factor;
        assert!(chaser.target_velocity.x.abs() < 1e-5);
        assert!((chaser.target_velocity.y - speed).abs() < 1e-4);
        assert!((chaser.target_velocity.length() - speed).abs() < 1e-4);
    }

    #[test]
    fn test_learned_policy_uses_agent_action() {
        let (params, grid) = ctx_parts();
        let runners = vec![Runner::with_velocity(Vec2::new(500.0, 100.0), Vec2::ZERO)];
        let ctx = TickContext {
            params: &params,
            grid: &grid,
            runners: &runners,
        };
        let mut rng = StdRng::seed_from_u64(5);
        let mut agent = RandomAgent::with_seed(params.action_dim(), 9);
        let mut chaser = Chaser::new(Vec2::new(100.0, 100.0));
        chaser.evaluate_mode(true, 30);
        chaser.decide(
            &ctx,
            StrategyKind::LearnedPolicy,
            None,
            vec![0.0; params.observation_dim()],
            Some(&mut agent),
            true,
            &mut rng,
        );
        let action = chaser.last_action.unwrap();
        let expected = heading_for_action(action, 8) * params.chaser.max_speed;
        assert!((chaser.target_velocity - expected).length() < 1e-5);
    }

    #[test]
    fn test_wander_target_inside_search_margin() {
        let (params, grid) = ctx_parts();
        let ctx = TickContext {
            params: &params,
            grid: &grid,
            runners: &[],
        };
        let mut rng = StdRng::seed_from_u64(2);
        let chaser = Chaser::new(Vec2::new(20.0, 20.0));
        for _ in 0..50 {
            let t = chaser.pick_wander_target(&ctx, &mut rng);
            let m = params.chaser.search_margin;
            assert!(t.x >= m && t.x <= params.arena.width - m);
            assert!(t.y >= m && t.y <= params.arena.height - m);
        }
    }

    #[test]
    fn test_wander_avoids_heavily_visited_cells() {
        let (params, mut grid) = ctx_parts();
        let origin = params.arena.center();
        // Saturate everything around the origin except one probe point
        let keep = origin + Vec2::new(50.0, 0.0);
        for p in spiral_candidates(origin, &params.arena, &params.chaser, &grid) {
            if grid.cell_of(p) != grid.cell_of(keep) {
                grid.mark_visited(p);
                grid.mark_visited(p);
            }
        }
        let ctx = TickContext {
            params: &params,
            grid: &grid,
            runners: &[],
        };
        let mut rng = StdRng::seed_from_u64(4);
        let chaser = Chaser::new(origin);
        let t = chaser.pick_wander_target(&ctx, &mut rng);
        assert_eq!(grid.cell_of(t), grid.cell_of(keep));
    }
}
