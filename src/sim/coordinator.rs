use rand::rngs::StdRng;
use serde::Serialize;
use tracing::debug;

use super::chaser::{Chaser, Mode, TickContext};
use super::grid::ExplorationGrid;
use super::params::SimParams;
use super::runner::Runner;
use super::spawn::{spawn_runners, triangular_formation};
use super::vector::Vec2;
use crate::ai::state_encoding::observe;
use crate::ai::{compute_reward, Agent, Experience, RewardConfig};
use crate::error::SimulationError;

/// The first (chaser, runner) pair found within the capture radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    pub chaser: usize,
    pub runner: usize,
}

/// What happened during one tick.
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    /// Final per-chaser reward, bonuses included.
    pub rewards: Vec<f32>,
    pub capture: Option<Capture>,
    /// Number of chasers whose mode differs from the previous tick.
    pub mode_switches: usize,
    /// `max_a Q(next_state, a)` for every transition recorded this tick.
    pub q_values: Vec<f32>,
    /// Loss of the training step run this tick, if any.
    pub loss: Option<f32>,
}

impl TickOutcome {
    pub fn total_reward(&self) -> f32 {
        self.rewards.iter().sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChaserFrame {
    pub position: Vec2,
    pub mode: Mode,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunnerFrame {
    pub position: Vec2,
    pub captured: bool,
}

/// Read-only snapshot for an external renderer.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub tick: usize,
    pub chasers: Vec<ChaserFrame>,
    pub runners: Vec<RunnerFrame>,
}

/// Owns one episode's world and advances it tick by tick.
pub struct Coordinator {
    params: SimParams,
    reward: RewardConfig,
    chasers: Vec<Chaser>,
    runners: Vec<Runner>,
    grid: ExplorationGrid,
    tick: usize,
    rng: StdRng,
}

impl Coordinator {
    /// Spawn a fresh episode: chasers in formation around the arena centre,
    /// runners out of sensing range.
    pub fn new(
        params: SimParams,
        reward: RewardConfig,
        rng: StdRng,
    ) -> Result<Self, SimulationError> {
        params.validate()?;
        let grid = ExplorationGrid::new(params.arena.cell_size);
        let mut coordinator = Coordinator {
            params,
            reward,
            chasers: Vec::new(),
            runners: Vec::new(),
            grid,
            tick: 0,
            rng,
        };
        coordinator.reset()?;
        Ok(coordinator)
    }

    /// Start from explicit entities instead of the spawn rules.
    pub fn with_entities(
        params: SimParams,
        reward: RewardConfig,
        chasers: Vec<Chaser>,
        runners: Vec<Runner>,
        rng: StdRng,
    ) -> Result<Self, SimulationError> {
        params.validate()?;
        let grid = ExplorationGrid::new(params.arena.cell_size);
        Ok(Coordinator {
            params,
            reward,
            chasers,
            runners,
            grid,
            tick: 0,
            rng,
        })
    }

    /// Reset grid and every transient agent field for a new episode.
    pub fn reset(&mut self) -> Result<(), SimulationError> {
        self.grid.reset();
        self.tick = 0;
        self.chasers = triangular_formation(
            self.params.arena.center(),
            self.params.chaser.formation_radius,
            self.params.chaser.count,
        );
        self.runners = spawn_runners(&self.params, &self.chasers, &mut self.rng)?;
        Ok(())
    }

    /// Advance one tick: observe, broadcast, decide, move, escalate, detect
    /// captures, then reward, store and train. Every chaser observes the
    /// world as it was before anyone moved.
    ///
    /// With `training` false the agent only acts; nothing is stored or
    /// trained.
    pub fn tick(&mut self, mut agent: Option<&mut dyn Agent>, training: bool) -> TickOutcome {
        let strategy = self.params.chaser.strategy;
        let sense = self.params.arena.sense_radius;
        let comm = self.params.arena.communication_radius;
        let modes_before: Vec<Mode> = self.chasers.iter().map(|c| c.mode).collect();

        let positions = self.chaser_positions();
        let sightings: Vec<_> = self
            .chasers
            .iter()
            .map(|c| c.direct_sighting(&self.runners, sense))
            .collect();
        let states: Vec<Vec<f32>> = (0..self.chasers.len())
            .map(|i| {
                observe(
                    positions[i],
                    &self.runners,
                    &others(&positions, i),
                    &self.grid,
                    &self.params,
                )
            })
            .collect();

        for (i, sighting) in sightings.iter().enumerate() {
            let Some(sighting) = sighting else { continue };
            for (j, chaser) in self.chasers.iter_mut().enumerate() {
                if j != i && positions[i].distance(positions[j]) <= comm {
                    chaser.receive_sighting(*sighting);
                }
            }
        }

        let ctx = TickContext {
            params: &self.params,
            grid: &self.grid,
            runners: &self.runners,
        };
        let sighting_cooldown = self.params.chaser.sighting_cooldown;
        for ((chaser, state), &direct) in self.chasers.iter_mut().zip(states).zip(&sightings) {
            chaser.update_target(direct);
            chaser.evaluate_mode(direct.is_some() || chaser.received_sighting(), sighting_cooldown);
            chaser.decide(
                &ctx,
                strategy,
                direct,
                state,
                agent.as_mut().map(|a| &mut **a as &mut dyn Agent),
                training,
                &mut self.rng,
            );
        }

        for chaser in &mut self.chasers {
            chaser.integrate(&self.params);
        }
        for runner in &mut self.runners {
            runner.step(&self.params.arena, &self.params.runner, &mut self.rng);
        }
        for chaser in &self.chasers {
            self.grid.mark_visited(chaser.pos);
        }

        if self.chasers.iter().any(|c| c.mode == Mode::Pursuit) {
            let cooldown = self.params.chaser.escalation_cooldown;
            for chaser in &mut self.chasers {
                chaser.escalate(cooldown);
            }
        }

        let (capture, capture_flags) = self.detect_capture();
        if let Some(c) = capture {
            debug!(tick = self.tick, chaser = c.chaser, runner = c.runner, "runner captured");
        }

        let mut outcome = TickOutcome {
            capture,
            ..Default::default()
        };
        let positions = self.chaser_positions();
        for (i, chaser) in self.chasers.iter().enumerate() {
            let mut reward = compute_reward(
                chaser,
                &self.runners,
                &capture_flags,
                &self.grid,
                &self.params,
                &self.reward,
            );
            match capture {
                Some(c) if c.chaser == i => reward += self.reward.capture_bonus,
                Some(_) if chaser.mode == Mode::Pursuit => reward += self.reward.cooperative_bonus,
                _ => {}
            }
            outcome.rewards.push(reward);

            let Some(agent) = agent.as_deref_mut() else { continue };
            let (Some(state), Some(action)) = (&chaser.last_state, chaser.last_action) else {
                continue;
            };
            let next_state = observe(
                chaser.pos,
                &self.runners,
                &others(&positions, i),
                &self.grid,
                &self.params,
            );
            if let Some(q) = agent.max_q_value(&next_state) {
                outcome.q_values.push(q);
            }
            if training {
                agent.store_experience(Experience {
                    state: state.clone(),
                    action,
                    reward,
                    next_state,
                    done: capture.is_some(),
                });
            }
        }

        if training {
            outcome.loss = agent.and_then(|a| a.train()).map(|m| m.loss);
        }

        outcome.mode_switches = self
            .chasers
            .iter()
            .zip(&modes_before)
            .filter(|(c, before)| c.mode != **before)
            .count();
        self.tick += 1;
        outcome
    }

    /// Mark every runner within the capture radius (strictly) of any chaser
    /// and return the first qualifying pair in chaser-major order.
    fn detect_capture(&mut self) -> (Option<Capture>, Vec<bool>) {
        let radius = self.params.arena.capture_radius;
        let mut flags = vec![false; self.runners.len()];
        let mut first = None;

        for (ci, chaser) in self.chasers.iter().enumerate() {
            for (ri, runner) in self.runners.iter().enumerate() {
                if runner.captured || chaser.pos.distance(runner.pos) >= radius {
                    continue;
                }
                flags[ri] = true;
                if first.is_none() {
                    first = Some(Capture {
                        chaser: ci,
                        runner: ri,
                    });
                }
            }
        }

        for (runner, &caught) in self.runners.iter_mut().zip(&flags) {
            if caught {
                runner.captured = true;
            }
        }
        (first, flags)
    }

    fn chaser_positions(&self) -> Vec<Vec2> {
        self.chasers.iter().map(|c| c.pos).collect()
    }

    /// True once any runner has been caught.
    pub fn is_done(&self) -> bool {
        self.runners.iter().any(|r| r.captured)
    }

    pub fn frame(&self) -> Frame {
        Frame {
            tick: self.tick,
            chasers: self
                .chasers
                .iter()
                .map(|c| ChaserFrame {
                    position: c.pos,
                    mode: c.mode,
                })
                .collect(),
            runners: self
                .runners
                .iter()
                .map(|r| RunnerFrame {
                    position: r.pos,
                    captured: r.captured,
                })
                .collect(),
        }
    }

    /// Visited cells over total arena cells.
    pub fn explored_fraction(&self) -> f32 {
        self.grid
            .explored_fraction(self.params.arena.total_cells())
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn chasers(&self) -> &[Chaser] {
        &self.chasers
    }

    pub fn runners(&self) -> &[Runner] {
        &self.runners
    }

    pub fn grid(&self) -> &ExplorationGrid {
        &self.grid
    }

    pub fn tick_count(&self) -> usize {
        self.tick
    }
}

/// Every position except index `skip`.
fn others(positions: &[Vec2], skip: usize) -> Vec<Vec2> {
    positions
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != skip)
        .map(|(_, &p)| p)
        .collect()
}
