use burn::prelude::*;
use burn::tensor::TensorData;

use crate::sim::{ExplorationGrid, Runner, SimParams, Vec2};

/// Visit counts above this saturate the grid probe features.
const PROBE_SATURATION: u32 = 10;

/// Probe directions in degrees.
const PROBE_ANGLES_DEG: [f32; 4] = [0.0, 90.0, 180.0, 270.0];

/// Encode what a chaser at `pos` perceives as a fixed-length vector of
/// `params.observation_dim()` values:
///
/// ```text
/// per runner:   (dx / sense, dy / sense, 1.0) if within sense radius else (0, 0, 0)
/// 4 probes:     min(visits, 10) / 10 at 0°, 90°, 180°, 270°, probe_distance away
/// neighbour:    (dx / sense, dy / sense) of the nearest other chaser in range, else (0, 0)
/// ```
pub fn observe(
    pos: Vec2,
    runners: &[Runner],
    others: &[Vec2],
    grid: &ExplorationGrid,
    params: &SimParams,
) -> Vec<f32> {
    let sense = params.arena.sense_radius;
    let mut state = Vec::with_capacity(params.observation_dim());

    for runner in runners {
        if pos.distance(runner.pos) <= sense {
            let rel = (runner.pos - pos) / sense;
            state.extend_from_slice(&[rel.x, rel.y, 1.0]);
        } else {
            state.extend_from_slice(&[0.0, 0.0, 0.0]);
        }
    }

    for angle in PROBE_ANGLES_DEG {
        let sample = pos + Vec2::from_angle(angle.to_radians()) * params.chaser.probe_distance;
        let visits = grid.visit_count(sample).min(PROBE_SATURATION);
        state.push(visits as f32 / PROBE_SATURATION as f32);
    }

    match nearest_within(pos, others, sense) {
        Some(other) => {
            let rel = (other - pos) / sense;
            state.extend_from_slice(&[rel.x, rel.y]);
        }
        None => state.extend_from_slice(&[0.0, 0.0]),
    }

    state
}

/// Closest point within `radius`; the first one wins on equal distance.
fn nearest_within(pos: Vec2, others: &[Vec2], radius: f32) -> Option<Vec2> {
    let mut best: Option<(f32, Vec2)> = None;
    for &other in others {
        let dist = pos.distance(other);
        if dist > radius {
            continue;
        }
        if best.map_or(true, |(d, _)| dist < d) {
            best = Some((dist, other));
        }
    }
    best.map(|(_, p)| p)
}

/// Encode a single observation as a `[1, dim]` tensor.
pub fn encode_state<B: Backend>(state: &[f32], device: &B::Device) -> Tensor<B, 2> {
    Tensor::<B, 1>::from_data(TensorData::from(state), device).reshape([1, state.len()])
}

/// Stack observations of equal length into a `[batch, dim]` tensor.
pub fn encode_states_batch<B: Backend>(
    states: &[&[f32]],
    dim: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let batch_size = states.len();
    let mut flat = Vec::with_capacity(batch_size * dim);
    for state in states {
        debug_assert_eq!(state.len(), dim, "observation length mismatch");
        flat.extend_from_slice(state);
    }
    Tensor::<B, 1>::from_data(TensorData::from(flat.as_slice()), device).reshape([batch_size, dim])
}
