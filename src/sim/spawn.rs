use rand::Rng;

use super::chaser::Chaser;
use super::params::SimParams;
use super::runner::Runner;
use super::vector::Vec2;
use crate::error::SimulationError;

/// Formation angles in degrees, 120° apart.
const FORMATION_ANGLES_DEG: [f32; 3] = [30.0, 150.0, 270.0];

const MAX_SPAWN_ATTEMPTS: usize = 10_000;

/// Place `count` chasers on a circle of `radius` around `center`. The first
/// three form an equilateral triangle; further chasers fill the circle evenly.
pub fn triangular_formation(center: Vec2, radius: f32, count: usize) -> Vec<Chaser> {
    (0..count)
        .map(|i| {
            let angle_deg = if count <= FORMATION_ANGLES_DEG.len() {
                FORMATION_ANGLES_DEG[i]
            } else {
                FORMATION_ANGLES_DEG[0] + 360.0 * i as f32 / count as f32
            };
            Chaser::new(center + Vec2::from_angle(angle_deg.to_radians()) * radius)
        })
        .collect()
}

/// Spawn runners uniformly inside the spawn margin, each at least the sense
/// radius away from every chaser.
pub fn spawn_runners<R: Rng + ?Sized>(
    params: &SimParams,
    chasers: &[Chaser],
    rng: &mut R,
) -> Result<Vec<Runner>, SimulationError> {
    let arena = &params.arena;
    let margin = params.runner.spawn_margin;
    let (x_lo, x_hi) = (margin, (arena.width - margin).max(margin));
    let (y_lo, y_hi) = (margin, (arena.height - margin).max(margin));

    let mut runners = Vec::with_capacity(params.runner.count);
    for _ in 0..params.runner.count {
        let mut placed = None;
        for _ in 0..MAX_SPAWN_ATTEMPTS {
            let candidate = Vec2::new(rng.random_range(x_lo..=x_hi), rng.random_range(y_lo..=y_hi));
            if chasers
                .iter()
                .all(|c| c.pos.distance(candidate) >= arena.sense_radius)
            {
                placed = Some(candidate);
                break;
            }
        }
        let pos = placed.ok_or(SimulationError::SpawnFailed {
            attempts: MAX_SPAWN_ATTEMPTS,
        })?;
        runners.push(Runner::new(pos, rng));
    }
    Ok(runners)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_formation_is_equilateral() {
        let chasers = triangular_formation(Vec2::new(500.0, 500.0), 100.0, 3);
        assert_eq!(chasers.len(), 3);
        let d01 = chasers[0].pos.distance(chasers[1].pos);
        let d12 = chasers[1].pos.distance(chasers[2].pos);
        let d20 = chasers[2].pos.distance(chasers[0].pos);
        assert!((d01 - d12).abs() < 1e-3);
        assert!((d12 - d20).abs() < 1e-3);
    }

    #[test]
    fn test_runners_spawn_outside_sense_radius() {
        let mut rng = StdRng::seed_from_u64(21);
        let params = SimParams::default();
        let chasers = triangular_formation(
            params.arena.center(),
            params.chaser.formation_radius,
            params.chaser.count,
        );
        let runners = spawn_runners(&params, &chasers, &mut rng).unwrap();
        assert_eq!(runners.len(), params.runner.count);
        for r in &runners {
            for c in &chasers {
                assert!(c.pos.distance(r.pos) >= params.arena.sense_radius);
            }
        }
    }

    #[test]
    fn test_spawn_fails_when_impossible() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut params = SimParams::default();
        params.arena.sense_radius = 10_000.0;
        let chasers = triangular_formation(params.arena.center(), 100.0, 3);
        let err = spawn_runners(&params, &chasers, &mut rng).unwrap_err();
        assert!(matches!(err, SimulationError::SpawnFailed { .. }));
    }
}
