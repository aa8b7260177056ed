use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use super::agent::Agent;

/// An agent that picks a uniformly random heading every tick.
pub struct RandomAgent {
    num_actions: usize,
    rng: StdRng,
}

impl RandomAgent {
    pub fn new(num_actions: usize) -> Self {
        RandomAgent {
            num_actions,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn with_seed(num_actions: usize, seed: u64) -> Self {
        RandomAgent {
            num_actions,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Agent for RandomAgent {
    fn select_action(&mut self, _state: &[f32], _training: bool) -> usize {
        assert!(self.num_actions > 0, "No actions available");
        self.rng.random_range(0..self.num_actions)
    }

    fn name(&self) -> &str {
        "Random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_agent_selects_valid_action() {
        let mut agent = RandomAgent::new(8);
        let state = vec![0.0; 12];
        for _ in 0..100 {
            let action = agent.select_action(&state, false);
            assert!(action < 8, "Action {} is out of range", action);
        }
    }

    #[test]
    fn test_random_agent_covers_all_actions() {
        let mut agent = RandomAgent::with_seed(4, 42);
        let mut seen = [false; 4];
        for _ in 0..200 {
            seen[agent.select_action(&[], true)] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_random_agent_has_no_value_estimate() {
        let agent = RandomAgent::new(8);
        assert_eq!(agent.name(), "Random");
        assert!(agent.max_q_value(&[0.0; 12]).is_none());
    }
}
