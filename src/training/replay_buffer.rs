use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::ai::Experience;

/// Fixed-capacity ring buffer of chaser transitions. Once full, each push
/// overwrites the oldest entry.
pub struct ReplayBuffer {
    buffer: Vec<Experience>,
    capacity: usize,
    position: usize,
    len: usize,
    rng: StdRng,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self::with_rng(capacity, StdRng::from_os_rng())
    }

    pub fn with_seed(capacity: usize, seed: u64) -> Self {
        Self::with_rng(capacity, StdRng::seed_from_u64(seed))
    }

    fn with_rng(capacity: usize, rng: StdRng) -> Self {
        assert!(capacity > 0, "Replay capacity must be positive");
        ReplayBuffer {
            buffer: Vec::with_capacity(capacity),
            capacity,
            position: 0,
            len: 0,
            rng,
        }
    }

    /// Add an experience to the buffer. Overwrites oldest when full.
    pub fn push(&mut self, experience: Experience) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(experience);
        } else {
            self.buffer[self.position] = experience;
        }
        self.position = (self.position + 1) % self.capacity;
        if self.len < self.capacity {
            self.len += 1;
        }
    }

    /// Sample `batch_size` distinct experiences uniformly at random.
    pub fn sample(&mut self, batch_size: usize) -> Vec<&Experience> {
        assert!(batch_size <= self.len, "Not enough experiences to sample");
        let indices = index::sample(&mut self.rng, self.len, batch_size);
        indices.iter().map(|i| &self.buffer[i]).collect()
    }

    /// Stored experiences, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        let split = if self.len < self.capacity { 0 } else { self.position };
        self.buffer[split..].iter().chain(self.buffer[..split].iter())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn experience(tag: f32) -> Experience {
        Experience {
            state: vec![tag; 4],
            action: 0,
            reward: tag,
            next_state: vec![tag + 1.0; 4],
            done: false,
        }
    }

    #[test]
    fn test_push_and_len() {
        let mut buf = ReplayBuffer::new(10);
        assert!(buf.is_empty());

        buf.push(experience(0.0));
        assert_eq!(buf.len(), 1);

        for i in 0..9 {
            buf.push(experience(i as f32));
        }
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.capacity(), 10);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut buf = ReplayBuffer::new(5);
        for i in 0..23 {
            buf.push(experience(i as f32));
            assert!(buf.len() <= 5);
        }
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_fifo_eviction() {
        let mut buf = ReplayBuffer::new(3);
        for i in 0..4 {
            buf.push(experience(i as f32));
        }
        let rewards: Vec<f32> = buf.iter().map(|e| e.reward).collect();
        assert_eq!(rewards, vec![1.0, 2.0, 3.0]);
        assert!(buf.iter().all(|e| e.reward != 0.0));
    }

    #[test]
    fn test_sample_is_without_replacement() {
        let mut buf = ReplayBuffer::with_seed(100, 7);
        for i in 0..50 {
            buf.push(experience(i as f32));
        }
        let batch = buf.sample(50);
        assert_eq!(batch.len(), 50);
        let mut rewards: Vec<i32> = batch.iter().map(|e| e.reward as i32).collect();
        rewards.sort();
        rewards.dedup();
        assert_eq!(rewards.len(), 50);
    }

    #[test]
    #[should_panic(expected = "Not enough experiences")]
    fn test_sample_too_many() {
        let mut buf = ReplayBuffer::new(10);
        buf.push(experience(0.0));
        buf.sample(5);
    }
}
