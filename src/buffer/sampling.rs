//! Data sampling and batching
//!
//! This module flattens one rollout's data into a [`TrainingBatch`] and
//! partitions it into shuffled minibatches for the epoch loop.

use rand::{seq::SliceRandom, Rng};

use super::{gae::AdvantageBuffer, trajectory::Trajectory};

/// Generate minibatch indices for one epoch
///
/// Draws a fresh uniform permutation of `0..num_samples` and splits it into
/// `ceil(num_samples / batch_size)` consecutive chunks. Every chunk holds
/// `batch_size` indices except the last, which takes the remainder, so every
/// sample appears exactly once.
///
/// # Arguments
/// * `num_samples` - Total number of samples
/// * `batch_size` - Desired size of each minibatch
/// * `rng` - Random source for the permutation
pub fn generate_minibatch_indices<R: Rng + ?Sized>(
    num_samples: usize,
    batch_size: usize,
    rng: &mut R,
) -> Vec<Vec<usize>> {
    assert!(batch_size > 0, "batch_size must be positive");

    let mut indices: Vec<usize> = (0..num_samples).collect();
    indices.shuffle(rng);

    indices.chunks(batch_size).map(|chunk| chunk.to_vec()).collect()
}

/// All per-step training data of one rollout
///
/// Every array has the trajectory's true length T.
#[derive(Debug, Clone)]
pub struct TrainingBatch {
    /// Encoded states [T, state_dim]
    pub states: Vec<Vec<f32>>,

    /// Actions taken [T, action_dim]
    pub actions: Vec<Vec<f32>>,

    /// Extrinsic returns [T]
    pub extrinsic_returns: Vec<f32>,

    /// Intrinsic returns [T]
    pub intrinsic_returns: Vec<f32>,

    /// Standardized extrinsic advantages [T]
    pub extrinsic_advantages: Vec<f32>,

    /// Standardized intrinsic advantages [T]
    pub intrinsic_advantages: Vec<f32>,
}

impl TrainingBatch {
    /// Combine a trajectory with its advantage estimates
    ///
    /// # Panics
    ///
    /// Panics if any array length differs from the trajectory length.
    pub fn new(trajectory: &Trajectory, advantages: AdvantageBuffer) -> Self {
        let batch = Self {
            states: trajectory.states(),
            actions: trajectory.actions(),
            extrinsic_returns: advantages.extrinsic.returns,
            intrinsic_returns: advantages.intrinsic.returns,
            extrinsic_advantages: advantages.extrinsic.advantages,
            intrinsic_advantages: advantages.intrinsic.advantages,
        };

        let t = trajectory.len();
        assert_eq!(batch.actions.len(), t, "actions length mismatch");
        assert_eq!(batch.extrinsic_returns.len(), t, "extrinsic returns length mismatch");
        assert_eq!(batch.intrinsic_returns.len(), t, "intrinsic returns length mismatch");
        assert_eq!(batch.extrinsic_advantages.len(), t, "extrinsic advantages length mismatch");
        assert_eq!(batch.intrinsic_advantages.len(), t, "intrinsic advantages length mismatch");
        batch
    }

    /// Number of samples (T)
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Gather the samples at `indices`
    pub fn minibatch(&self, indices: &[usize]) -> Minibatch {
        Minibatch {
            states: indices.iter().map(|&i| self.states[i].clone()).collect(),
            actions: indices.iter().map(|&i| self.actions[i].clone()).collect(),
            extrinsic_returns: gather(&self.extrinsic_returns, indices),
            intrinsic_returns: gather(&self.intrinsic_returns, indices),
            extrinsic_advantages: gather(&self.extrinsic_advantages, indices),
            intrinsic_advantages: gather(&self.intrinsic_advantages, indices),
        }
    }
}

fn gather(values: &[f32], indices: &[usize]) -> Vec<f32> {
    indices.iter().map(|&i| values[i]).collect()
}

/// Minibatch data for one gradient update
#[derive(Debug, Clone, PartialEq)]
pub struct Minibatch {
    /// Encoded states [batch_size, state_dim]
    pub states: Vec<Vec<f32>>,

    /// Actions [batch_size, action_dim]
    pub actions: Vec<Vec<f32>>,

    /// Extrinsic returns [batch_size]
    pub extrinsic_returns: Vec<f32>,

    /// Intrinsic returns [batch_size]
    pub intrinsic_returns: Vec<f32>,

    /// Extrinsic advantages [batch_size]
    pub extrinsic_advantages: Vec<f32>,

    /// Intrinsic advantages [batch_size]
    pub intrinsic_advantages: Vec<f32>,
}

impl Minibatch {
    /// Get batch size
    pub fn size(&self) -> usize {
        self.states.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{
        gae::{AdvantageBuffer, StreamEstimate},
        trajectory::Transition,
    };
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_partition_with_remainder_covers_every_index_once() {
        let mut rng = StdRng::seed_from_u64(3);
        let batches = generate_minibatch_indices(10, 4, &mut rng);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 4, 2]);

        let mut all: Vec<usize> = batches.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_partition_exact_multiple() {
        let mut rng = StdRng::seed_from_u64(0);
        let batches = generate_minibatch_indices(12, 4, &mut rng);
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() == 4));
    }

    #[test]
    fn test_batch_larger_than_samples() {
        let mut rng = StdRng::seed_from_u64(0);
        let batches = generate_minibatch_indices(3, 32, &mut rng);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
    }

    #[test]
    fn test_permutations_differ_between_epochs() {
        let mut rng = StdRng::seed_from_u64(11);
        let first = generate_minibatch_indices(64, 64, &mut rng);
        let second = generate_minibatch_indices(64, 64, &mut rng);
        assert_ne!(first, second);
    }

    #[test]
    fn test_minibatch_gathers_rows() {
        let mut trajectory = Trajectory::with_horizon(4);
        for i in 0..3 {
            trajectory.push(Transition {
                state: vec![i as f32],
                action: vec![i as f32 * 10.0],
                extrinsic_value: 0.0,
                intrinsic_value: 0.0,
                extrinsic_reward: 0.0,
                done: i == 2,
            });
        }
        let stream = |offset: f32| StreamEstimate {
            advantages: vec![offset, offset + 1.0, offset + 2.0],
            returns: vec![offset + 10.0, offset + 11.0, offset + 12.0],
        };
        let advantages = AdvantageBuffer {
            extrinsic: stream(0.0),
            intrinsic: stream(100.0),
            intrinsic_rewards: vec![0.0; 3],
        };

        let batch = TrainingBatch::new(&trajectory, advantages);
        assert_eq!(batch.len(), 3);

        let mb = batch.minibatch(&[2, 0]);
        assert_eq!(mb.size(), 2);
        assert_eq!(mb.states, vec![vec![2.0], vec![0.0]]);
        assert_eq!(mb.actions, vec![vec![20.0], vec![0.0]]);
        assert_eq!(mb.extrinsic_advantages, vec![2.0, 0.0]);
        assert_eq!(mb.intrinsic_advantages, vec![102.0, 100.0]);
        assert_eq!(mb.extrinsic_returns, vec![12.0, 10.0]);
        assert_eq!(mb.intrinsic_returns, vec![112.0, 110.0]);
    }
}
