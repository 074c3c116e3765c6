//! Policy agent interface
//!
//! The training loop talks to the policy/value model only through the
//! [`PolicyAgent`] trait: inference, minibatch training, the θ_old snapshot,
//! intrinsic reward, progress counters and persistence. A libtorch-backed
//! implementation lives in [`actor_critic`] behind the `training` feature.

use anyhow::Result;

use crate::{buffer::sampling::Minibatch, train::stats::{EpisodeSummary, TrainingStats}};

/// Output of a single policy query
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Action to take
    pub action: Vec<f32>,

    /// Extrinsic value estimate of the queried state
    pub extrinsic_value: f32,

    /// Intrinsic value estimate of the queried state
    pub intrinsic_value: f32,
}

/// Policy and value model driven by the training loop
pub trait PolicyAgent {
    /// Query the policy for one state
    ///
    /// With `greedy` the mode of the action distribution is returned instead
    /// of a sample.
    fn predict(&mut self, state: &[f32], greedy: bool) -> Result<Prediction>;

    /// Run one gradient update on a minibatch
    ///
    /// Advances the train step counter.
    fn train(&mut self, batch: &Minibatch) -> Result<TrainingStats>;

    /// Copy the current parameters into the θ_old snapshot
    ///
    /// The snapshot must be an independent copy, not an alias of the live
    /// parameters.
    fn update_old_policy(&mut self) -> Result<()>;

    /// Raw (unnormalized) intrinsic reward for each state
    fn intrinsic_reward(&mut self, states: &[Vec<f32>]) -> Result<Vec<f32>>;

    /// Index of the current episode
    fn episode_idx(&self) -> u64;

    /// Number of gradient updates performed so far
    fn train_step_idx(&self) -> u64;

    /// Record the end of a training episode and advance the episode counter
    fn end_episode(&mut self, summary: &EpisodeSummary) -> Result<()>;

    /// Persist parameters and counters
    fn save(&mut self) -> Result<()>;

    /// Whether a previous run left checkpoints behind
    fn has_checkpoint(&self) -> bool;

    /// Restore parameters and counters from the most recent checkpoint
    fn load_latest_checkpoint(&mut self) -> Result<()>;

    /// Delete every checkpoint of this run
    fn clear_checkpoints(&mut self) -> Result<()>;
}

#[cfg(feature = "training")]
pub mod actor_critic;
