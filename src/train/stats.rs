//! Training statistics
//!
//! This module defines structures for tracking gradient-update metrics and
//! the per-episode and per-evaluation summaries the scheduler reports.

use std::ops::AddAssign;

use serde::Serialize;

/// Training statistics for a PPO update
///
/// Tracks metrics from one or more gradient updates. Sums are accumulated
/// with [`TrainingStats::add`] and turned into means with
/// [`TrainingStats::average`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingStats {
    /// Clipped surrogate policy loss
    pub policy_loss: f64,

    /// Combined extrinsic + intrinsic value loss
    pub value_loss: f64,

    /// Policy entropy
    pub entropy: f64,

    /// Intrinsic reward predictor loss
    pub intrinsic_loss: f64,

    /// Total loss that was minimized
    pub total_loss: f64,

    /// Fraction of samples whose probability ratio was clipped
    pub clip_fraction: f64,

    /// Approximate KL divergence between θ_old and θ
    pub approx_kl: f64,

    /// Number of gradient updates these statistics cover
    pub num_updates: usize,
}

impl TrainingStats {
    /// Create zero-initialized statistics
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Statistics of a single gradient update
    pub fn single(
        policy_loss: f64,
        value_loss: f64,
        entropy: f64,
        intrinsic_loss: f64,
        total_loss: f64,
        clip_fraction: f64,
        approx_kl: f64,
    ) -> Self {
        Self {
            policy_loss,
            value_loss,
            entropy,
            intrinsic_loss,
            total_loss,
            clip_fraction,
            approx_kl,
            num_updates: 1,
        }
    }

    /// Add another statistics instance to this one
    pub fn add(&mut self, other: &TrainingStats) {
        self.policy_loss += other.policy_loss;
        self.value_loss += other.value_loss;
        self.entropy += other.entropy;
        self.intrinsic_loss += other.intrinsic_loss;
        self.total_loss += other.total_loss;
        self.clip_fraction += other.clip_fraction;
        self.approx_kl += other.approx_kl;
        self.num_updates += other.num_updates;
    }

    /// Mean of every metric across the accumulated updates
    ///
    /// `num_updates` is preserved so callers can still tell how many
    /// gradient steps the mean covers.
    pub fn average(&self) -> Self {
        if self.num_updates == 0 {
            return Self::zeros();
        }
        let scale = self.num_updates as f64;

        Self {
            policy_loss: self.policy_loss / scale,
            value_loss: self.value_loss / scale,
            entropy: self.entropy / scale,
            intrinsic_loss: self.intrinsic_loss / scale,
            total_loss: self.total_loss / scale,
            clip_fraction: self.clip_fraction / scale,
            approx_kl: self.approx_kl / scale,
            num_updates: self.num_updates,
        }
    }

    /// Combine two averages, weighting each by its update count
    pub fn merge_averages(&self, other: &TrainingStats) -> Self {
        let mut sum = self.weighted();
        sum.add(&other.weighted());
        sum.average()
    }

    fn weighted(&self) -> Self {
        let n = self.num_updates as f64;
        Self {
            policy_loss: self.policy_loss * n,
            value_loss: self.value_loss * n,
            entropy: self.entropy * n,
            intrinsic_loss: self.intrinsic_loss * n,
            total_loss: self.total_loss * n,
            clip_fraction: self.clip_fraction * n,
            approx_kl: self.approx_kl * n,
            num_updates: self.num_updates,
        }
    }
}

impl AddAssign<&TrainingStats> for TrainingStats {
    fn add_assign(&mut self, other: &TrainingStats) {
        self.add(other);
    }
}

/// Outcome of one training episode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeSummary {
    /// Episode index the summary belongs to
    pub episode_idx: u64,

    /// Sum of extrinsic rewards
    pub total_reward: f64,

    /// Sum of extrinsic value estimates along the episode
    pub total_value: f64,

    /// Environment steps taken
    pub steps: usize,

    /// Rollouts the episode was split into
    pub rollouts: usize,

    /// Mean training statistics over the episode's updates
    pub stats: TrainingStats,
}

/// Outcome of one deterministic evaluation rollout
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalSummary {
    /// Episode index the evaluation ran at
    pub episode_idx: u64,

    /// Sum of extrinsic rewards
    pub total_reward: f64,

    /// Environment steps taken
    pub steps: usize,

    /// Frames written to the recording, if any
    pub frames_recorded: usize,
}

/// Outcome of a whole training run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Episodes completed by this call
    pub episodes_completed: u64,

    /// Agent episode counter when the run ended
    pub final_episode_idx: u64,

    /// Agent train step counter when the run ended
    pub train_steps: u64,

    /// Whether the run ended through an external stop request
    pub stopped: bool,
}
