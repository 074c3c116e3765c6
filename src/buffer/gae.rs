//! Generalized Advantage Estimation (GAE) computation
//!
//! Advantages are computed for two streams from the same trajectory:
//!
//! - the **extrinsic** stream uses the trajectory's terminal flags, so credit
//!   assignment stops at episode boundaries;
//! - the **intrinsic** stream treats every step as non-terminal. Novelty is
//!   not episodic, so its credit keeps flowing across resets.
//!
//! Each advantage vector is then standardized independently.

use super::trajectory::Trajectory;
use crate::utils::RunningMeanVar;

/// Added to the standard deviation when standardizing advantages
pub const ADVANTAGE_EPSILON: f32 = 1e-8;

/// Compute Generalized Advantage Estimation (GAE)
///
/// Iterates backward from the last step:
///
/// ```text
/// V_next = bootstrap_value if t == T-1 else values[t+1]
/// δ_t    = r_t + γ * V_next * (1 - done_t) - V_t
/// A_t    = δ_t + γ * λ * (1 - done_t) * A_{t+1}        (A_T = 0)
/// R_t    = A_t + V_t
/// ```
///
/// # Arguments
/// * `rewards` - Rewards per step
/// * `values` - Value estimates per step
/// * `bootstrap_value` - Value estimate of the state after the last step
/// * `dones` - Terminal flags per step
/// * `gamma` - Discount factor
/// * `gae_lambda` - GAE lambda parameter
///
/// # Returns
/// (advantages, returns), both of length T
pub fn gae(
    rewards: &[f32],
    values: &[f32],
    bootstrap_value: f32,
    dones: &[bool],
    gamma: f32,
    gae_lambda: f32,
) -> (Vec<f32>, Vec<f32>) {
    let num_steps = rewards.len();
    debug_assert!(num_steps > 0, "GAE is undefined for an empty trajectory");
    debug_assert_eq!(values.len(), num_steps);
    debug_assert_eq!(dones.len(), num_steps);

    let mut advantages = vec![0.0; num_steps];
    let mut returns = vec![0.0; num_steps];
    let mut last_gae = 0.0;

    for t in (0..num_steps).rev() {
        let next_value = if t == num_steps - 1 { bootstrap_value } else { values[t + 1] };
        let non_terminal = if dones[t] { 0.0 } else { 1.0 };

        let delta = rewards[t] + gamma * next_value * non_terminal - values[t];
        last_gae = delta + gamma * gae_lambda * non_terminal * last_gae;

        advantages[t] = last_gae;
        returns[t] = last_gae + values[t];
    }

    (advantages, returns)
}

/// Standardize values in place to zero mean and unit variance
///
/// Uses the population standard deviation plus [`ADVANTAGE_EPSILON`], so a
/// constant vector becomes all zeros instead of dividing by zero.
pub fn standardize(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt() + ADVANTAGE_EPSILON as f64;

    for v in values.iter_mut() {
        *v = ((*v as f64 - mean) / std) as f32;
    }
}

/// Discounted cumulative sum: `y_t = x_t + γ * y_{t+1}`
pub fn discount(values: &[f32], gamma: f32) -> Vec<f32> {
    let mut discounted = vec![0.0; values.len()];
    let mut running = 0.0;
    for t in (0..values.len()).rev() {
        running = values[t] + gamma * running;
        discounted[t] = running;
    }
    discounted
}

/// Discount parameters for both streams
#[derive(Debug, Clone, Copy)]
pub struct GaeParams {
    /// Discount factor (gamma)
    pub gamma: f32,

    /// GAE lambda parameter
    pub gae_lambda: f32,

    /// Discount applied to intrinsic rewards before updating the running
    /// variance
    pub intrinsic_discount: f32,
}

/// Advantages and returns for one reward stream
#[derive(Debug, Clone, Default)]
pub struct StreamEstimate {
    /// Standardized advantages [T]
    pub advantages: Vec<f32>,

    /// Returns [T]
    pub returns: Vec<f32>,
}

impl StreamEstimate {
    /// Run GAE and standardize the resulting advantages
    pub fn compute(
        rewards: &[f32],
        values: &[f32],
        bootstrap_value: f32,
        dones: &[bool],
        gamma: f32,
        gae_lambda: f32,
    ) -> Self {
        let (mut advantages, returns) = gae(rewards, values, bootstrap_value, dones, gamma, gae_lambda);
        standardize(&mut advantages);
        Self { advantages, returns }
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.advantages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.advantages.is_empty()
    }
}

/// Per-stream advantages and returns for one rollout
#[derive(Debug, Clone, Default)]
pub struct AdvantageBuffer {
    /// Task reward stream
    pub extrinsic: StreamEstimate,

    /// Exploration reward stream
    pub intrinsic: StreamEstimate,

    /// Intrinsic rewards after running-variance scaling [T]
    pub intrinsic_rewards: Vec<f32>,
}

impl AdvantageBuffer {
    /// Number of steps (T)
    pub fn len(&self) -> usize {
        self.extrinsic.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.extrinsic.is_empty()
    }
}

/// Bootstrap value estimates of the state following a trajectory
#[derive(Debug, Clone, Copy, Default)]
pub struct Bootstrap {
    /// Extrinsic value estimate
    pub extrinsic: f32,

    /// Intrinsic value estimate
    pub intrinsic: f32,
}

/// Compute both advantage streams for a trajectory
///
/// `raw_intrinsic_rewards` are discounted along the step axis and each
/// discounted value is fed to `normalizer` in order; the raw rewards are then
/// divided by the normalizer's running standard deviation before GAE.
///
/// # Panics
///
/// Panics if `raw_intrinsic_rewards` does not have one entry per transition.
pub fn estimate_advantages(
    trajectory: &Trajectory,
    bootstrap: Bootstrap,
    raw_intrinsic_rewards: &[f32],
    normalizer: &mut RunningMeanVar,
    params: GaeParams,
) -> AdvantageBuffer {
    let num_steps = trajectory.len();
    assert_eq!(
        raw_intrinsic_rewards.len(),
        num_steps,
        "intrinsic rewards must match trajectory length"
    );

    let extrinsic = StreamEstimate::compute(
        &trajectory.extrinsic_rewards(),
        &trajectory.extrinsic_values(),
        bootstrap.extrinsic,
        &trajectory.dones(),
        params.gamma,
        params.gae_lambda,
    );

    for value in discount(raw_intrinsic_rewards, params.intrinsic_discount) {
        normalizer.update(value as f64);
    }
    let intrinsic_rewards = normalizer.normalize(raw_intrinsic_rewards);

    let never_done = vec![false; num_steps];
    let intrinsic = StreamEstimate::compute(
        &intrinsic_rewards,
        &trajectory.intrinsic_values(),
        bootstrap.intrinsic,
        &never_done,
        params.gamma,
        params.gae_lambda,
    );

    AdvantageBuffer { extrinsic, intrinsic, intrinsic_rewards }
}
