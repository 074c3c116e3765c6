//! Trajectory storage
//!
//! A trajectory holds the transitions of one rollout in collection order. It
//! is filled by the rollout collector, read once by advantage estimation and
//! discarded after the training round.

/// One environment step as seen by the learner
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Encoded state the action was taken in
    pub state: Vec<f32>,

    /// Action taken
    pub action: Vec<f32>,

    /// Extrinsic value estimate of `state`
    pub extrinsic_value: f32,

    /// Intrinsic value estimate of `state`
    pub intrinsic_value: f32,

    /// Extrinsic reward received for the step
    pub extrinsic_reward: f32,

    /// Whether the step ended the episode
    pub done: bool,
}

/// Ordered transitions of one rollout
///
/// Holds at most `horizon` transitions. A trajectory shorter than its horizon
/// ended on a terminal step.
#[derive(Debug, Clone)]
pub struct Trajectory {
    horizon: usize,
    transitions: Vec<Transition>,
}

impl Trajectory {
    /// Create an empty trajectory for at most `horizon` steps
    pub fn with_horizon(horizon: usize) -> Self {
        Self { horizon, transitions: Vec::with_capacity(horizon) }
    }

    /// Append a transition
    ///
    /// # Panics
    ///
    /// Panics if the trajectory is already full.
    pub fn push(&mut self, transition: Transition) {
        assert!(
            self.transitions.len() < self.horizon,
            "trajectory already holds {} transitions",
            self.horizon
        );
        self.transitions.push(transition);
    }

    /// Number of collected steps (T)
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Check if no step has been collected
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Whether the horizon has been reached
    pub fn is_full(&self) -> bool {
        self.transitions.len() == self.horizon
    }

    /// Maximum number of steps
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Whether the last step was terminal
    pub fn ends_episode(&self) -> bool {
        self.transitions.last().is_some_and(|t| t.done)
    }

    /// Iterate over transitions in collection order
    pub fn iter(&self) -> std::slice::Iter<'_, Transition> {
        self.transitions.iter()
    }

    /// Encoded states [T, state_dim]
    pub fn states(&self) -> Vec<Vec<f32>> {
        self.transitions.iter().map(|t| t.state.clone()).collect()
    }

    /// Actions [T, action_dim]
    pub fn actions(&self) -> Vec<Vec<f32>> {
        self.transitions.iter().map(|t| t.action.clone()).collect()
    }

    /// Extrinsic rewards [T]
    pub fn extrinsic_rewards(&self) -> Vec<f32> {
        self.transitions.iter().map(|t| t.extrinsic_reward).collect()
    }

    /// Extrinsic value estimates [T]
    pub fn extrinsic_values(&self) -> Vec<f32> {
        self.transitions.iter().map(|t| t.extrinsic_value).collect()
    }

    /// Intrinsic value estimates [T]
    pub fn intrinsic_values(&self) -> Vec<f32> {
        self.transitions.iter().map(|t| t.intrinsic_value).collect()
    }

    /// Terminal flags [T]
    pub fn dones(&self) -> Vec<bool> {
        self.transitions.iter().map(|t| t.done).collect()
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a Transition;
    type IntoIter = std::slice::Iter<'a, Transition>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
