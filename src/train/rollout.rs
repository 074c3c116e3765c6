//! Rollout collection
//!
//! Runs the stochastic policy against the environment for up to `horizon`
//! steps and records one [`Transition`] per step.

use anyhow::Result;
use tracing::trace;

use super::{error::TrainError, scheduler::Phase};
use crate::{
    buffer::{Trajectory, Transition},
    env::{Environment, RenderMode},
    policy::PolicyAgent,
};

/// Output of one [`RolloutCollector::collect`] call
#[derive(Debug, Clone)]
pub struct Rollout {
    /// Recorded transitions, at most `horizon` of them
    pub trajectory: Trajectory,

    /// State following the last transition
    ///
    /// Used to bootstrap both value streams; the caller resets the
    /// environment instead when the trajectory ends the episode.
    pub final_state: Vec<f32>,

    /// Sum of extrinsic rewards
    pub total_reward: f64,

    /// Sum of extrinsic value estimates
    pub total_value: f64,
}

impl Rollout {
    /// Number of environment steps taken
    pub fn len(&self) -> usize {
        self.trajectory.len()
    }

    /// Check if no step was taken
    pub fn is_empty(&self) -> bool {
        self.trajectory.is_empty()
    }
}

/// Collects fixed-horizon rollouts
#[derive(Debug, Clone, Copy)]
pub struct RolloutCollector {
    horizon: usize,
}

impl RolloutCollector {
    /// Create a collector for rollouts of up to `horizon` steps
    pub fn new(horizon: usize) -> Self {
        assert!(horizon > 0, "horizon must be positive");
        Self { horizon }
    }

    /// Maximum rollout length
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Collect one rollout starting from `initial_state`
    ///
    /// Stops after `horizon` steps or at the first terminal step. Each step
    /// pushes the HUD lines for `episode_idx`, samples an action, steps the
    /// environment and refreshes the display.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::EnvironmentClosed`] as soon as a step reports
    /// that the environment was closed; that step is not recorded.
    pub fn collect<E, A>(
        &self,
        env: &mut E,
        agent: &mut A,
        initial_state: Vec<f32>,
        episode_idx: u64,
    ) -> Result<Rollout>
    where
        E: Environment + ?Sized,
        A: PolicyAgent + ?Sized,
    {
        let mut trajectory = Trajectory::with_horizon(self.horizon);
        let mut state = initial_state;
        let mut total_reward = 0.0;
        let mut total_value = 0.0;

        while !trajectory.is_full() {
            env.push_hud(format!("Episode {}", episode_idx));
            env.push_hud("Training...".to_string());
            env.push_hud(String::new());

            let prediction = agent.predict(&state, false)?;
            let step = env.step(&prediction.action)?;
            if step.info.closed {
                return Err(TrainError::EnvironmentClosed { phase: Phase::RolloutCollecting }.into());
            }
            env.render(RenderMode::Human)?;

            total_reward += f64::from(step.reward);
            total_value += f64::from(prediction.extrinsic_value);
            trace!(reward = step.reward, terminal = step.terminal, "step");

            trajectory.push(Transition {
                state: std::mem::replace(&mut state, step.state),
                action: prediction.action,
                extrinsic_value: prediction.extrinsic_value,
                intrinsic_value: prediction.intrinsic_value,
                extrinsic_reward: step.reward,
                done: step.terminal,
            });

            if step.terminal {
                break;
            }
        }

        Ok(Rollout { trajectory, final_state: state, total_reward, total_value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffer::Minibatch,
        env::{ActionSpace, Frame, StepInfo, StepResult},
        policy::Prediction,
        train::stats::{EpisodeSummary, TrainingStats},
    };

    /// Counts up; terminal after `episode_len` steps, closed at `close_at`
    struct Counter {
        t: usize,
        episode_len: usize,
        close_at: Option<usize>,
        hud: Vec<String>,
        renders: usize,
    }

    impl Counter {
        fn new(episode_len: usize) -> Self {
            Self { t: 0, episode_len, close_at: None, hud: Vec::new(), renders: 0 }
        }
    }

    impl Environment for Counter {
        fn reset(&mut self) -> Result<Vec<f32>> {
            self.t = 0;
            Ok(vec![0.0])
        }

        fn step(&mut self, action: &[f32]) -> Result<StepResult> {
            self.t += 1;
            Ok(StepResult {
                state: vec![self.t as f32],
                reward: action[0],
                terminal: self.t >= self.episode_len,
                info: StepInfo { closed: self.close_at == Some(self.t) },
            })
        }

        fn render(&mut self, _mode: RenderMode) -> Result<Frame> {
            self.renders += 1;
            Ok(Frame::blank(1, 1))
        }

        fn action_space(&self) -> ActionSpace {
            ActionSpace { low: vec![-1.0], high: vec![1.0] }
        }

        fn push_hud(&mut self, line: String) {
            self.hud.push(line);
        }
    }

    /// Always acts 1.0 and values a state by its first feature
    struct Echo;

    impl PolicyAgent for Echo {
        fn predict(&mut self, state: &[f32], _greedy: bool) -> Result<Prediction> {
            Ok(Prediction { action: vec![1.0], extrinsic_value: state[0], intrinsic_value: 0.5 })
        }
        fn train(&mut self, _batch: &Minibatch) -> Result<TrainingStats> {
            Ok(TrainingStats::zeros())
        }
        fn update_old_policy(&mut self) -> Result<()> {
            Ok(())
        }
        fn intrinsic_reward(&mut self, states: &[Vec<f32>]) -> Result<Vec<f32>> {
            Ok(vec![0.0; states.len()])
        }
        fn episode_idx(&self) -> u64 {
            7
        }
        fn train_step_idx(&self) -> u64 {
            0
        }
        fn end_episode(&mut self, _summary: &EpisodeSummary) -> Result<()> {
            Ok(())
        }
        fn save(&mut self) -> Result<()> {
            Ok(())
        }
        fn has_checkpoint(&self) -> bool {
            false
        }
        fn load_latest_checkpoint(&mut self) -> Result<()> {
            Ok(())
        }
        fn clear_checkpoints(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_full_horizon() {
        let mut env = Counter::new(100);
        let state = env.reset().unwrap();
        let rollout = RolloutCollector::new(4).collect(&mut env, &mut Echo, state, 7).unwrap();

        assert_eq!(rollout.len(), 4);
        assert!(!rollout.trajectory.ends_episode());
        assert_eq!(rollout.final_state, vec![4.0]);
        assert_eq!(rollout.total_reward, 4.0);
        // values are predicted from the state *before* each step
        assert_eq!(rollout.trajectory.extrinsic_values(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(
            rollout.trajectory.states(),
            vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]]
        );
        assert_eq!(env.renders, 4);
    }

    #[test]
    fn test_terminal_cuts_rollout_short() {
        let mut env = Counter::new(3);
        let state = env.reset().unwrap();
        let rollout = RolloutCollector::new(128).collect(&mut env, &mut Echo, state, 7).unwrap();

        assert_eq!(rollout.len(), 3);
        assert!(rollout.trajectory.ends_episode());
        assert_eq!(rollout.trajectory.dones(), vec![false, false, true]);
    }

    #[test]
    fn test_closed_environment_is_fatal() {
        let mut env = Counter::new(100);
        env.close_at = Some(2);
        let state = env.reset().unwrap();
        let err = RolloutCollector::new(8).collect(&mut env, &mut Echo, state, 7).unwrap_err();

        assert_eq!(
            err.downcast_ref::<TrainError>(),
            Some(&TrainError::EnvironmentClosed { phase: Phase::RolloutCollecting })
        );
        // no further interaction after the close
        assert_eq!(env.t, 2);
        assert_eq!(env.renders, 1);
    }

    #[test]
    fn test_hud_lines_per_step() {
        let mut env = Counter::new(2);
        let state = env.reset().unwrap();
        RolloutCollector::new(8).collect(&mut env, &mut Echo, state, 7).unwrap();

        assert_eq!(env.hud, vec!["Episode 7", "Training...", "", "Episode 7", "Training...", ""]);
    }
}
