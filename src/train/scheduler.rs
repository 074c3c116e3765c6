//! Episode-level training loop
//!
//! The scheduler owns the environment, the agent, the running intrinsic
//! normalizer and the shuffle RNG. Each episode walks through the phases
//!
//! ```text
//! Saving? -> Evaluating? -> (RolloutCollecting -> AdvantageComputing -> EpochTraining)+
//!         -> EpisodeBookkeeping
//! ```
//!
//! where the first two only run on their cadence episodes and the rollout
//! cycle repeats until a rollout ends in a terminal step.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{ensure, Result};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{
    config::{RunOptions, TrainConfig},
    evaluate::evaluate,
    rollout::{Rollout, RolloutCollector},
    stats::{EpisodeSummary, EvalSummary, RunSummary, TrainingStats},
};
use crate::{
    buffer::{estimate_advantages, generate_minibatch_indices, Bootstrap, TrainingBatch},
    env::Environment,
    policy::PolicyAgent,
    record::{JsonlRecorderFactory, RecorderFactory, RecordingSession},
    utils::RunningMeanVar,
};

/// Step of the per-episode state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    /// Persisting parameters
    Saving,
    /// Running a greedy evaluation episode
    Evaluating,
    /// Stepping the environment with the stochastic policy
    RolloutCollecting,
    /// Bootstrapping and computing both advantage streams
    AdvantageComputing,
    /// Minibatch gradient updates
    EpochTraining,
    /// Reporting and advancing the episode counter
    EpisodeBookkeeping,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Saving => "saving",
            Phase::Evaluating => "evaluation",
            Phase::RolloutCollecting => "rollout collection",
            Phase::AdvantageComputing => "advantage computation",
            Phase::EpochTraining => "epoch training",
            Phase::EpisodeBookkeeping => "episode bookkeeping",
        };
        f.write_str(name)
    }
}

/// Cooperative stop signal for an unbounded run
///
/// Checked once per episode boundary; the episode in flight completes.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Create a handle that has not been triggered
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop after the current episode
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives PPO training of one agent in one environment
pub struct TrainingScheduler<E, A> {
    env: E,
    agent: A,
    config: TrainConfig,
    options: RunOptions,
    collector: RolloutCollector,
    normalizer: RunningMeanVar,
    rng: StdRng,
    recorder_factory: Option<Box<dyn RecorderFactory>>,
    stop: StopHandle,
    phase: Option<Phase>,
}

impl<E: Environment, A: PolicyAgent> TrainingScheduler<E, A> {
    /// Create a scheduler
    ///
    /// Validates `config` and `options`, then resolves the restart policy
    /// against any existing checkpoints. No environment call is made here.
    ///
    /// # Arguments
    ///
    /// * `env` - Environment to train in
    /// * `agent` - Policy agent to train
    /// * `config` - Training hyperparameters
    /// * `options` - Run bookkeeping options
    pub fn new(env: E, mut agent: A, config: TrainConfig, options: RunOptions) -> Result<Self> {
        config.validate()?;
        options.validate()?;
        options.restart.apply(&mut agent, &options.run_name)?;

        let recorder_factory: Option<Box<dyn RecorderFactory>> = if options.record_eval {
            Some(Box::new(JsonlRecorderFactory::new(options.video_dir())))
        } else {
            None
        };

        Ok(Self {
            env,
            agent,
            collector: RolloutCollector::new(config.horizon),
            normalizer: RunningMeanVar::new(),
            rng: StdRng::seed_from_u64(config.seed),
            recorder_factory,
            stop: StopHandle::new(),
            phase: None,
            config,
            options,
        })
    }

    /// Replace where evaluation recordings go
    ///
    /// Ignored when recording is disabled in the run options.
    pub fn with_recorder_factory(mut self, factory: Box<dyn RecorderFactory>) -> Self {
        if self.options.record_eval {
            self.recorder_factory = Some(factory);
        }
        self
    }

    /// Use an existing stop signal instead of the scheduler's own
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Handle that stops [`run`](Self::run) at the next episode boundary
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Phase currently executing, `None` outside [`run`](Self::run)
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    /// Running intrinsic-return statistics
    pub fn normalizer(&self) -> &RunningMeanVar {
        &self.normalizer
    }

    /// Get reference to the agent
    pub fn agent(&self) -> &A {
        &self.agent
    }

    /// Get reference to the environment
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Get the configuration
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Give back the environment and agent
    pub fn into_parts(self) -> (E, A) {
        (self.env, self.agent)
    }

    /// Run episodes until the budget is spent or a stop is requested
    ///
    /// With `num_episodes == 0` only the [`StopHandle`] ends the run.
    pub fn run(&mut self) -> Result<RunSummary> {
        info!(
            "Starting run {} at episode {} (budget {})",
            self.options.run_name,
            self.agent.episode_idx(),
            self.config.num_episodes
        );

        let mut episodes_completed = 0;
        let stopped = loop {
            if self.stop.is_stop_requested() {
                break true;
            }
            if !self.within_budget() {
                break false;
            }
            let result = self.run_episode();
            self.phase = None;
            result?;
            episodes_completed += 1;
        };

        let summary = RunSummary {
            episodes_completed,
            final_episode_idx: self.agent.episode_idx(),
            train_steps: self.agent.train_step_idx(),
            stopped,
        };
        info!(
            "Run {} finished: {} episodes, {} train steps{}",
            self.options.run_name,
            summary.episodes_completed,
            summary.train_steps,
            if stopped { " (stopped)" } else { "" }
        );
        Ok(summary)
    }

    fn enter(&mut self, phase: Phase) {
        debug!(%phase, "phase");
        self.phase = Some(phase);
    }

    fn within_budget(&self) -> bool {
        self.config.num_episodes == 0 || self.agent.episode_idx() < self.config.num_episodes
    }

    /// Run one full training episode, including its save and evaluation
    pub fn run_episode(&mut self) -> Result<EpisodeSummary> {
        let episode_idx = self.agent.episode_idx();

        if self.options.is_save_episode(episode_idx) {
            self.enter(Phase::Saving);
            self.agent.save()?;
            debug!("Saved checkpoint at episode {}", episode_idx);
        }

        if self.options.is_eval_episode(episode_idx) {
            let eval = self.evaluate()?;
            info!(
                "Eval at episode {}: reward {:.3} over {} steps ({} frames recorded)",
                eval.episode_idx, eval.total_reward, eval.steps, eval.frames_recorded
            );
        }

        let mut state = self.env.reset()?;
        info!("Episode {} (Step {})", episode_idx, self.agent.train_step_idx());

        let mut total_reward = 0.0;
        let mut total_value = 0.0;
        let mut steps = 0;
        let mut rollouts = 0;
        let mut stats = TrainingStats::zeros();

        loop {
            self.enter(Phase::RolloutCollecting);
            let rollout = self.collector.collect(&mut self.env, &mut self.agent, state, episode_idx)?;

            debug!("Rollout of {} steps (terminal: {})", rollout.len(), rollout.trajectory.ends_episode());
            self.enter(Phase::AdvantageComputing);
            let batch = self.compute_advantages(&rollout)?;

            self.enter(Phase::EpochTraining);
            let update = self.train_epochs(&batch)?;
            stats = stats.merge_averages(&update);

            total_reward += rollout.total_reward;
            total_value += rollout.total_value;
            steps += rollout.len();
            rollouts += 1;

            let ended = rollout.trajectory.ends_episode();
            state = rollout.final_state;
            if ended {
                break;
            }
        }

        self.enter(Phase::EpisodeBookkeeping);
        let summary = EpisodeSummary { episode_idx, total_reward, total_value, steps, rollouts, stats };
        info!(
            "Episode {} done: reward {:.3}, {} steps in {} rollouts, policy loss {:.4}, value loss {:.4}",
            episode_idx,
            summary.total_reward,
            summary.steps,
            summary.rollouts,
            summary.stats.policy_loss,
            summary.stats.value_loss
        );
        self.agent.end_episode(&summary)?;
        Ok(summary)
    }

    /// Run one greedy evaluation episode at the current episode index
    ///
    /// Recording failures to open are logged and the evaluation runs
    /// unrecorded.
    pub fn evaluate(&mut self) -> Result<EvalSummary> {
        self.enter(Phase::Evaluating);
        let episode_idx = self.agent.episode_idx();
        let recording = match self.recorder_factory.as_mut().map(|f| f.open(episode_idx)) {
            Some(Ok(recorder)) => Some(RecordingSession::new(recorder)),
            Some(Err(e)) => {
                warn!("Evaluation at episode {} will not be recorded: {:#}", episode_idx, e);
                None
            }
            None => None,
        };
        evaluate(&mut self.env, &mut self.agent, episode_idx, recording)
    }

    /// Bootstrap, score intrinsic rewards and compute both advantage streams
    fn compute_advantages(&mut self, rollout: &Rollout) -> Result<TrainingBatch> {
        let bootstrap = self.agent.predict(&rollout.final_state, false)?;
        let bootstrap = Bootstrap {
            extrinsic: bootstrap.extrinsic_value,
            intrinsic: bootstrap.intrinsic_value,
        };

        let raw_intrinsic = self.agent.intrinsic_reward(&rollout.trajectory.states())?;
        ensure!(
            raw_intrinsic.len() == rollout.len(),
            "agent returned {} intrinsic rewards for {} states",
            raw_intrinsic.len(),
            rollout.len()
        );

        let advantages = estimate_advantages(
            &rollout.trajectory,
            bootstrap,
            &raw_intrinsic,
            &mut self.normalizer,
            self.config.gae_params(),
        );
        Ok(TrainingBatch::new(&rollout.trajectory, advantages))
    }

    /// Snapshot θ_old, then run `num_epochs` shuffled passes over `batch`
    fn train_epochs(&mut self, batch: &TrainingBatch) -> Result<TrainingStats> {
        self.agent.update_old_policy()?;

        let mut stats = TrainingStats::zeros();
        for _ in 0..self.config.num_epochs {
            for indices in generate_minibatch_indices(batch.len(), self.config.batch_size, &mut self.rng) {
                stats += &self.agent.train(&batch.minibatch(&indices))?;
            }
        }
        Ok(stats.average())
    }
}

/// Train `agent` in `env` and return when the run ends
///
/// Logs the hyperparameters, validates everything and resolves the restart
/// policy before the first environment call.
///
/// # Errors
///
/// Configuration problems surface as [`TrainError::InvalidConfig`] or
/// [`TrainError::RunExists`]; a closed environment as
/// [`TrainError::EnvironmentClosed`].
///
/// [`TrainError::InvalidConfig`]: super::TrainError::InvalidConfig
/// [`TrainError::RunExists`]: super::TrainError::RunExists
/// [`TrainError::EnvironmentClosed`]: super::TrainError::EnvironmentClosed
pub fn train<E: Environment, A: PolicyAgent>(
    env: E,
    agent: A,
    config: &TrainConfig,
    options: &RunOptions,
) -> Result<RunSummary> {
    info!("Hyperparameters:\n{}", serde_json::to_string_pretty(config)?);
    info!("Run options:\n{}", serde_json::to_string_pretty(options)?);

    let mut scheduler = TrainingScheduler::new(env, agent, config.clone(), options.clone())?;
    scheduler.run()
}
