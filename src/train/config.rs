//! Training configuration and run options
//!
//! [`TrainConfig`] holds the hyperparameters of the learning problem,
//! [`RunOptions`] the bookkeeping of one run (where it writes, how often it
//! saves and evaluates, what happens to earlier checkpoints). Both validate
//! before any environment interaction and both load from JSON.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::TrainError;
use crate::{buffer::GaeParams, env::encoder::EncoderConfig, policy::PolicyAgent};

fn invalid(message: &str) -> anyhow::Error {
    TrainError::InvalidConfig(message.to_string()).into()
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Hyperparameters of a PPO training run
///
/// Default values match the settings the lane-following agent was tuned
/// with. Missing fields in a JSON file fall back to these defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Initial learning rate
    pub learning_rate: f64,

    /// Per-episode multiplicative learning-rate decay
    pub lr_decay: f64,

    /// Discount factor (gamma)
    pub discount_factor: f64,

    /// GAE lambda parameter
    pub gae_lambda: f64,

    /// PPO clipping parameter (epsilon)
    pub clip_epsilon: f64,

    /// Value function loss coefficient
    pub value_loss_scale: f64,

    /// Entropy bonus coefficient
    pub entropy_scale: f64,

    /// Maximum transitions per rollout
    pub horizon: usize,

    /// Passes over each rollout
    pub num_epochs: usize,

    /// Episode budget; 0 trains until stopped
    pub num_episodes: u64,

    /// Minibatch size
    pub batch_size: usize,

    /// Discount used when feeding intrinsic rewards to the running variance
    pub intrinsic_discount: f64,

    /// Seed for minibatch shuffling
    pub seed: u64,

    /// State encoder selection
    pub encoder: EncoderConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            lr_decay: 1.0,
            discount_factor: 0.99,
            gae_lambda: 0.95,
            clip_epsilon: 0.2,
            value_loss_scale: 1.0,
            entropy_scale: 0.01,
            horizon: 128,
            num_epochs: 3,
            num_episodes: 0,
            batch_size: 32,
            intrinsic_discount: 0.99,
            seed: 0,
            encoder: EncoderConfig::default(),
        }
    }
}

impl TrainConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }

    /// Validate configuration parameters
    ///
    /// Failures carry [`TrainError::InvalidConfig`].
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) {
            return Err(invalid("learning_rate must be positive"));
        }
        if !(self.lr_decay > 0.0 && self.lr_decay <= 1.0) {
            return Err(invalid("lr_decay must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return Err(invalid("discount_factor must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(invalid("gae_lambda must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.intrinsic_discount) {
            return Err(invalid("intrinsic_discount must be in [0, 1]"));
        }
        if !(self.clip_epsilon > 0.0) {
            return Err(invalid("clip_epsilon must be positive"));
        }
        if !(self.value_loss_scale >= 0.0) {
            return Err(invalid("value_loss_scale must be non-negative"));
        }
        if !(self.entropy_scale >= 0.0) {
            return Err(invalid("entropy_scale must be non-negative"));
        }
        if self.horizon == 0 {
            return Err(invalid("horizon must be positive"));
        }
        if self.num_epochs == 0 {
            return Err(invalid("num_epochs must be positive"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be positive"));
        }
        self.encoder.resolve()?;
        Ok(())
    }

    /// Discount parameters for advantage estimation
    pub fn gae_params(&self) -> GaeParams {
        GaeParams {
            gamma: self.discount_factor as f32,
            gae_lambda: self.gae_lambda as f32,
            intrinsic_discount: self.intrinsic_discount as f32,
        }
    }

    /// Learning rate in effect during `episode_idx`
    ///
    /// ```text
    /// lr(e) = learning_rate * lr_decay^e
    /// ```
    pub fn learning_rate_at(&self, episode_idx: u64) -> f64 {
        let exponent = i32::try_from(episode_idx).unwrap_or(i32::MAX);
        self.learning_rate * self.lr_decay.powi(exponent)
    }

    /// Set learning rate
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set learning-rate decay
    pub fn lr_decay(mut self, decay: f64) -> Self {
        self.lr_decay = decay;
        self
    }

    /// Set discount factor
    pub fn discount_factor(mut self, gamma: f64) -> Self {
        self.discount_factor = gamma;
        self
    }

    /// Set GAE lambda
    pub fn gae_lambda(mut self, lambda: f64) -> Self {
        self.gae_lambda = lambda;
        self
    }

    /// Set PPO clipping parameter
    pub fn clip_epsilon(mut self, clip: f64) -> Self {
        self.clip_epsilon = clip;
        self
    }

    /// Set value function loss coefficient
    pub fn value_loss_scale(mut self, scale: f64) -> Self {
        self.value_loss_scale = scale;
        self
    }

    /// Set entropy bonus coefficient
    pub fn entropy_scale(mut self, scale: f64) -> Self {
        self.entropy_scale = scale;
        self
    }

    /// Set rollout horizon
    pub fn horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    /// Set number of training epochs
    pub fn num_epochs(mut self, epochs: usize) -> Self {
        self.num_epochs = epochs;
        self
    }

    /// Set episode budget (0 = unbounded)
    pub fn num_episodes(mut self, episodes: u64) -> Self {
        self.num_episodes = episodes;
        self
    }

    /// Set minibatch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set intrinsic reward discount
    pub fn intrinsic_discount(mut self, gamma: f64) -> Self {
        self.intrinsic_discount = gamma;
        self
    }

    /// Set shuffle seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set encoder selection
    pub fn encoder(mut self, encoder: EncoderConfig) -> Self {
        self.encoder = encoder;
        self
    }
}

/// What to do with checkpoints a previous run left behind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
    /// Load the latest checkpoint and keep counting from it
    #[default]
    Continue,

    /// Delete existing checkpoints and start from scratch
    Restart,

    /// Refuse to touch an existing run
    Abort,
}

impl RestartPolicy {
    /// Prepare `agent` for a run named `run_name`
    ///
    /// Does nothing when no checkpoint exists.
    pub fn apply<A: PolicyAgent + ?Sized>(self, agent: &mut A, run_name: &str) -> Result<()> {
        if !agent.has_checkpoint() {
            return Ok(());
        }
        match self {
            RestartPolicy::Continue => {
                agent.load_latest_checkpoint()?;
                info!(
                    "Resuming run {} at episode {} (step {})",
                    run_name,
                    agent.episode_idx(),
                    agent.train_step_idx()
                );
            }
            RestartPolicy::Restart => {
                warn!("Discarding existing checkpoints of run {}", run_name);
                agent.clear_checkpoints()?;
            }
            RestartPolicy::Abort => return Err(TrainError::RunExists(run_name.to_string()).into()),
        }
        Ok(())
    }
}

/// Bookkeeping options of a single run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Name of the run; checkpoints and recordings live under it
    pub run_name: String,

    /// Save every this many episodes
    pub save_interval: u64,

    /// Evaluate every this many episodes
    pub eval_interval: u64,

    /// Record evaluation frames
    pub record_eval: bool,

    /// Handling of existing checkpoints
    pub restart: RestartPolicy,

    /// Root directory for run artifacts
    pub output_dir: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            run_name: "lane_follow".to_string(),
            save_interval: 5,
            eval_interval: 5,
            record_eval: true,
            restart: RestartPolicy::default(),
            output_dir: PathBuf::from("models"),
        }
    }
}

impl RunOptions {
    /// Create options for a named run
    pub fn new(run_name: impl Into<String>) -> Self {
        Self { run_name: run_name.into(), ..Self::default() }
    }

    /// Load options from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }

    /// Validate run options
    pub fn validate(&self) -> Result<()> {
        if self.run_name.trim().is_empty() {
            return Err(invalid("run_name must not be empty"));
        }
        if self.save_interval == 0 {
            return Err(invalid("save_interval must be positive"));
        }
        if self.eval_interval == 0 {
            return Err(invalid("eval_interval must be positive"));
        }
        Ok(())
    }

    /// Directory holding this run's artifacts
    pub fn run_dir(&self) -> PathBuf {
        self.output_dir.join(&self.run_name)
    }

    /// Directory evaluation recordings are written to
    pub fn video_dir(&self) -> PathBuf {
        self.run_dir().join("videos")
    }

    /// Whether an episode index falls on the save cadence
    pub fn is_save_episode(&self, episode_idx: u64) -> bool {
        self.save_interval > 0 && episode_idx % self.save_interval == 0
    }

    /// Whether an episode index falls on the evaluation cadence
    pub fn is_eval_episode(&self, episode_idx: u64) -> bool {
        self.eval_interval > 0 && episode_idx % self.eval_interval == 0
    }

    /// Set save interval
    pub fn save_interval(mut self, interval: u64) -> Self {
        self.save_interval = interval;
        self
    }

    /// Set evaluation interval
    pub fn eval_interval(mut self, interval: u64) -> Self {
        self.eval_interval = interval;
        self
    }

    /// Enable or disable evaluation recording
    pub fn record_eval(mut self, record: bool) -> Self {
        self.record_eval = record;
        self
    }

    /// Set restart policy
    pub fn restart(mut self, policy: RestartPolicy) -> Self {
        self.restart = policy;
        self
    }

    /// Set output directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_invalid(result: Result<()>) -> bool {
        matches!(
            result.as_ref().err().and_then(|e| e.downcast_ref::<TrainError>()),
            Some(TrainError::InvalidConfig(_))
        )
    }

    #[test]
    fn test_default_config() {
        let config = TrainConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.horizon, 128);
        assert_eq!(config.num_epochs, 3);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.num_episodes, 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(is_invalid(TrainConfig::new().learning_rate(0.0).validate()));
        assert!(is_invalid(TrainConfig::new().learning_rate(f64::NAN).validate()));
        assert!(is_invalid(TrainConfig::new().discount_factor(1.5).validate()));
        assert!(is_invalid(TrainConfig::new().gae_lambda(-0.1).validate()));
        assert!(is_invalid(TrainConfig::new().intrinsic_discount(2.0).validate()));
        assert!(is_invalid(TrainConfig::new().clip_epsilon(0.0).validate()));
        assert!(is_invalid(TrainConfig::new().entropy_scale(-1.0).validate()));
        assert!(is_invalid(TrainConfig::new().value_loss_scale(-1.0).validate()));
        assert!(is_invalid(TrainConfig::new().horizon(0).validate()));
        assert!(is_invalid(TrainConfig::new().num_epochs(0).validate()));
        assert!(is_invalid(TrainConfig::new().batch_size(0).validate()));
        assert!(is_invalid(TrainConfig::new().lr_decay(0.0).validate()));

        // Edges of the closed intervals are fine
        assert!(TrainConfig::new().discount_factor(1.0).gae_lambda(0.0).validate().is_ok());
        assert!(TrainConfig::new().entropy_scale(0.0).validate().is_ok());
    }

    #[test]
    fn test_learning_rate_schedule() {
        let config = TrainConfig::new().learning_rate(1e-3).lr_decay(0.5);
        assert_eq!(config.learning_rate_at(0), 1e-3);
        assert!((config.learning_rate_at(3) - 1.25e-4).abs() < 1e-12);

        let constant = TrainConfig::new();
        assert_eq!(constant.learning_rate_at(1000), constant.learning_rate);
    }

    #[test]
    fn test_run_options_validation() {
        assert!(RunOptions::default().validate().is_ok());
        assert!(is_invalid(RunOptions::default().save_interval(0).validate()));
        assert!(is_invalid(RunOptions::default().eval_interval(0).validate()));
        assert!(is_invalid(RunOptions::new("  ").validate()));
    }

    #[test]
    fn test_cadence() {
        let options = RunOptions::default().save_interval(5).eval_interval(2);
        let saves: Vec<u64> = (0..11).filter(|&e| options.is_save_episode(e)).collect();
        let evals: Vec<u64> = (0..7).filter(|&e| options.is_eval_episode(e)).collect();
        assert_eq!(saves, vec![0, 5, 10]);
        assert_eq!(evals, vec![0, 2, 4, 6]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "horizon": 64, "encoder": { "model": "mlp_zdim16" } }"#).unwrap();

        let config = TrainConfig::from_json_file(&path).unwrap();
        assert_eq!(config.horizon, 64);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.encoder.model, "mlp_zdim16");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_run_options_json() {
        let options: RunOptions =
            serde_json::from_str(r#"{ "run_name": "wide", "restart": "abort" }"#).unwrap();
        assert_eq!(options.restart, RestartPolicy::Abort);
        assert_eq!(options.save_interval, 5);
        assert_eq!(options.video_dir(), PathBuf::from("models/wide/videos"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(TrainConfig::from_json_file("/nonexistent/config.json").is_err());
    }
}
