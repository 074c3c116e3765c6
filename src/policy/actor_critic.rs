//! Gaussian actor-critic agent with random network distillation
//!
//! Two-layer tanh MLP body shared by a Gaussian action head (state-independent
//! log standard deviation) and two value heads, one per reward stream. The
//! intrinsic reward of a state is the squared error of a trained predictor
//! network against a fixed, randomly initialized target network.
//!
//! θ_old lives in its own `VarStore` and is refreshed by copying values, so
//! it never aliases the parameters being optimized.

use std::{
    f64::consts::PI,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tch::{
    nn::{self, Init, Module, OptimizerConfig},
    Device, Kind, Tensor,
};
use tracing::{debug, info};

use super::{PolicyAgent, Prediction};
use crate::{
    buffer::Minibatch,
    train::{
        config::TrainConfig,
        stats::{EpisodeSummary, TrainingStats},
    },
};

const CHECKPOINT_PREFIX: &str = "checkpoint_";
const RND_TARGET_FILE: &str = "rnd_target.ot";

/// Architecture and objective weights of [`ActorCritic`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Hidden layer width
    pub hidden_dim: i64,

    /// Output width of the RND target and predictor
    pub rnd_dim: i64,

    /// Initial action standard deviation
    pub initial_std: f64,

    /// Weight of extrinsic advantages in the policy objective
    pub extrinsic_coeff: f64,

    /// Weight of intrinsic advantages in the policy objective
    pub intrinsic_coeff: f64,

    /// Maximum gradient norm for clipping
    pub max_grad_norm: f64,

    /// Directory checkpoints are written to
    pub checkpoint_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            hidden_dim: 256,
            rnd_dim: 64,
            initial_std: 0.1,
            extrinsic_coeff: 1.0,
            intrinsic_coeff: 0.0,
            max_grad_norm: 0.5,
            checkpoint_dir: PathBuf::from("models/lane_follow"),
        }
    }
}

/// Counters stored next to each checkpoint
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointMeta {
    episode_idx: u64,
    train_step_idx: u64,
}

struct PolicyNet {
    body: nn::Sequential,
    mean: nn::Linear,
    extrinsic_value: nn::Linear,
    intrinsic_value: nn::Linear,
    log_std: Tensor,
}

impl PolicyNet {
    fn new(p: &nn::Path, obs_dim: i64, action_dim: i64, config: &AgentConfig) -> Self {
        let hidden = nn::LinearConfig {
            ws_init: Init::Orthogonal { gain: 2.0_f64.sqrt() },
            ..Default::default()
        };
        let output = nn::LinearConfig { ws_init: Init::Orthogonal { gain: 0.01 }, ..Default::default() };
        let value = nn::LinearConfig { ws_init: Init::Orthogonal { gain: 1.0 }, ..Default::default() };

        let body = nn::seq()
            .add(nn::linear(p / "fc1", obs_dim, config.hidden_dim, hidden))
            .add_fn(|x| x.tanh())
            .add(nn::linear(p / "fc2", config.hidden_dim, config.hidden_dim, hidden))
            .add_fn(|x| x.tanh());

        Self {
            body,
            mean: nn::linear(p / "mean", config.hidden_dim, action_dim, output),
            extrinsic_value: nn::linear(p / "extrinsic_value", config.hidden_dim, 1, value),
            intrinsic_value: nn::linear(p / "intrinsic_value", config.hidden_dim, 1, value),
            log_std: p.var("log_std", &[action_dim], Init::Const(config.initial_std.ln())),
        }
    }

    /// Returns (action mean, extrinsic value, intrinsic value)
    fn forward(&self, obs: &Tensor) -> (Tensor, Tensor, Tensor) {
        let features = self.body.forward(obs);
        (
            self.mean.forward(&features),
            self.extrinsic_value.forward(&features).squeeze_dim(-1),
            self.intrinsic_value.forward(&features).squeeze_dim(-1),
        )
    }

    /// Diagonal Gaussian log-density of `actions`, summed over action dims
    fn log_prob(&self, mean: &Tensor, actions: &Tensor) -> Tensor {
        let z = (actions - mean) / self.log_std.exp();
        (z.square() * -0.5 - &self.log_std - 0.5 * (2.0 * PI).ln())
            .sum_dim_intlist(-1, false, Kind::Float)
    }

    fn entropy(&self) -> Tensor {
        (&self.log_std + 0.5 + 0.5 * (2.0 * PI).ln()).sum(Kind::Float)
    }
}

fn rnd_net(p: nn::Path, obs_dim: i64, config: &AgentConfig) -> nn::Sequential {
    let init = nn::LinearConfig { ws_init: Init::Orthogonal { gain: 2.0_f64.sqrt() }, ..Default::default() };
    nn::seq()
        .add(nn::linear(&p / "fc1", obs_dim, config.hidden_dim, init))
        .add_fn(|x| x.relu())
        .add(nn::linear(&p / "fc2", config.hidden_dim, config.rnd_dim, init))
}

/// Clipped surrogate objective
///
/// Returns (policy_loss, clip_fraction, approx_kl)
///
/// ```text
/// r = exp(log π_θ(a|s) - log π_θ_old(a|s))
/// L = -mean(min(r A, clip(r, 1-ε, 1+ε) A))
/// ```
fn clipped_surrogate(
    log_probs: &Tensor,
    old_log_probs: &Tensor,
    advantages: &Tensor,
    clip_epsilon: f64,
) -> Result<(Tensor, f64, f64)> {
    let ratio = (log_probs - old_log_probs).exp();
    let clipped = ratio.clamp(1.0 - clip_epsilon, 1.0 + clip_epsilon);
    let policy_loss = -(advantages * &ratio).minimum(&(advantages * clipped)).mean(Kind::Float);

    let clip_fraction = (&ratio - 1.0).abs().gt(clip_epsilon).to_kind(Kind::Float).mean(Kind::Float);
    let approx_kl = (old_log_probs - log_probs).mean(Kind::Float);

    Ok((policy_loss, f64::try_from(&clip_fraction)?, f64::try_from(&approx_kl)?))
}

/// PPO actor-critic agent backed by libtorch
pub struct ActorCritic {
    vs: nn::VarStore,
    old_vs: nn::VarStore,
    target_vs: nn::VarStore,
    policy: PolicyNet,
    old_policy: PolicyNet,
    rnd_predictor: nn::Sequential,
    rnd_target: nn::Sequential,
    optimizer: nn::Optimizer,
    train_config: TrainConfig,
    config: AgentConfig,
    obs_dim: i64,
    action_dim: i64,
    device: Device,
    episode_idx: u64,
    train_step_idx: u64,
}

impl ActorCritic {
    /// Create a freshly initialized agent
    ///
    /// # Arguments
    ///
    /// * `obs_dim` - Encoded state width
    /// * `action_dim` - Action width
    /// * `train_config` - Learning rate, clipping and loss scales
    /// * `config` - Architecture, objective weights and checkpoint location
    pub fn new(obs_dim: usize, action_dim: usize, train_config: &TrainConfig, config: AgentConfig) -> Result<Self> {
        let device = Device::cuda_if_available();
        info!("ActorCritic using device: {:?}", device);
        let obs_dim = i64::try_from(obs_dim)?;
        let action_dim = i64::try_from(action_dim)?;

        let vs = nn::VarStore::new(device);
        let policy = PolicyNet::new(&(vs.root() / "policy"), obs_dim, action_dim, &config);
        let rnd_predictor = rnd_net(vs.root() / "rnd_predictor", obs_dim, &config);

        let mut old_vs = nn::VarStore::new(device);
        let old_policy = PolicyNet::new(&(old_vs.root() / "policy"), obs_dim, action_dim, &config);
        old_vs.copy(&vs)?;
        old_vs.freeze();

        let mut target_vs = nn::VarStore::new(device);
        let rnd_target = rnd_net(target_vs.root() / "rnd_target", obs_dim, &config);
        target_vs.freeze();

        let optimizer = nn::Adam::default().build(&vs, train_config.learning_rate)?;

        Ok(Self {
            vs,
            old_vs,
            target_vs,
            policy,
            old_policy,
            rnd_predictor,
            rnd_target,
            optimizer,
            train_config: train_config.clone(),
            config,
            obs_dim,
            action_dim,
            device,
            episode_idx: 0,
            train_step_idx: 0,
        })
    }

    /// Get the device this agent is on (CPU or CUDA)
    pub fn device(&self) -> Device {
        self.device
    }

    fn rows(&self, rows: &[Vec<f32>], width: i64) -> Result<Tensor> {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Ok(Tensor::from_slice(&flat).view([i64::try_from(rows.len())?, width]).to_device(self.device))
    }

    fn column(&self, values: &[f32]) -> Tensor {
        Tensor::from_slice(values).to_device(self.device)
    }

    fn rnd_error(&self, obs: &Tensor) -> Tensor {
        let target = self.rnd_target.forward(obs).detach();
        (self.rnd_predictor.forward(obs) - target).square().mean_dim(-1, false, Kind::Float)
    }

    fn checkpoint_dir(&self) -> &Path {
        &self.config.checkpoint_dir
    }

    fn checkpoint_path(&self, episode_idx: u64, extension: &str) -> PathBuf {
        self.checkpoint_dir().join(format!("{}{:06}.{}", CHECKPOINT_PREFIX, episode_idx, extension))
    }

    /// Episode indices of all checkpoints on disk, ascending
    fn checkpoint_episodes(&self) -> Result<Vec<u64>> {
        let dir = self.checkpoint_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut episodes = Vec::new();
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            let episode = name
                .to_str()
                .and_then(|n| n.strip_prefix(CHECKPOINT_PREFIX))
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<u64>().ok());
            episodes.extend(episode);
        }
        episodes.sort_unstable();
        Ok(episodes)
    }
}

impl PolicyAgent for ActorCritic {
    fn predict(&mut self, state: &[f32], greedy: bool) -> Result<Prediction> {
        let obs = Tensor::from_slice(state).view([1, self.obs_dim]).to_device(self.device);
        let (mean, extrinsic_value, intrinsic_value) = tch::no_grad(|| self.policy.forward(&obs));

        let action = if greedy {
            mean
        } else {
            let std = self.policy.log_std.exp().detach();
            &mean + mean.randn_like() * std
        };

        Ok(Prediction {
            action: Vec::<f32>::try_from(&action.squeeze_dim(0).to_device(Device::Cpu))?,
            extrinsic_value: f32::try_from(&extrinsic_value.squeeze())?,
            intrinsic_value: f32::try_from(&intrinsic_value.squeeze())?,
        })
    }

    fn train(&mut self, batch: &Minibatch) -> Result<TrainingStats> {
        let states = self.rows(&batch.states, self.obs_dim)?;
        let actions = self.rows(&batch.actions, self.action_dim)?;
        let extrinsic_returns = self.column(&batch.extrinsic_returns);
        let intrinsic_returns = self.column(&batch.intrinsic_returns);
        let advantages = self.column(&batch.extrinsic_advantages) * self.config.extrinsic_coeff
            + self.column(&batch.intrinsic_advantages) * self.config.intrinsic_coeff;

        let old_log_probs = tch::no_grad(|| {
            let (old_mean, _, _) = self.old_policy.forward(&states);
            self.old_policy.log_prob(&old_mean, &actions)
        });

        let (mean, extrinsic_values, intrinsic_values) = self.policy.forward(&states);
        let log_probs = self.policy.log_prob(&mean, &actions);
        let (policy_loss, clip_fraction, approx_kl) =
            clipped_surrogate(&log_probs, &old_log_probs, &advantages, self.train_config.clip_epsilon)?;

        let value_loss = (extrinsic_values - extrinsic_returns).square().mean(Kind::Float)
            + (intrinsic_values - intrinsic_returns).square().mean(Kind::Float);
        let entropy = self.policy.entropy();
        let rnd_loss = self.rnd_error(&states).mean(Kind::Float);

        let total_loss = &policy_loss + &value_loss * self.train_config.value_loss_scale
            - &entropy * self.train_config.entropy_scale
            + &rnd_loss;

        self.optimizer.zero_grad();
        total_loss.backward();
        self.optimizer.clip_grad_norm(self.config.max_grad_norm);
        self.optimizer.step();
        self.train_step_idx += 1;

        Ok(TrainingStats::single(
            f64::try_from(&policy_loss)?,
            f64::try_from(&value_loss)?,
            f64::try_from(&entropy)?,
            f64::try_from(&rnd_loss)?,
            f64::try_from(&total_loss)?,
            clip_fraction,
            approx_kl,
        ))
    }

    fn update_old_policy(&mut self) -> Result<()> {
        self.old_vs.copy(&self.vs)?;
        Ok(())
    }

    fn intrinsic_reward(&mut self, states: &[Vec<f32>]) -> Result<Vec<f32>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let obs = self.rows(states, self.obs_dim)?;
        let error = tch::no_grad(|| self.rnd_error(&obs));
        Ok(Vec::<f32>::try_from(&error.to_device(Device::Cpu))?)
    }

    fn episode_idx(&self) -> u64 {
        self.episode_idx
    }

    fn train_step_idx(&self) -> u64 {
        self.train_step_idx
    }

    fn end_episode(&mut self, summary: &EpisodeSummary) -> Result<()> {
        self.episode_idx = summary.episode_idx + 1;
        let lr = self.train_config.learning_rate_at(self.episode_idx);
        self.optimizer.set_lr(lr);
        debug!("Episode counter {} (lr {:.3e})", self.episode_idx, lr);
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        let dir = self.checkpoint_dir().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let target = dir.join(RND_TARGET_FILE);
        if !target.exists() {
            self.target_vs.save(&target)?;
        }
        self.vs.save(self.checkpoint_path(self.episode_idx, "ot"))?;

        let meta = CheckpointMeta { episode_idx: self.episode_idx, train_step_idx: self.train_step_idx };
        fs::write(self.checkpoint_path(self.episode_idx, "json"), serde_json::to_string_pretty(&meta)?)?;
        info!("Saved checkpoint {} to {}", self.episode_idx, dir.display());
        Ok(())
    }

    fn has_checkpoint(&self) -> bool {
        self.checkpoint_episodes().map(|episodes| !episodes.is_empty()).unwrap_or(false)
    }

    fn load_latest_checkpoint(&mut self) -> Result<()> {
        let episode = self
            .checkpoint_episodes()?
            .last()
            .copied()
            .with_context(|| format!("no checkpoint in {}", self.checkpoint_dir().display()))?;

        let meta: CheckpointMeta =
            serde_json::from_str(&fs::read_to_string(self.checkpoint_path(episode, "json"))?)?;
        self.vs.load(self.checkpoint_path(episode, "ot"))?;
        let target = self.checkpoint_dir().join(RND_TARGET_FILE);
        if target.exists() {
            self.target_vs.load(&target)?;
        }
        self.old_vs.copy(&self.vs)?;

        self.episode_idx = meta.episode_idx;
        self.train_step_idx = meta.train_step_idx;
        self.optimizer.set_lr(self.train_config.learning_rate_at(self.episode_idx));
        Ok(())
    }

    fn clear_checkpoints(&mut self) -> Result<()> {
        let dir = self.checkpoint_dir().to_path_buf();
        if !dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_ours = path.file_name().and_then(|n| n.to_str()).is_some_and(|n| {
                n.starts_with(CHECKPOINT_PREFIX) || n == RND_TARGET_FILE
            });
            if is_ours {
                fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(dir: &Path) -> ActorCritic {
        let config = AgentConfig { hidden_dim: 16, rnd_dim: 8, checkpoint_dir: dir.to_path_buf(), ..Default::default() };
        ActorCritic::new(4, 2, &TrainConfig::default().learning_rate(1e-2), config).unwrap()
    }

    fn minibatch(n: usize) -> Minibatch {
        Minibatch {
            states: (0..n).map(|i| vec![i as f32 * 0.1, 1.0, -0.5, 0.2]).collect(),
            actions: (0..n).map(|i| vec![0.05 * i as f32, -0.1]).collect(),
            extrinsic_returns: vec![1.0; n],
            intrinsic_returns: vec![0.5; n],
            extrinsic_advantages: (0..n).map(|i| i as f32 - 1.5).collect(),
            intrinsic_advantages: vec![0.0; n],
        }
    }

    fn old_matches_live(agent: &ActorCritic) -> bool {
        let live = agent.vs.variables();
        agent
            .old_vs
            .variables()
            .iter()
            .all(|(name, old)| live.get(name).is_some_and(|t| t.allclose(old, 1e-6, 1e-6, false)))
    }

    #[test]
    fn test_predict_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(dir.path());
        let prediction = agent.predict(&[0.1, 0.2, 0.3, 0.4], false).unwrap();
        assert_eq!(prediction.action.len(), 2);
        assert!(prediction.extrinsic_value.is_finite());
        assert!(prediction.intrinsic_value.is_finite());
    }

    #[test]
    fn test_greedy_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(dir.path());
        let state = [0.5, -0.5, 0.0, 1.0];
        let a = agent.predict(&state, true).unwrap();
        let b = agent.predict(&state, true).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_old_policy_is_independent_copy() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(dir.path());
        agent.update_old_policy().unwrap();
        assert!(old_matches_live(&agent));

        let stats = agent.train(&minibatch(4)).unwrap();
        assert_eq!(stats.num_updates, 1);
        assert_eq!(agent.train_step_idx(), 1);
        assert!(!old_matches_live(&agent), "θ_old must not follow the live parameters");

        agent.update_old_policy().unwrap();
        assert!(old_matches_live(&agent));
    }

    #[test]
    fn test_intrinsic_reward_per_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(dir.path());
        let states = minibatch(5).states;
        let rewards = agent.intrinsic_reward(&states).unwrap();
        assert_eq!(rewards.len(), 5);
        assert!(rewards.iter().all(|r| *r >= 0.0 && r.is_finite()));
        assert!(agent.intrinsic_reward(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(dir.path());
        assert!(!agent.has_checkpoint());

        agent.train(&minibatch(4)).unwrap();
        agent.episode_idx = 3;
        agent.save().unwrap();
        assert!(agent.has_checkpoint());
        let state = [0.3, 0.1, -0.2, 0.9];
        let before = agent.predict(&state, true).unwrap();

        let mut restored = self::agent(dir.path());
        restored.load_latest_checkpoint().unwrap();
        assert_eq!(restored.episode_idx(), 3);
        assert_eq!(restored.train_step_idx(), 1);
        assert_eq!(restored.predict(&state, true).unwrap(), before);

        restored.clear_checkpoints().unwrap();
        assert!(!restored.has_checkpoint());
    }
}
