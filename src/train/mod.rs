//! Training loop
//!
//! This module turns a [`PolicyAgent`](crate::policy::PolicyAgent) and an
//! [`Environment`](crate::env::Environment) into a PPO training run:
//! rollout collection, advantage estimation, epoch training, periodic saves
//! and greedy evaluations.

pub mod config;
pub mod error;
pub mod evaluate;
pub mod rollout;
pub mod scheduler;
pub mod stats;

pub use config::{RestartPolicy, RunOptions, TrainConfig};
pub use error::{exit_code, TrainError};
pub use evaluate::evaluate;
pub use rollout::{Rollout, RolloutCollector};
pub use scheduler::{train, Phase, StopHandle, TrainingScheduler};
pub use stats::{EpisodeSummary, EvalSummary, RunSummary, TrainingStats};
