//! # drive-rl
//!
//! PPO training core for continuous-control driving agents
//!
//! The crate drives a [`policy::PolicyAgent`] through an
//! [`env::Environment`] episode by episode: fixed-horizon rollouts, dual-stream
//! (extrinsic + intrinsic) GAE, a lifetime running-variance normalizer for
//! intrinsic rewards, minibatch epoch training, and periodic checkpointing and
//! greedy evaluation.
//!
//! The training loop itself is pure Rust. A libtorch actor-critic agent is
//! available behind the `training` feature.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use drive_rl::prelude::*;
//! # fn run<A: PolicyAgent>(agent: A) -> anyhow::Result<()> {
//! let config = TrainConfig::default().num_episodes(100);
//! let env = LaneFollow::new(config.encoder.build()?, config.seed);
//! let summary = train(env, agent, &config, &RunOptions::new("lane_follow"))?;
//! println!("trained {} episodes", summary.episodes_completed);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Environment traits, state encoders and a lane-following simulator
pub mod env;

/// Policy agent interface and implementations
/// (the libtorch agent requires the training feature)
pub mod policy;

/// Trajectory storage, advantage estimation and minibatching
pub mod buffer;

/// Training loop, configuration and errors
pub mod train;

/// Evaluation recording
pub mod record;

/// Utility functions and helpers
pub mod utils;

/// Prelude module for convenient imports
///
/// This module re-exports commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::{
        env::{encoder::EncoderConfig, lane_follow::LaneFollow, Environment},
        policy::{PolicyAgent, Prediction},
        train::{train, RestartPolicy, RunOptions, RunSummary, StopHandle, TrainConfig, TrainError, TrainingScheduler},
    };

    #[cfg(feature = "training")]
    pub use crate::policy::actor_critic::{ActorCritic, AgentConfig};
}

/// Current version of drive-rl
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
