//! Rollout storage and advantage estimation
//!
//! This module implements the data path between rollout collection and
//! training:
//! - Trajectory storage (states, actions, rewards, value estimates, dones)
//! - Dual-stream GAE (Generalized Advantage Estimation) computation
//! - Shuffled minibatch partitioning for the epoch loop

pub mod gae;
pub mod sampling;
pub mod trajectory;


pub use gae::{estimate_advantages, AdvantageBuffer, Bootstrap, GaeParams, StreamEstimate};
pub use sampling::{generate_minibatch_indices, Minibatch, TrainingBatch};
pub use trajectory::{Trajectory, Transition};
