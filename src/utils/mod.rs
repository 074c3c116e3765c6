//! Numerical helpers shared by the training loop

pub mod normalize;

pub use normalize::RunningMeanVar;
