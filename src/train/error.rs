//! Error conditions callers need to tell apart
//!
//! Everything fallible returns `anyhow::Result`; the variants here travel
//! inside `anyhow::Error` and are recovered with `downcast_ref`.

use thiserror::Error;

use super::scheduler::Phase;

/// Process exit status when the simulator went away
pub const EXIT_ENVIRONMENT_CLOSED: i32 = 3;

/// Process exit status for rejected configurations
pub const EXIT_INVALID_CONFIG: i32 = 2;

/// Training errors with defined handling
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrainError {
    /// The environment reported that it was closed. Nothing can continue.
    #[error("environment closed during {phase}")]
    EnvironmentClosed {
        /// Phase that observed the close
        phase: Phase,
    },

    /// A hyperparameter or run option is invalid
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Checkpoints exist and the restart policy is `Abort`
    #[error("run {0:?} already has checkpoints; continue or restart it explicitly")]
    RunExists(String),
}

impl TrainError {
    /// Whether this error must terminate the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrainError::EnvironmentClosed { .. })
    }
}

/// Exit status a binary should use for `err`
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<TrainError>() {
        Some(TrainError::EnvironmentClosed { .. }) => EXIT_ENVIRONMENT_CLOSED,
        Some(TrainError::InvalidConfig(_)) | Some(TrainError::RunExists(_)) => EXIT_INVALID_CONFIG,
        None => 1,
    }
}
