//! Environment traits and implementations
//!
//! This module defines the interface the training loop uses to drive a
//! simulator, plus a small kinematic vehicle environment for running the loop
//! end to end.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Core trait for vehicle-control environments
///
/// States are already encoded feature vectors; environments that render raw
/// frames run them through a [`encoder::StateEncoder`] before returning them.
pub trait Environment {
    /// Reset the environment and return the initial encoded state
    fn reset(&mut self) -> Result<Vec<f32>>;

    /// Advance the simulation by one control step
    fn step(&mut self, action: &[f32]) -> Result<StepResult>;

    /// Render the current scene
    fn render(&mut self, mode: RenderMode) -> Result<Frame>;

    /// Get the continuous action space
    fn action_space(&self) -> ActionSpace;

    /// Append a line to the heads-up display text overlay
    ///
    /// Purely diagnostic; environments without a display ignore it.
    fn push_hud(&mut self, _line: String) {}
}

/// Result of an environment step
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Next encoded state
    pub state: Vec<f32>,

    /// Extrinsic reward received
    pub reward: f32,

    /// Whether the episode reached a terminal state
    pub terminal: bool,

    /// Additional info
    pub info: StepInfo,
}

/// Additional step information
#[derive(Debug, Clone, Default)]
pub struct StepInfo {
    /// The simulator window or connection was closed; nothing can continue
    pub closed: bool,
}

/// How a frame should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Refresh the interactive display (if any)
    Human,

    /// Return pixel data for recording
    RgbArray,
}

/// A rendered frame, row-major RGB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Width in pixels
    pub width: usize,

    /// Height in pixels
    pub height: usize,

    /// Pixel data, `height * width * 3` bytes
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Create an all-black frame
    pub fn blank(width: usize, height: usize) -> Self {
        Self { width, height, pixels: vec![0; width * height * 3] }
    }

    /// Set one pixel, ignoring coordinates outside the frame
    pub fn put(&mut self, x: isize, y: isize, rgb: [u8; 3]) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        let offset = (y as usize * self.width + x as usize) * 3;
        self.pixels[offset..offset + 3].copy_from_slice(&rgb);
    }

    /// Per-pixel intensity in [0, 1], averaged over channels
    pub fn intensities(&self) -> Vec<f32> {
        self.pixels
            .chunks_exact(3)
            .map(|px| px.iter().map(|&c| c as f32).sum::<f32>() / (3.0 * 255.0))
            .collect()
    }
}

/// Bounds of a continuous action space
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpace {
    /// Lower bound per action dimension
    pub low: Vec<f32>,

    /// Upper bound per action dimension
    pub high: Vec<f32>,
}

impl ActionSpace {
    /// Number of action dimensions
    pub fn dim(&self) -> usize {
        self.low.len()
    }

    /// Clamp an action into the space
    pub fn clip(&self, action: &[f32]) -> Vec<f32> {
        action
            .iter()
            .zip(self.low.iter().zip(&self.high))
            .map(|(&a, (&lo, &hi))| a.clamp(lo, hi))
            .collect()
    }
}

pub mod encoder;
pub mod lane_follow;
