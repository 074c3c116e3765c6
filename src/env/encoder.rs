//! State encoders
//!
//! Encoders compress a rendered camera frame into a fixed-length latent vector
//! and append the vehicle's control measurements. The concrete encoder is
//! chosen at configuration time through [`EncoderConfig`].

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Frame;
use crate::train::error::TrainError;

/// Number of measurements appended after the latent features
/// (steer, throttle, speed)
pub const NUM_MEASUREMENTS: usize = 3;

/// Raw observation handed to an encoder
#[derive(Debug, Clone)]
pub struct RawObservation<'a> {
    /// Camera frame
    pub frame: &'a Frame,

    /// Vehicle measurements: steer, throttle, speed
    pub measurements: [f32; NUM_MEASUREMENTS],
}

/// Maps a raw observation to a fixed-length feature vector
pub trait StateEncoder {
    /// Encode one observation
    fn encode(&self, observation: &RawObservation<'_>) -> Vec<f32>;

    /// Length of every encoded vector
    fn dim(&self) -> usize;
}

/// Which encoder family to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    /// Treats the frame as a flat vector
    #[serde(alias = "mlp")]
    Flat,

    /// Keeps the 2D layout of the frame
    #[serde(alias = "cnn")]
    Grid,
}

/// Encoder-specific settings
///
/// `kind` and `z_dim` may be left unset and are then inferred from the model
/// name, e.g. `bce_cnn_zdim64_beta1` resolves to a grid encoder with 64
/// latent dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Model name
    pub model: String,

    /// Encoder family
    pub kind: Option<EncoderKind>,

    /// Latent dimensionality
    pub z_dim: Option<usize>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self { model: "bce_cnn_zdim64_beta1_kl_tolerance0.0_data".to_string(), kind: None, z_dim: None }
    }
}

impl EncoderConfig {
    /// Fill in unset fields from the model name
    pub fn resolve(&self) -> Result<ResolvedEncoder> {
        let z_dim = match self.z_dim {
            Some(z) => z,
            None => parse_zdim(&self.model).ok_or_else(|| {
                TrainError::InvalidConfig(format!(
                    "cannot infer z_dim from encoder model name {:?}",
                    self.model
                ))
            })?,
        };
        if z_dim == 0 {
            anyhow::bail!(TrainError::InvalidConfig("encoder z_dim must be positive".into()));
        }

        let kind = self.kind.unwrap_or(if self.model.contains("mlp") {
            EncoderKind::Flat
        } else {
            EncoderKind::Grid
        });

        Ok(ResolvedEncoder { kind, z_dim })
    }

    /// Resolve and instantiate the encoder
    pub fn build(&self) -> Result<Box<dyn StateEncoder>> {
        let resolved = self.resolve()?;
        tracing::debug!(kind = ?resolved.kind, z_dim = resolved.z_dim, "building state encoder");
        Ok(match resolved.kind {
            EncoderKind::Flat => Box::new(FlatEncoder::new(resolved.z_dim)),
            EncoderKind::Grid => Box::new(GridEncoder::new(resolved.z_dim)),
        })
    }
}

/// Encoder settings with every field known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedEncoder {
    /// Encoder family
    pub kind: EncoderKind,

    /// Latent dimensionality
    pub z_dim: usize,
}

fn parse_zdim(model: &str) -> Option<usize> {
    let start = model.find("zdim")? + "zdim".len();
    let digits: String = model[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Average-pools the flattened frame into `z_dim` contiguous bins
#[derive(Debug, Clone)]
pub struct FlatEncoder {
    z_dim: usize,
}

impl FlatEncoder {
    /// Create a flat encoder with `z_dim` latent features
    pub fn new(z_dim: usize) -> Self {
        Self { z_dim }
    }
}

impl StateEncoder for FlatEncoder {
    fn encode(&self, observation: &RawObservation<'_>) -> Vec<f32> {
        let intensities = observation.frame.intensities();
        let n = intensities.len();

        let mut features = Vec::with_capacity(self.dim());
        for k in 0..self.z_dim {
            let (start, end) = (k * n / self.z_dim, (k + 1) * n / self.z_dim);
            features.push(mean(&intensities[start..end]));
        }
        features.extend_from_slice(&observation.measurements);
        features
    }

    fn dim(&self) -> usize {
        self.z_dim + NUM_MEASUREMENTS
    }
}

/// Average-pools the frame over a 2D grid of `rows x cols == z_dim` cells
#[derive(Debug, Clone)]
pub struct GridEncoder {
    rows: usize,
    cols: usize,
}

impl GridEncoder {
    /// Create a grid encoder whose cell count equals `z_dim`
    ///
    /// The grid is as close to square as the factorization of `z_dim` allows.
    pub fn new(z_dim: usize) -> Self {
        let mut rows = (z_dim as f64).sqrt() as usize;
        while rows > 1 && z_dim % rows != 0 {
            rows -= 1;
        }
        let rows = rows.max(1);
        Self { rows, cols: z_dim / rows }
    }

    /// Grid shape (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

impl StateEncoder for GridEncoder {
    fn encode(&self, observation: &RawObservation<'_>) -> Vec<f32> {
        let frame = observation.frame;
        let intensities = frame.intensities();
        let (h, w) = (frame.height, frame.width);

        let mut features = Vec::with_capacity(self.dim());
        for i in 0..self.rows {
            let (y0, y1) = (i * h / self.rows, (i + 1) * h / self.rows);
            for j in 0..self.cols {
                let (x0, x1) = (j * w / self.cols, (j + 1) * w / self.cols);
                let mut sum = 0.0;
                let mut count = 0usize;
                for y in y0..y1 {
                    for x in x0..x1 {
                        sum += intensities[y * w + x];
                        count += 1;
                    }
                }
                features.push(if count == 0 { 0.0 } else { sum / count as f32 });
            }
        }
        features.extend_from_slice(&observation.measurements);
        features
    }

    fn dim(&self) -> usize {
        self.rows * self.cols + NUM_MEASUREMENTS
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}
