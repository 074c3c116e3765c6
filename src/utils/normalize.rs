//! Running variance tracking for intrinsic reward scaling
//!
//! Intrinsic rewards produced by a novelty model drift in magnitude as the
//! predictor learns. Dividing them by a lifetime running standard deviation
//! keeps the intrinsic stream on a stable scale across the whole run.

/// Variances below this are treated as degenerate when computing a scale.
pub const MIN_VARIANCE: f64 = 1e-8;

/// Running mean and variance of a scalar stream
///
/// Tracks statistics using Welford's online algorithm, so arbitrarily long
/// streams are supported without storing history. The accumulator is meant
/// to live for an entire training run: it is never reset between rollouts or
/// episodes.
#[derive(Debug, Clone, Default)]
pub struct RunningMeanVar {
    count: u64,
    mean: f64,
    /// Sum of squared deviations from the running mean
    m2: f64,
}

impl RunningMeanVar {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Incorporate one sample
    pub fn update(&mut self, sample: f64) {
        self.count += 1;
        let delta = sample - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = sample - self.mean;
        self.m2 += delta * delta2;
    }

    /// Incorporate samples one at a time, in order
    pub fn update_all<I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = f64>,
    {
        for sample in samples {
            self.update(sample);
        }
    }

    /// Population variance over every sample seen so far
    ///
    /// Returns 0.0 before the first sample.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.m2 / self.count as f64
    }

    /// Divisor used to rescale raw samples
    ///
    /// The standard deviation, or 1.0 while the variance is still degenerate
    /// (no samples yet, a single sample, or a constant stream).
    pub fn scale(&self) -> f64 {
        let variance = self.variance();
        if variance < MIN_VARIANCE {
            1.0
        } else {
            variance.sqrt()
        }
    }

    /// Rescale raw values by the current standard deviation
    pub fn normalize(&self, values: &[f32]) -> Vec<f32> {
        let scale = self.scale();
        values.iter().map(|&v| (v as f64 / scale) as f32).collect()
    }

    /// Get current mean
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Get number of samples seen
    pub fn count(&self) -> u64 {
        self.count
    }
}
