use serde::{Deserialize, Serialize};

use crate::acquisition::layout::LayoutConfig;
use crate::processing::beamformer::BeamformConfig;
use crate::processing::spectral::SpectralConfig;

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Shared configuration for every processing stage of one pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fast-time sample rate Fs (Hz).
    pub fast_time_rate_hz: f64,
    /// Carrier frequency Fc (Hz).
    pub carrier_hz: f64,
    /// Radar bandwidth B (Hz).
    pub bandwidth_hz: f64,
    /// First frequency of the stepped sweep F0 (Hz).
    pub start_frequency_hz: f64,
    /// Number of frequency steps K in the sweep.
    pub frequency_steps: usize,
    /// Slow-time history length T.
    pub buffer_capacity: usize,
    /// Optional dead-band on the variance vector, percent of its maximum.
    pub variance_threshold_pct: Option<f64>,
    /// EMA smoothing factor of the trigger-rate tracker.
    pub trigger_alpha: f64,
    pub beamform: BeamformConfig,
    pub spectral: SpectralConfig,
    pub layout: LayoutConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fast_time_rate_hz: 102.4e9,
            carrier_hz: 7.15e9,
            bandwidth_hz: 1.7e9,
            start_frequency_hz: 6.3e9,
            frequency_steps: 137,
            buffer_capacity: 50,
            variance_threshold_pct: None,
            trigger_alpha: 0.3,
            beamform: BeamformConfig::default(),
            spectral: SpectralConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Number of retained bins M = round(N·B/Fs) for a sweep of `sweep_len` samples.
    pub fn retained_bins(&self, sweep_len: usize) -> usize {
        (sweep_len as f64 * self.bandwidth_hz / self.fast_time_rate_hz).round() as usize
    }

    /// Distance in metres of range bin `n`: n·c / (2·B).
    pub fn sample_to_range(&self, n: usize) -> f64 {
        n as f64 * SPEED_OF_LIGHT / (2.0 * self.bandwidth_hz)
    }

    /// Stepped-sweep frequency vector F0 + k·B/K, k = 0..K, with K = `frequency_steps`.
    pub fn frequency_vector(&self) -> Vec<f64> {
        self.frequency_grid(self.frequency_steps)
    }

    /// Frequency vector spanning the swept bandwidth in `steps` steps.
    pub fn frequency_grid(&self, steps: usize) -> Vec<f64> {
        let step = self.bandwidth_hz / steps.max(1) as f64;
        (0..steps)
            .map(|k| self.start_frequency_hz + k as f64 * step)
            .collect()
    }

    pub fn validate(&self) -> StageResult<()> {
        if !(self.fast_time_rate_hz > 0.0 && self.bandwidth_hz > 0.0) {
            return Err(StageError::InvalidInput(
                "sample rate and bandwidth must be positive".into(),
            ));
        }
        if self.bandwidth_hz > self.fast_time_rate_hz {
            return Err(StageError::InvalidInput(
                "bandwidth exceeds fast-time sample rate".into(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(StageError::InvalidInput(
                "buffer capacity must be non-zero".into(),
            ));
        }
        if !(self.trigger_alpha > 0.0 && self.trigger_alpha <= 1.0) {
            return Err(StageError::InvalidInput(
                "trigger alpha must lie in (0, 1]".into(),
            ));
        }
        self.spectral.validate()
    }
}

/// Common error type for stage execution.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("insufficient history: {rows} row(s) buffered, need at least 2")]
    InsufficientHistory { rows: usize },
    #[error("degenerate normalization: matrix mean {mean:e} is too close to zero")]
    DegenerateNormalization { mean: f64 },
    #[error("acquisition failure: {0}")]
    Acquisition(String),
    #[error("selection mismatch: buffer holds {expected} channel(s), frame has {found}")]
    SelectionMismatch { expected: usize, found: usize },
    #[error("profile length mismatch: buffer holds {expected} range bin(s), frame has {found}")]
    ProfileLengthMismatch { expected: usize, found: usize },
    #[error("spectral underrun: {len} sample(s), need at least {min}")]
    SpectralUnderrun { len: usize, min: usize },
    #[error("antenna {0} is not part of the layout")]
    UnknownAntenna(u32),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type StageResult<T> = Result<T, StageError>;

/// Trait describing object-oriented signal-processing stages.
pub trait ProcessingStage {
    type Input: ?Sized;
    type Output;

    fn initialize(&mut self, config: &PipelineConfig) -> StageResult<()>;
    fn execute(&mut self, input: &Self::Input) -> StageResult<Self::Output>;
    fn cleanup(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_keeps_137_bins_for_8192_samples() {
        let config = PipelineConfig::default();
        assert_eq!(config.retained_bins(8192), 136);
        assert_eq!(config.frequency_vector().len(), 137);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sample_to_range_is_linear_in_bin() {
        let config = PipelineConfig::default();
        let step = SPEED_OF_LIGHT / (2.0 * 1.7e9);
        assert_eq!(config.sample_to_range(0), 0.0);
        assert!((config.sample_to_range(42) - 42.0 * step).abs() < 1e-9);
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let config = PipelineConfig {
            buffer_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(StageError::InvalidInput(_))
        ));
    }

    #[test]
    fn config_reads_partial_yaml() {
        let yaml = "buffer_capacity: 80\nspectral:\n  band_low_hz: 0.15\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.buffer_capacity, 80);
        assert_eq!(config.spectral.band_low_hz, 0.15);
        assert_eq!(config.frequency_steps, 137);
    }
}
