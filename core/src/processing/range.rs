use ndarray::Axis;
use serde::{Deserialize, Serialize};

use crate::math::stats::StatsHelper;
use crate::prelude::{PipelineConfig, ProcessingStage, StageError, StageResult};
use crate::processing::slow_time::SignalMatrix;
use crate::telemetry::log::LogManager;

/// Mean magnitudes below this are treated as a zero mean.
const MIN_NORMALIZATION_MEAN: f64 = 1e-12;

/// Range of the dominant slow-time variance peak.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RangeEstimate {
    pub bin: usize,
    pub distance_m: f64,
    /// Normalized variance per range bin, summed over channels.
    pub variance: Vec<f64>,
}

/// Population variance along slow time for every (bin, channel), divided by the
/// matrix-wide mean magnitude and summed over channels.
pub fn slow_time_variance(matrix: &SignalMatrix) -> StageResult<Vec<f64>> {
    let (rows, bins, _) = matrix.dim();
    if rows < 2 {
        return Err(StageError::InsufficientHistory { rows });
    }

    let mean = matrix.iter().map(|value| value.norm()).sum::<f64>() / matrix.len() as f64;
    if !mean.is_finite() || mean < MIN_NORMALIZATION_MEAN {
        return Err(StageError::DegenerateNormalization { mean });
    }

    let mut variance = Vec::with_capacity(bins);
    for bin in matrix.axis_iter(Axis(1)) {
        // bin: (slow-time × channel)
        let summed: f64 = bin
            .axis_iter(Axis(1))
            .map(|channel| StatsHelper::complex_variance(channel.iter()))
            .sum();
        variance.push(summed / mean);
    }
    Ok(variance)
}

/// Zeroes every entry below `percent` of the maximum.
pub fn threshold(values: &[f64], percent: f64) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let cutoff = percent / 100.0 * max;
    values
        .iter()
        .map(|&value| if value < cutoff { 0.0 } else { value })
        .collect()
}

/// Distance in metres of each of `bins` range bins.
pub fn range_axis(config: &PipelineConfig, bins: usize) -> Vec<f64> {
    (0..bins).map(|bin| config.sample_to_range(bin)).collect()
}

/// Picks the range bin whose returns fluctuate most over slow time.
pub struct RangeStage {
    config: Option<PipelineConfig>,
    logger: LogManager,
}

impl RangeStage {
    pub fn new() -> Self {
        Self {
            config: None,
            logger: LogManager::new("range"),
        }
    }
}

impl Default for RangeStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for RangeStage {
    type Input = SignalMatrix;
    type Output = RangeEstimate;

    fn initialize(&mut self, config: &PipelineConfig) -> StageResult<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: &SignalMatrix) -> StageResult<RangeEstimate> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| StageError::Internal("stage not initialized".into()))?;

        let mut variance = slow_time_variance(input)?;
        if let Some(percent) = config.variance_threshold_pct {
            variance = threshold(&variance, percent);
        }

        let bin = StatsHelper::argmax(&variance)
            .ok_or_else(|| StageError::InvalidInput("matrix has no range bins".into()))?;
        let distance_m = config.sample_to_range(bin);
        self.logger.record(&format!(
            "peak bin {} -> {:.3} m over {} rows, variance rms {:.3e}",
            bin,
            distance_m,
            input.len_of(Axis(0)),
            StatsHelper::rms(&variance)
        ));

        Ok(RangeEstimate {
            bin,
            distance_m,
            variance,
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use num_complex::Complex64;

    fn stage(config: &PipelineConfig) -> RangeStage {
        let mut stage = RangeStage::new();
        stage.initialize(config).unwrap();
        stage
    }

    fn constant_matrix(rows: usize, bins: usize, channels: usize) -> SignalMatrix {
        Array3::from_elem((rows, bins, channels), Complex64::new(1.0, 0.5))
    }

    #[test]
    fn elevated_bin_is_selected() {
        let config = PipelineConfig::default();
        let mut matrix = constant_matrix(20, 137, 4);
        for t in 0..20 {
            for l in 0..4 {
                let swing = if t % 2 == 0 { 0.8 } else { -0.8 };
                matrix[[t, 42, l]] += Complex64::new(swing, 0.0);
            }
        }
        let estimate = stage(&config).execute(&matrix).unwrap();
        assert_eq!(estimate.bin, 42);
        assert_eq!(estimate.distance_m, config.sample_to_range(42));
        assert_eq!(estimate.variance.len(), 137);
    }

    #[test]
    fn equal_peaks_resolve_to_lowest_bin() {
        let config = PipelineConfig::default();
        let mut matrix = constant_matrix(10, 16, 2);
        for t in 0..10 {
            let swing = Complex64::new(0.0, t as f64 * 0.1);
            for l in 0..2 {
                matrix[[t, 5, l]] += swing;
                matrix[[t, 11, l]] += swing;
            }
        }
        let estimate = stage(&config).execute(&matrix).unwrap();
        assert_eq!(estimate.bin, 5);
    }

    #[test]
    fn single_row_is_undefined() {
        let config = PipelineConfig::default();
        let err = stage(&config)
            .execute(&constant_matrix(1, 8, 2))
            .unwrap_err();
        assert_eq!(err, StageError::InsufficientHistory { rows: 1 });
    }

    #[test]
    fn zero_matrix_is_degenerate() {
        let config = PipelineConfig::default();
        let matrix = Array3::from_elem((4, 8, 2), Complex64::new(0.0, 0.0));
        assert!(matches!(
            stage(&config).execute(&matrix),
            Err(StageError::DegenerateNormalization { .. })
        ));
    }

    #[test]
    fn threshold_suppresses_low_entries() {
        assert_eq!(threshold(&[1.0, 5.0, 10.0], 50.0), vec![0.0, 5.0, 10.0]);
    }

    #[test]
    fn stage_applies_configured_threshold() {
        let config = PipelineConfig {
            variance_threshold_pct: Some(50.0),
            ..Default::default()
        };
        let mut matrix = constant_matrix(10, 12, 2);
        for t in 0..10 {
            let swing = if t % 2 == 0 { 1.0 } else { -1.0 };
            for l in 0..2 {
                matrix[[t, 3, l]] += Complex64::new(0.4 * swing, 0.0);
                matrix[[t, 7, l]] += Complex64::new(swing, 0.0);
            }
        }
        let estimate = stage(&config).execute(&matrix).unwrap();
        assert_eq!(estimate.bin, 7);
        // bin 3 carries 16% of the peak variance and falls under the cutoff
        assert_eq!(estimate.variance[3], 0.0);
        assert!(estimate.variance[7] > 0.0);
        assert!(estimate.variance.iter().filter(|&&v| v > 0.0).count() == 1);
    }

    #[test]
    fn range_axis_matches_sample_to_range() {
        let config = PipelineConfig::default();
        let axis = range_axis(&config, 3);
        assert_eq!(axis[2], config.sample_to_range(2));
    }
}
