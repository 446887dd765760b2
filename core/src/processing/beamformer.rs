use ndarray::{Array1, Array2, ArrayView2, Axis};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::math::matrix::MatrixHelper;
use crate::prelude::{PipelineConfig, ProcessingStage, StageError, StageResult, SPEED_OF_LIGHT};
use crate::processing::slow_time::SignalMatrix;
use crate::telemetry::log::LogManager;

/// How the per-point results of a steering cluster are added up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CombineMode {
    /// Sum of magnitudes; insensitive to phase differences between points.
    Magnitude,
    /// Complex sum, magnitude taken afterwards.
    Coherent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamformConfig {
    /// Weights are reused while the target moves less than this (metres).
    pub deadband_m: f64,
    /// Offsets (metres) added to the boresight point (0, 0, distance).
    pub cluster_offsets: Vec<[f64; 3]>,
    pub combine: CombineMode,
}

impl Default for BeamformConfig {
    fn default() -> Self {
        Self {
            deadband_m: 0.5,
            cluster_offsets: vec![
                [0.0, 0.0, 0.0],
                [0.05, 0.0, 0.0],
                [-0.05, 0.0, 0.0],
                [0.0, 0.05, 0.0],
                [0.0, -0.05, 0.0],
            ],
            combine: CombineMode::Magnitude,
        }
    }
}

/// Steering weights valid for one anchor distance and channel set.
#[derive(Debug, Clone, Default)]
pub struct WeightCache {
    anchor_m: Option<f64>,
    channels: usize,
    weights: Vec<Array2<Complex64>>,
}

impl WeightCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when empty, built for another channel set, or the target left the deadband.
    pub fn is_stale(&self, distance_m: f64, channels: usize, deadband_m: f64) -> bool {
        match self.anchor_m {
            None => true,
            Some(anchor) => channels != self.channels || (distance_m - anchor).abs() > deadband_m,
        }
    }

    pub fn store(&mut self, distance_m: f64, channels: usize, weights: Vec<Array2<Complex64>>) {
        self.anchor_m = Some(distance_m);
        self.channels = channels;
        self.weights = weights;
    }

    pub fn invalidate(&mut self) {
        self.anchor_m = None;
        self.weights.clear();
    }

    pub fn anchor(&self) -> Option<f64> {
        self.anchor_m
    }

    pub fn weights(&self) -> &[Array2<Complex64>] {
        &self.weights
    }
}

/// Round-trip delay from every channel (rows of `positions`) to `target`.
pub fn round_trip_delays(positions: ArrayView2<f64>, target: [f64; 3]) -> Array1<f64> {
    positions
        .axis_iter(Axis(0))
        .map(|position| {
            let distance = (0..3)
                .map(|axis| (position[axis] - target[axis]).powi(2))
                .sum::<f64>()
                .sqrt();
            2.0 * distance / SPEED_OF_LIGHT
        })
        .collect()
}

/// Channel × frequency weights exp(-j·2π·f·τ).
pub fn steering_weights(delays: &Array1<f64>, frequencies: &[f64]) -> Array2<Complex64> {
    Array2::from_shape_fn((delays.len(), frequencies.len()), |(channel, bin)| {
        Complex64::from_polar(1.0, -2.0 * PI * frequencies[bin] * delays[channel])
    })
}

/// Weighted channel sum for every slow-time row: (T × F × L) → (T × F).
pub fn beamform_point(matrix: &SignalMatrix, weights: ArrayView2<Complex64>) -> Array2<Complex64> {
    let (rows, bins, _) = matrix.dim();
    let mut output = Array2::zeros((rows, bins));
    for (row, slice) in matrix.axis_iter(Axis(0)).enumerate() {
        output
            .index_axis_mut(Axis(0), row)
            .assign(&MatrixHelper::weighted_channel_sum(slice, weights));
    }
    output
}

/// Snapshot to steer at the estimated distance.
#[derive(Debug, Clone)]
pub struct BeamformInput {
    pub matrix: SignalMatrix,
    pub distance_m: f64,
}

#[derive(Debug, Clone)]
pub struct BeamformOutput {
    /// One value per slow-time row: magnitude summed over frequency.
    pub waveform: Vec<f64>,
    pub weights_rebuilt: bool,
}

/// Delay-and-sum beamformer steered at a small cluster around the boresight range.
pub struct Beamformer {
    config: Option<BeamformConfig>,
    sweep: Option<PipelineConfig>,
    frequencies: Vec<f64>,
    positions: Option<Array2<f64>>,
    cache: WeightCache,
    logger: LogManager,
}

impl Beamformer {
    pub fn new() -> Self {
        Self {
            config: None,
            sweep: None,
            frequencies: Vec::new(),
            positions: None,
            cache: WeightCache::new(),
            logger: LogManager::new("beamformer"),
        }
    }

    /// Installs the virtual positions (L × 3) of the selected channels.
    pub fn set_channel_positions(&mut self, positions: Array2<f64>) {
        self.positions = Some(positions);
        self.cache.invalidate();
    }

    pub fn cache(&self) -> &WeightCache {
        &self.cache
    }

    fn target_points(config: &BeamformConfig, distance_m: f64) -> Vec<[f64; 3]> {
        if config.cluster_offsets.is_empty() {
            return vec![[0.0, 0.0, distance_m]];
        }
        config
            .cluster_offsets
            .iter()
            .map(|offset| [offset[0], offset[1], distance_m + offset[2]])
            .collect()
    }
}

impl Default for Beamformer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for Beamformer {
    type Input = BeamformInput;
    type Output = BeamformOutput;

    fn initialize(&mut self, config: &PipelineConfig) -> StageResult<()> {
        self.config = Some(config.beamform.clone());
        self.frequencies = config.frequency_vector();
        self.sweep = Some(config.clone());
        self.cache.invalidate();
        Ok(())
    }

    fn execute(&mut self, input: &BeamformInput) -> StageResult<BeamformOutput> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| StageError::Internal("stage not initialized".into()))?;
        let positions = self
            .positions
            .as_ref()
            .ok_or_else(|| StageError::Internal("channel positions not set".into()))?;

        let (rows, bins, channels) = input.matrix.dim();
        if bins == 0 {
            return Err(StageError::InvalidInput("matrix has no range bins".into()));
        }
        if bins != self.frequencies.len() {
            let sweep = self
                .sweep
                .as_ref()
                .ok_or_else(|| StageError::Internal("stage not initialized".into()))?;
            self.logger.record(&format!(
                "frequency grid resized {} -> {} steps",
                self.frequencies.len(),
                bins
            ));
            self.frequencies = sweep.frequency_grid(bins);
            self.cache.invalidate();
        }
        if channels != positions.nrows() {
            return Err(StageError::SelectionMismatch {
                expected: positions.nrows(),
                found: channels,
            });
        }

        let weights_rebuilt = self
            .cache
            .is_stale(input.distance_m, channels, config.deadband_m);
        if weights_rebuilt {
            let weights = Self::target_points(config, input.distance_m)
                .into_iter()
                .map(|target| {
                    let delays = round_trip_delays(positions.view(), target);
                    steering_weights(&delays, &self.frequencies)
                })
                .collect();
            self.cache.store(input.distance_m, channels, weights);
            self.logger.record(&format!(
                "weights rebuilt for {:.3} m ({} channels)",
                input.distance_m, channels
            ));
        }

        let waveform: Vec<f64> = match config.combine {
            CombineMode::Magnitude => {
                let mut combined = Array2::<f64>::zeros((rows, bins));
                for weights in self.cache.weights() {
                    combined += &beamform_point(&input.matrix, weights.view()).mapv(|v| v.norm());
                }
                combined.sum_axis(Axis(1)).to_vec()
            }
            CombineMode::Coherent => {
                let mut combined = Array2::<Complex64>::zeros((rows, bins));
                for weights in self.cache.weights() {
                    combined += &beamform_point(&input.matrix, weights.view());
                }
                combined.mapv(|v| v.norm()).sum_axis(Axis(1)).to_vec()
            }
        };

        Ok(BeamformOutput {
            waveform,
            weights_rebuilt,
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
        self.sweep = None;
        self.frequencies.clear();
        self.positions = None;
        self.cache.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn line_array(channels: usize) -> Array2<f64> {
        Array2::from_shape_fn((channels, 3), |(row, axis)| match axis {
            1 => row as f64 * 0.02,
            _ => 0.0,
        })
    }

    /// Response of a point source at `target`, phase-aligned by the matching weights.
    fn point_source(
        rows: usize,
        positions: &Array2<f64>,
        frequencies: &[f64],
        target: [f64; 3],
    ) -> SignalMatrix {
        let delays = round_trip_delays(positions.view(), target);
        Array3::from_shape_fn(
            (rows, frequencies.len(), positions.nrows()),
            |(_, bin, channel)| {
                Complex64::from_polar(1.0, 2.0 * PI * frequencies[bin] * delays[channel])
            },
        )
    }

    fn stage(config: &PipelineConfig, positions: Array2<f64>) -> Beamformer {
        let mut beamformer = Beamformer::new();
        beamformer.initialize(config).unwrap();
        beamformer.set_channel_positions(positions);
        beamformer
    }

    #[test]
    fn coherent_channels_add_linearly() {
        let config = PipelineConfig {
            frequency_steps: 16,
            ..Default::default()
        };
        let frequencies = config.frequency_vector();
        let positions = line_array(8);
        let target = [0.0, 0.0, 1.2];
        let matrix = point_source(2, &positions, &frequencies, target);

        let delays = round_trip_delays(positions.view(), target);
        let weights = steering_weights(&delays, &frequencies);
        let combined = beamform_point(&matrix, weights.view());
        let single = matrix[[0, 0, 0]].norm();
        for value in combined.iter() {
            assert!((value.norm() - 8.0 * single).abs() < 1e-9);
        }
    }

    #[test]
    fn random_phases_grow_with_square_root_of_channels() {
        let channels = 64;
        let bins = 256;
        let mut rng = StdRng::seed_from_u64(7);
        let matrix = Array3::from_shape_fn((1, bins, channels), |_| {
            Complex64::from_polar(1.0, rng.gen_range(0.0..2.0 * PI))
        });
        let weights = Array2::from_elem((channels, bins), Complex64::new(1.0, 0.0));
        let combined = beamform_point(&matrix, weights.view());
        let mean = combined.iter().map(|v| v.norm()).sum::<f64>() / bins as f64;
        let root = (channels as f64).sqrt();
        assert!(mean > 0.6 * root && mean < 1.2 * root, "mean {}", mean);
    }

    #[test]
    fn waveform_sums_magnitude_over_frequency() {
        let config = PipelineConfig {
            frequency_steps: 16,
            beamform: BeamformConfig {
                cluster_offsets: vec![[0.0, 0.0, 0.0]],
                ..Default::default()
            },
            ..Default::default()
        };
        let positions = line_array(4);
        let matrix = point_source(3, &positions, &config.frequency_vector(), [0.0, 0.0, 2.0]);
        let mut beamformer = stage(&config, positions);
        let output = beamformer
            .execute(&BeamformInput {
                matrix,
                distance_m: 2.0,
            })
            .unwrap();
        assert_eq!(output.waveform.len(), 3);
        assert!(output.waveform.iter().all(|v| (v - 64.0).abs() < 1e-9));
    }

    #[test]
    fn weights_are_reused_inside_deadband() {
        let config = PipelineConfig {
            frequency_steps: 8,
            ..Default::default()
        };
        let positions = line_array(2);
        let matrix = Array3::from_elem((2, 8, 2), Complex64::new(1.0, 0.0));
        let mut beamformer = stage(&config, positions.clone());
        let run = |beamformer: &mut Beamformer, distance_m: f64| {
            beamformer
                .execute(&BeamformInput {
                    matrix: matrix.clone(),
                    distance_m,
                })
                .unwrap()
                .weights_rebuilt
        };

        assert!(run(&mut beamformer, 1.0));
        assert!(!run(&mut beamformer, 1.3));
        assert!(run(&mut beamformer, 1.6));
        assert_eq!(beamformer.cache().anchor(), Some(1.6));

        beamformer.set_channel_positions(positions);
        assert!(run(&mut beamformer, 1.6));
    }

    #[test]
    fn frequency_grid_follows_bin_count() {
        let config = PipelineConfig {
            frequency_steps: 8,
            beamform: BeamformConfig {
                cluster_offsets: vec![[0.0, 0.0, 0.0]],
                ..Default::default()
            },
            ..Default::default()
        };
        let positions = line_array(3);
        let matrix = point_source(2, &positions, &config.frequency_grid(5), [0.0, 0.0, 1.5]);
        let mut beamformer = stage(&config, positions);
        let output = beamformer
            .execute(&BeamformInput {
                matrix,
                distance_m: 1.5,
            })
            .unwrap();
        assert!(output.weights_rebuilt);
        // three aligned channels, five bins
        assert!(output.waveform.iter().all(|v| (v - 15.0).abs() < 1e-9));

        let empty = Array3::from_elem((2, 0, 3), Complex64::new(1.0, 0.0));
        assert!(matches!(
            beamformer.execute(&BeamformInput {
                matrix: empty,
                distance_m: 1.5
            }),
            Err(StageError::InvalidInput(_))
        ));
    }

    #[test]
    fn coherent_mode_sums_cluster_before_magnitude() {
        let config = PipelineConfig {
            frequency_steps: 4,
            beamform: BeamformConfig {
                cluster_offsets: vec![[0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
                combine: CombineMode::Coherent,
                ..Default::default()
            },
            ..Default::default()
        };
        let positions = line_array(2);
        let matrix = point_source(1, &positions, &config.frequency_vector(), [0.0, 0.0, 1.0]);
        let mut beamformer = stage(&config, positions);
        let output = beamformer
            .execute(&BeamformInput {
                matrix,
                distance_m: 1.0,
            })
            .unwrap();
        // two identical points, two channels, four bins
        assert!((output.waveform[0] - 16.0).abs() < 1e-9);
    }
}
