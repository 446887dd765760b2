use ndarray::Array1;
use num_complex::Complex64;
use std::f64::consts::PI;

use crate::math::fft::{fft_shift, FftHelper};
use crate::prelude::{PipelineConfig, ProcessingStage, StageError, StageResult};
use crate::telemetry::log::LogManager;

/// Complex baseband samples of one channel, one per range bin.
pub type RangeProfile = Array1<Complex64>;

/// Shifts a real sweep from the carrier to baseband: x[n]·exp(-j2π·Fc·n/Fs).
pub fn downconvert(samples: &[f64], fast_time_rate_hz: f64, carrier_hz: f64) -> Vec<Complex64> {
    let cycles_per_sample = carrier_hz / fast_time_rate_hz;
    samples
        .iter()
        .enumerate()
        .map(|(n, &value)| {
            let turns = (cycles_per_sample * n as f64).rem_euclid(1.0);
            Complex64::from_polar(value, -2.0 * PI * turns)
        })
        .collect()
}

/// Baseband conversion plus truncation of the spectrum to the radar bandwidth.
///
/// After centering the spectrum, DC sits at index ⌊N/2⌋. The kept window holds
/// ⌊M/2⌋ bins below DC and ⌈M/2⌉ above it (M+1 bins in total), and is rotated so
/// DC is back at index 0 before the inverse transform. Output sample `m` is thus
/// the baseband response at delay m·N/((M+1)·Fs).
pub struct DownsampleStage {
    config: Option<PipelineConfig>,
    full: Option<FftHelper>,
    reduced: Option<FftHelper>,
    logger: LogManager,
}

impl DownsampleStage {
    pub fn new() -> Self {
        Self {
            config: None,
            full: None,
            reduced: None,
            logger: LogManager::new("downsample"),
        }
    }

    fn helper(slot: &mut Option<FftHelper>, size: usize) -> &mut FftHelper {
        if slot.as_ref().map(FftHelper::size) != Some(size) {
            *slot = Some(FftHelper::new(size));
        }
        slot.get_or_insert_with(|| FftHelper::new(size))
    }
}

impl Default for DownsampleStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for DownsampleStage {
    type Input = [f64];
    type Output = RangeProfile;

    fn initialize(&mut self, config: &PipelineConfig) -> StageResult<()> {
        config.validate()?;
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: &[f64]) -> StageResult<RangeProfile> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| StageError::Internal("stage not initialized".into()))?;

        let n = input.len();
        if n == 0 {
            return Err(StageError::InvalidInput("empty sweep".into()));
        }

        let m = config.retained_bins(n);
        let below = m / 2;
        let above = m - below;
        let center = n / 2;
        if below > center || center + above >= n {
            return Err(StageError::InvalidInput(format!(
                "sweep of {} samples cannot hold {} retained bins",
                n,
                m + 1
            )));
        }

        let mut spectrum = downconvert(input, config.fast_time_rate_hz, config.carrier_hz);
        Self::helper(&mut self.full, n).forward(&mut spectrum);
        fft_shift(&mut spectrum);

        let start = center - below;
        let mut truncated = spectrum[start..start + m + 1].to_vec();
        truncated.rotate_left(below);

        Self::helper(&mut self.reduced, m + 1).inverse(&mut truncated);
        let scale = (m + 1) as f64 / n as f64;
        truncated.iter_mut().for_each(|value| *value *= scale);

        self.logger
            .detail(&format!("sweep {} samples -> {} range bins", n, m + 1));
        Ok(Array1::from(truncated))
    }

    fn cleanup(&mut self) {
        self.config = None;
        self.full = None;
        self.reduced = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> DownsampleStage {
        let mut stage = DownsampleStage::new();
        stage.initialize(&PipelineConfig::default()).unwrap();
        stage
    }

    #[test]
    fn profile_length_is_retained_bins_plus_one() {
        let mut stage = stage();
        let config = PipelineConfig::default();
        for n in [1000usize, 4097, 8192] {
            let profile = stage.execute(&vec![0.5; n]).unwrap();
            assert_eq!(profile.len(), config.retained_bins(n) + 1);
        }
    }

    #[test]
    fn in_band_tone_keeps_half_amplitude() {
        let mut stage = stage();
        let config = PipelineConfig::default();
        let n = 8192;
        let amplitude = 3.0;
        // 572 cycles per sweep is exactly the carrier, so bin 582 lands 10 bins above DC.
        let tone: Vec<f64> = (0..n)
            .map(|i| amplitude * (2.0 * PI * 582.0 * i as f64 / n as f64).cos())
            .collect();
        assert_eq!(config.carrier_hz * n as f64 / config.fast_time_rate_hz, 572.0);

        let profile = stage.execute(&tone).unwrap();
        for value in profile.iter() {
            let relative = (value.norm() - amplitude / 2.0).abs() / (amplitude / 2.0);
            assert!(relative < 0.01, "magnitude {}", value.norm());
        }
    }

    #[test]
    fn out_of_band_tone_is_removed() {
        let mut stage = stage();
        let n = 8192;
        let tone: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 1500.0 * i as f64 / n as f64).cos())
            .collect();
        let profile = stage.execute(&tone).unwrap();
        assert!(profile.iter().all(|value| value.norm() < 1e-9));
    }

    #[test]
    fn uninitialized_stage_fails() {
        let mut stage = DownsampleStage::new();
        assert!(matches!(
            stage.execute(&[1.0, 2.0]),
            Err(StageError::Internal(_))
        ));
    }

    #[test]
    fn downconvert_removes_carrier_phase() {
        let baseband = downconvert(&[1.0, 1.0], 4.0, 1.0);
        assert!((baseband[1] - Complex64::new(0.0, -1.0)).norm() < 1e-12);
    }
}
