use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::math::fft::FftHelper;
use crate::math::filter::{Biquad, FilterHelper};
use crate::prelude::{PipelineConfig, ProcessingStage, StageError, StageResult};
use crate::telemetry::log::LogManager;

/// Power spectral density estimator applied to the conditioned waveform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PsdMethod {
    /// Averaged, Hann-windowed, overlapped periodograms.
    Welch,
    /// Yule–Walker autoregressive fit.
    Autoregressive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Physiological band searched for the dominant rate (Hz).
    pub band_low_hz: f64,
    pub band_high_hz: f64,
    /// Moving-average length in samples; 1 disables smoothing.
    pub smoothing_window: usize,
    /// Order of each Butterworth section of the band-limiting cascade.
    pub filter_order: usize,
    pub method: PsdMethod,
    /// Welch segment length cap; shorter waveforms use a single full-length segment.
    pub max_segment_len: usize,
    /// Welch segment overlap as a fraction of the segment length.
    pub overlap: f64,
    pub nfft: usize,
    pub ar_order: usize,
    /// Waveforms shorter than this are skipped.
    pub min_samples: usize,
    /// Used when the measured slow-time rate is unavailable. Approximate only.
    pub fallback_sample_rate_hz: f64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            band_low_hz: 0.1,
            band_high_hz: 0.6,
            smoothing_window: 3,
            filter_order: 2,
            method: PsdMethod::Welch,
            max_segment_len: 512,
            overlap: 0.5,
            nfft: 2048,
            ar_order: 8,
            min_samples: 10,
            fallback_sample_rate_hz: 1.0,
        }
    }
}

impl SpectralConfig {
    pub fn validate(&self) -> StageResult<()> {
        if !(self.band_low_hz > 0.0 && self.band_low_hz < self.band_high_hz) {
            return Err(StageError::InvalidInput(format!(
                "physiological band {}..{} Hz is empty",
                self.band_low_hz, self.band_high_hz
            )));
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(StageError::InvalidInput("overlap must lie in [0, 1)".into()));
        }
        if self.min_samples < 2 || self.max_segment_len < 2 {
            return Err(StageError::InvalidInput(
                "spectral windows need at least two samples".into(),
            ));
        }
        if !(self.fallback_sample_rate_hz > 0.0) {
            return Err(StageError::InvalidInput(
                "fallback sample rate must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Slow-time waveform and its measured sample rate (NaN when unknown).
#[derive(Debug, Clone)]
pub struct SpectralInput {
    pub samples: Vec<f64>,
    pub sample_rate_hz: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PowerSpectrum {
    pub frequencies: Vec<f64>,
    pub power: Vec<f64>,
}

impl PowerSpectrum {
    /// Spacing of the frequency grid.
    pub fn resolution(&self) -> f64 {
        match self.frequencies.as_slice() {
            [first, second, ..] => second - first,
            _ => 0.0,
        }
    }

    /// Strongest bin with a frequency inside [low, high]; first wins on ties.
    pub fn peak_in_band(&self, low: f64, high: f64) -> Option<(f64, f64)> {
        let mut best: Option<(f64, f64)> = None;
        for (&frequency, &power) in self.frequencies.iter().zip(&self.power) {
            if frequency < low || frequency > high || power.is_nan() {
                continue;
            }
            match best {
                Some((_, current)) if power <= current => {}
                _ => best = Some((frequency, power)),
            }
        }
        best
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpectralEstimate {
    pub frequency_hz: f64,
    pub power: f64,
    /// Rate the spectrum was computed with.
    pub sample_rate_hz: f64,
    /// Set when the fallback rate replaced an unavailable measurement.
    pub approximate: bool,
    pub spectrum: PowerSpectrum,
}

impl SpectralEstimate {
    pub fn rate_per_minute(&self) -> f64 {
        self.frequency_hz * 60.0
    }
}

/// Returns the usable sample rate and whether the fallback was substituted.
pub fn resolve_sample_rate(measured_hz: f64, fallback_hz: f64) -> (f64, bool) {
    if measured_hz.is_finite() && measured_hz > 0.0 {
        (measured_hz, false)
    } else {
        (fallback_hz, true)
    }
}

/// One-sided Welch PSD (density scaling), per-segment mean removal.
pub fn welch(samples: &[f64], sample_rate: f64, config: &SpectralConfig) -> PowerSpectrum {
    let n = samples.len();
    let segment = config.max_segment_len.min(n).max(1);
    let overlap = (segment as f64 * config.overlap) as usize;
    let step = (segment - overlap).max(1);
    let nfft = config.nfft.max(segment);
    let window = FilterHelper::hann(segment);
    let window_energy: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (sample_rate * window_energy);
    let bins = nfft / 2 + 1;

    let mut fft = FftHelper::new(nfft);
    let mut power = vec![0.0; bins];
    let mut segments = 0usize;
    let mut start = 0;
    while start + segment <= n {
        let chunk = &samples[start..start + segment];
        let mean = chunk.iter().sum::<f64>() / segment as f64;
        let tapered: Vec<f64> = chunk
            .iter()
            .zip(&window)
            .map(|(&x, &w)| (x - mean) * w)
            .collect();
        let spectrum = fft.forward_real(&tapered);
        for (slot, value) in power.iter_mut().zip(&spectrum) {
            *slot += value.norm_sqr() * scale;
        }
        segments += 1;
        start += step;
    }

    let nyquist_bin = if nfft % 2 == 0 { Some(nfft / 2) } else { None };
    for (bin, slot) in power.iter_mut().enumerate() {
        *slot /= segments.max(1) as f64;
        if bin != 0 && Some(bin) != nyquist_bin {
            *slot *= 2.0;
        }
    }

    PowerSpectrum {
        frequencies: (0..bins)
            .map(|bin| bin as f64 * sample_rate / nfft as f64)
            .collect(),
        power,
    }
}

/// Yule–Walker fit solved by Levinson–Durbin.
///
/// Returns `a` with x[n] + Σ a[k-1]·x[n-k] = e[n], and the innovation variance.
pub fn yule_walker(samples: &[f64], order: usize) -> (Vec<f64>, f64) {
    let n = samples.len();
    let mean = samples.iter().sum::<f64>() / n.max(1) as f64;
    let centered: Vec<f64> = samples.iter().map(|x| x - mean).collect();
    let autocorr: Vec<f64> = (0..=order)
        .map(|lag| {
            centered[..n.saturating_sub(lag)]
                .iter()
                .zip(&centered[lag.min(n)..])
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / n.max(1) as f64
        })
        .collect();

    let mut coefficients = vec![0.0; order];
    let mut error = autocorr[0];
    for m in 0..order {
        if error <= f64::EPSILON * autocorr[0].abs().max(f64::MIN_POSITIVE) {
            break;
        }
        let acc = autocorr[m + 1]
            + (0..m)
                .map(|j| coefficients[j] * autocorr[m - j])
                .sum::<f64>();
        let reflection = -acc / error;
        let previous = coefficients.clone();
        for j in 0..m {
            coefficients[j] = previous[j] + reflection * previous[m - 1 - j];
        }
        coefficients[m] = reflection;
        error *= 1.0 - reflection * reflection;
    }
    (coefficients, error.max(0.0))
}

/// AR spectrum σ²/|A(e^{jω})|² on `nfft` points spanning [0, fs/2).
pub fn autoregressive_psd(samples: &[f64], sample_rate: f64, config: &SpectralConfig) -> PowerSpectrum {
    let (coefficients, variance) = yule_walker(samples, config.ar_order);
    let points = config.nfft.max(2);
    let mut frequencies = Vec::with_capacity(points);
    let mut power = Vec::with_capacity(points);
    for idx in 0..points {
        let frequency = idx as f64 * sample_rate / (2.0 * points as f64);
        let omega = 2.0 * PI * frequency / sample_rate;
        let denominator = coefficients
            .iter()
            .enumerate()
            .fold(Complex64::new(1.0, 0.0), |acc, (k, &a)| {
                acc + a * Complex64::from_polar(1.0, -omega * (k + 1) as f64)
            });
        frequencies.push(frequency);
        power.push(variance / denominator.norm_sqr());
    }
    PowerSpectrum { frequencies, power }
}

/// Recovers the dominant physiological rate from the beamformed waveform.
pub struct SpectralEstimator {
    config: Option<SpectralConfig>,
    logger: LogManager,
}

impl SpectralEstimator {
    pub fn new() -> Self {
        Self {
            config: None,
            logger: LogManager::new("spectral"),
        }
    }

    /// Detrend, smooth and band-limit the waveform.
    pub fn condition(config: &SpectralConfig, samples: &[f64], sample_rate: f64) -> StageResult<Vec<f64>> {
        let nyquist = sample_rate / 2.0;
        if config.band_low_hz >= nyquist {
            return Err(StageError::InvalidInput(format!(
                "band starts at {} Hz, above Nyquist {} Hz",
                config.band_low_hz, nyquist
            )));
        }
        let detrended = FilterHelper::detrend_linear(samples);
        let smoothed = FilterHelper::moving_average(&detrended, config.smoothing_window);

        let mut sections = Biquad::butterworth_highpass(config.filter_order, config.band_low_hz, sample_rate);
        // the lowpass only exists below Nyquist
        if config.band_high_hz < 0.99 * nyquist {
            sections.extend(Biquad::butterworth_lowpass(
                config.filter_order,
                config.band_high_hz,
                sample_rate,
            ));
        }
        Ok(FilterHelper::filtfilt(&mut sections, &smoothed))
    }
}

impl Default for SpectralEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for SpectralEstimator {
    type Input = SpectralInput;
    type Output = SpectralEstimate;

    fn initialize(&mut self, config: &PipelineConfig) -> StageResult<()> {
        config.spectral.validate()?;
        self.config = Some(config.spectral.clone());
        Ok(())
    }

    fn execute(&mut self, input: &SpectralInput) -> StageResult<SpectralEstimate> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| StageError::Internal("stage not initialized".into()))?;

        let len = input.samples.len();
        let min = match config.method {
            PsdMethod::Welch => config.min_samples,
            PsdMethod::Autoregressive => config.min_samples.max(config.ar_order + 1),
        };
        if len < min {
            return Err(StageError::SpectralUnderrun { len, min });
        }

        let (sample_rate, approximate) =
            resolve_sample_rate(input.sample_rate_hz, config.fallback_sample_rate_hz);
        if approximate {
            self.logger.degraded(&format!(
                "slow-time rate unavailable, assuming {} Hz",
                sample_rate
            ));
        }

        let conditioned = Self::condition(config, &input.samples, sample_rate)?;
        let spectrum = match config.method {
            PsdMethod::Welch => welch(&conditioned, sample_rate, config),
            PsdMethod::Autoregressive => autoregressive_psd(&conditioned, sample_rate, config),
        };

        let (frequency_hz, power) = spectrum
            .peak_in_band(config.band_low_hz, config.band_high_hz)
            .ok_or_else(|| {
                StageError::InvalidInput("no spectrum bin inside the physiological band".into())
            })?;
        self.logger.record(&format!(
            "dominant {:.3} Hz ({:.1}/min) at fs {:.2} Hz",
            frequency_hz,
            frequency_hz * 60.0,
            sample_rate
        ));

        Ok(SpectralEstimate {
            frequency_hz,
            power,
            sample_rate_hz: sample_rate,
            approximate,
            spectrum,
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}
