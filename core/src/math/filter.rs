//! Time-domain helpers for the slow-time waveform: detrending, smoothing,
//! Butterworth biquad cascades and zero-phase (forward-backward) filtering.

use std::f64::consts::PI;

/// A single second-order section, Direct Form II Transposed.
///
/// H(z) = (b0 + b1·z⁻¹ + b2·z⁻²) / (1 + a1·z⁻¹ + a2·z⁻²)
#[derive(Debug, Clone, PartialEq)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
    state: [f64; 2],
}

impl Biquad {
    pub fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self {
            b,
            a,
            state: [0.0; 2],
        }
    }

    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b[0] * input + self.state[0];
        self.state[0] = self.b[1] * input - self.a[0] * output + self.state[1];
        self.state[1] = self.b[2] * input - self.a[1] * output;
        output
    }

    pub fn reset(&mut self) {
        self.state = [0.0; 2];
    }

    /// Poles inside the unit circle.
    pub fn is_stable(&self) -> bool {
        self.a[1].abs() < 1.0 && self.a[0].abs() < 1.0 + self.a[1]
    }

    /// Butterworth lowpass of the given order as cascaded sections (bilinear transform,
    /// cutoff prewarped).
    pub fn butterworth_lowpass(order: usize, cutoff_hz: f64, sample_rate: f64) -> Vec<Biquad> {
        butterworth(order, cutoff_hz, sample_rate, false)
    }

    pub fn butterworth_highpass(order: usize, cutoff_hz: f64, sample_rate: f64) -> Vec<Biquad> {
        butterworth(order, cutoff_hz, sample_rate, true)
    }
}

fn butterworth(order: usize, cutoff_hz: f64, sample_rate: f64, highpass: bool) -> Vec<Biquad> {
    let order = order.max(1);
    let k = (PI * cutoff_hz / sample_rate).tan();
    let k2 = k * k;
    let mut sections = Vec::with_capacity(order.div_ceil(2));

    for idx in 0..order / 2 {
        let angle = PI * (2 * idx + 1) as f64 / (2 * order) as f64;
        let q = 1.0 / (2.0 * angle.sin());
        let norm = 1.0 / (1.0 + k / q + k2);
        let a = [2.0 * (k2 - 1.0) * norm, (1.0 - k / q + k2) * norm];
        let b = if highpass {
            [norm, -2.0 * norm, norm]
        } else {
            let b0 = k2 * norm;
            [b0, 2.0 * b0, b0]
        };
        sections.push(Biquad::new(b, a));
    }

    if order % 2 == 1 {
        let norm = 1.0 / (1.0 + k);
        let a = [(k - 1.0) * norm, 0.0];
        let b = if highpass {
            [norm, -norm, 0.0]
        } else {
            [k * norm, k * norm, 0.0]
        };
        sections.push(Biquad::new(b, a));
    }

    sections
}

pub struct FilterHelper;

impl FilterHelper {
    /// Removes the least-squares straight line through the samples.
    pub fn detrend_linear(samples: &[f64]) -> Vec<f64> {
        let n = samples.len();
        if n < 2 {
            return vec![0.0; n];
        }
        let n_f = n as f64;
        let t_mean = (n_f - 1.0) / 2.0;
        let y_mean = samples.iter().sum::<f64>() / n_f;
        let mut num = 0.0;
        let mut den = 0.0;
        for (i, &y) in samples.iter().enumerate() {
            let dt = i as f64 - t_mean;
            num += dt * (y - y_mean);
            den += dt * dt;
        }
        let slope = num / den;
        samples
            .iter()
            .enumerate()
            .map(|(i, &y)| y - (y_mean + slope * (i as f64 - t_mean)))
            .collect()
    }

    /// Centered moving average with the output as long as the input; windows are
    /// zero-extended at the edges.
    pub fn moving_average(samples: &[f64], window: usize) -> Vec<f64> {
        let n = samples.len();
        if window <= 1 || n == 0 {
            return samples.to_vec();
        }
        let window = window.min(n);
        let ahead = (window - 1) / 2;
        let behind = window - 1 - ahead;
        let scale = 1.0 / window as f64;
        (0..n)
            .map(|i| {
                let lo = i.saturating_sub(behind);
                let hi = (i + ahead).min(n - 1);
                samples[lo..=hi].iter().sum::<f64>() * scale
            })
            .collect()
    }

    /// Runs the cascade once over the samples, starting from rest.
    pub fn cascade(sections: &mut [Biquad], samples: &[f64]) -> Vec<f64> {
        sections.iter_mut().for_each(Biquad::reset);
        samples
            .iter()
            .map(|&x| sections.iter_mut().fold(x, |acc, section| section.process(acc)))
            .collect()
    }

    /// Zero-phase filtering: forward pass, then a pass over the reversed output.
    /// The input is extended by odd reflection at both ends to tame start-up transients.
    pub fn filtfilt(sections: &mut [Biquad], samples: &[f64]) -> Vec<f64> {
        let n = samples.len();
        if n == 0 {
            return Vec::new();
        }
        let pad = (3 * (2 * sections.len() + 1)).min(n - 1);
        let first = samples[0];
        let last = samples[n - 1];

        let mut extended = Vec::with_capacity(n + 2 * pad);
        extended.extend((1..=pad).rev().map(|i| 2.0 * first - samples[i]));
        extended.extend_from_slice(samples);
        extended.extend((1..=pad).map(|i| 2.0 * last - samples[n - 1 - i]));

        let mut forward = Self::cascade(sections, &extended);
        forward.reverse();
        let mut backward = Self::cascade(sections, &forward);
        backward.reverse();
        backward[pad..pad + n].to_vec()
    }

    /// Periodic Hann window (the spectral-analysis flavour).
    pub fn hann(len: usize) -> Vec<f64> {
        if len <= 1 {
            return vec![1.0; len];
        }
        (0..len)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / len as f64).cos())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, fs: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn detrend_removes_ramp() {
        let ramp: Vec<f64> = (0..20).map(|i| 3.0 + 0.5 * i as f64).collect();
        let out = FilterHelper::detrend_linear(&ramp);
        assert!(out.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn moving_average_keeps_length_and_ramps_edges() {
        let out = FilterHelper::moving_average(&[3.0, 3.0, 3.0, 3.0, 3.0], 3);
        assert_eq!(out.len(), 5);
        assert!((out[0] - 2.0).abs() < 1e-12);
        assert!((out[2] - 3.0).abs() < 1e-12);
        assert!((out[4] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn butterworth_sections_are_stable() {
        for order in 1..=6 {
            let low = Biquad::butterworth_lowpass(order, 0.6, 10.0);
            let high = Biquad::butterworth_highpass(order, 0.1, 10.0);
            assert_eq!(low.len(), order.div_ceil(2));
            assert!(low.iter().chain(high.iter()).all(Biquad::is_stable));
        }
    }

    #[test]
    fn lowpass_passes_dc_and_highpass_blocks_it() {
        let dc = vec![1.0; 400];
        let mut low = Biquad::butterworth_lowpass(2, 0.5, 10.0);
        let mut high = Biquad::butterworth_highpass(2, 0.5, 10.0);
        let low_out = FilterHelper::cascade(&mut low, &dc);
        let high_out = FilterHelper::cascade(&mut high, &dc);
        assert!((low_out[399] - 1.0).abs() < 1e-6);
        assert!(high_out[399].abs() < 1e-6);
    }

    #[test]
    fn filtfilt_attenuates_out_of_band_tone() {
        let fs = 10.0;
        let mut low = Biquad::butterworth_lowpass(4, 0.6, fs);
        let passed = FilterHelper::filtfilt(&mut low, &tone(0.25, fs, 600));
        let blocked = FilterHelper::filtfilt(&mut low, &tone(3.0, fs, 600));
        let mid = 100..500;
        let passed_peak = passed[mid.clone()].iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let blocked_peak = blocked[mid].iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(passed_peak > 0.9);
        assert!(blocked_peak < 0.01);
    }

    #[test]
    fn hann_is_periodic() {
        let window = FilterHelper::hann(4);
        assert_eq!(window[0], 0.0);
        assert!((window[2] - 1.0).abs() < 1e-12);
    }
}
