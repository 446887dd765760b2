use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Helper that wraps the `rustfft` planner for reuse across sweeps of one length.
pub struct FftHelper {
    size: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            size,
            forward,
            inverse,
            scratch: vec![Complex64::zero(); scratch_len],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Unnormalized forward transform in place.
    pub fn forward(&mut self, buffer: &mut [Complex64]) {
        debug_assert_eq!(buffer.len(), self.size);
        self.forward.process_with_scratch(buffer, &mut self.scratch);
    }

    /// Inverse transform in place, scaled by 1/size.
    pub fn inverse(&mut self, buffer: &mut [Complex64]) {
        debug_assert_eq!(buffer.len(), self.size);
        self.inverse.process_with_scratch(buffer, &mut self.scratch);
        let scale = 1.0 / self.size as f64;
        buffer.iter_mut().for_each(|value| *value *= scale);
    }

    /// Forward transform of a real sequence, zero-padded to the helper size.
    pub fn forward_real(&mut self, input: &[f64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = input
            .iter()
            .take(self.size)
            .map(|&value| Complex64::new(value, 0.0))
            .collect();
        buffer.resize(self.size, Complex64::zero());
        self.forward(&mut buffer);
        buffer
    }
}

/// Moves the zero-frequency bin to index `len / 2`.
pub fn fft_shift<T: Clone>(values: &mut [T]) {
    let len = values.len();
    values.rotate_right(len / 2);
}
