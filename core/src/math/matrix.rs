use ndarray::{Array1, ArrayView2, Axis};
use num_complex::Complex64;

pub struct MatrixHelper;

impl MatrixHelper {
    /// Element-wise product of a (bin × channel) slice with (channel × bin) weights,
    /// summed over the channel axis.
    pub fn weighted_channel_sum(
        slice: ArrayView2<Complex64>,
        weights: ArrayView2<Complex64>,
    ) -> Array1<Complex64> {
        (&slice * &weights.t()).sum_axis(Axis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn weighted_sum_collapses_channels() {
        let one = Complex64::new(1.0, 0.0);
        let j = Complex64::new(0.0, 1.0);
        let slice = array![[one, one], [j, j]];
        let weights = array![[one, -j], [one, -j]];
        let out = MatrixHelper::weighted_channel_sum(slice.view(), weights.view());
        assert_eq!(out[0], Complex64::new(2.0, 0.0));
        assert_eq!(out[1], Complex64::new(2.0, 0.0));
    }
}
