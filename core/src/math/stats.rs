use num_complex::Complex64;

pub struct StatsHelper;

impl StatsHelper {
    /// Root mean square; zero for an empty slice.
    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&v| v * v).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    /// Population variance (divide by n) of a complex sequence: mean of |x - mean|².
    ///
    /// Single pass (Welford), so any borrowed iterator works.
    pub fn complex_variance<'a, I>(samples: I) -> f64
    where
        I: IntoIterator<Item = &'a Complex64>,
    {
        let mut count = 0usize;
        let mut mean = Complex64::new(0.0, 0.0);
        let mut m2 = 0.0;
        for &value in samples {
            count += 1;
            let delta = value - mean;
            mean += delta / count as f64;
            m2 += (delta * (value - mean).conj()).re;
        }
        if count == 0 {
            return 0.0;
        }
        m2 / count as f64
    }

    /// Index of the largest value; the first one wins on ties. NaN entries are skipped.
    pub fn argmax(values: &[f64]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, &value) in values.iter().enumerate() {
            if value.is_nan() {
                continue;
            }
            match best {
                Some((_, current)) if value <= current => {}
                _ => best = Some((idx, value)),
            }
        }
        best.map(|(idx, _)| idx)
    }
}
