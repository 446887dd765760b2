use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use vitalcore::acquisition::{AntennaLayout, AntennaPair, RawSweep, SweepFrame, SweepSource};
use vitalcore::prelude::{PipelineConfig, StageError, StageResult, SPEED_OF_LIGHT};
use vitalcore::processing::beamformer::round_trip_delays;

/// Description of the synthetic breathing target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Fast-time samples per sweep.
    pub sweep_len: usize,
    /// Downsampled range bin the target sits in.
    pub target_bin: f64,
    pub breathing_hz: f64,
    /// Peak chest displacement (metres).
    pub chest_displacement_m: f64,
    pub torso_amplitude: f64,
    pub chest_amplitude: f64,
    /// Direct antenna coupling.
    pub coupling_amplitude: f64,
    pub coupling_delay_s: f64,
    /// Half-width of the uniform noise added to every sample.
    pub noise: f64,
    pub trigger_period_s: f64,
    /// Every n-th trigger fails to deliver sweeps.
    pub dropout_every: Option<usize>,
    pub seed: u64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            sweep_len: 8192,
            target_bin: 42.0,
            breathing_hz: 0.25,
            chest_displacement_m: 1e-3,
            torso_amplitude: 2.0,
            chest_amplitude: 1.0,
            coupling_amplitude: 2.0,
            coupling_delay_s: 1e-9,
            noise: 0.05,
            trigger_period_s: 0.5,
            dropout_every: None,
            seed: 7,
        }
    }
}

/// `SweepSource` standing in for the radar: a person breathing in front of the array.
pub struct SyntheticScene {
    config: SceneConfig,
    layout: AntennaLayout,
    fast_time_rate_hz: f64,
    carrier_hz: f64,
    pulse_sigma_s: f64,
    target_range_m: f64,
    trigger: usize,
    rng: StdRng,
}

impl SyntheticScene {
    pub fn new(config: SceneConfig, pipeline: &PipelineConfig) -> StageResult<Self> {
        if config.sweep_len == 0 || !(config.trigger_period_s > 0.0) {
            return Err(StageError::InvalidInput(
                "scene needs a non-empty sweep and a positive trigger period".into(),
            ));
        }
        let bins = pipeline.retained_bins(config.sweep_len) + 1;
        let bin_delay = config.sweep_len as f64 / (bins as f64 * pipeline.fast_time_rate_hz);
        let target_range_m = config.target_bin * bin_delay * SPEED_OF_LIGHT / 2.0;

        Ok(Self {
            layout: AntennaLayout::from_config(&pipeline.layout),
            fast_time_rate_hz: pipeline.fast_time_rate_hz,
            carrier_hz: pipeline.carrier_hz,
            pulse_sigma_s: 0.6 / pipeline.bandwidth_hz,
            target_range_m,
            trigger: 0,
            rng: StdRng::seed_from_u64(config.seed),
            config,
        })
    }

    /// Boresight distance of the target in metres.
    pub fn target_range_m(&self) -> f64 {
        self.target_range_m
    }

    pub fn trigger_period_s(&self) -> f64 {
        self.config.trigger_period_s
    }

    fn add_reflection(&self, samples: &mut [f64], amplitude: f64, delay: f64, phase: f64) {
        let two_sigma_sq = 2.0 * self.pulse_sigma_s * self.pulse_sigma_s;
        for (n, sample) in samples.iter_mut().enumerate() {
            let t = n as f64 / self.fast_time_rate_hz - delay;
            let envelope = (-t * t / two_sigma_sq).exp();
            if envelope > 1e-12 {
                *sample += amplitude * envelope * (2.0 * PI * self.carrier_hz * t + phase).cos();
            }
        }
    }
}

impl SweepSource for SyntheticScene {
    fn acquire(&mut self, pairs: &[AntennaPair]) -> StageResult<SweepFrame> {
        let trigger = self.trigger;
        self.trigger += 1;
        if let Some(every) = self.config.dropout_every {
            if every > 0 && (trigger + 1) % every == 0 {
                return Err(StageError::Acquisition(format!(
                    "trigger {} returned no sweeps",
                    trigger
                )));
            }
        }

        let timestamp = trigger as f64 * self.config.trigger_period_s;
        let positions = self.layout.channel_positions(pairs)?;
        let delays = round_trip_delays(positions.view(), [0.0, 0.0, self.target_range_m]);
        let chest_shift = 2.0
            * self.config.chest_displacement_m
            * (2.0 * PI * self.config.breathing_hz * timestamp).sin()
            / SPEED_OF_LIGHT;

        let mut sweeps = Vec::with_capacity(pairs.len());
        for (&pair, &delay) in pairs.iter().zip(delays.iter()) {
            let mut samples = vec![0.0; self.config.sweep_len];
            self.add_reflection(
                &mut samples,
                self.config.coupling_amplitude,
                self.config.coupling_delay_s,
                0.0,
            );
            self.add_reflection(&mut samples, self.config.torso_amplitude, delay, 0.0);
            // chest return in quadrature with the torso so motion shows in magnitude
            self.add_reflection(
                &mut samples,
                self.config.chest_amplitude,
                delay + chest_shift,
                -FRAC_PI_2,
            );
            if self.config.noise > 0.0 {
                let noise = self.config.noise;
                samples
                    .iter_mut()
                    .for_each(|sample| *sample += self.rng.gen_range(-noise..noise));
            }
            sweeps.push(RawSweep::new(pair, samples));
        }
        Ok(SweepFrame::new(timestamp, sweeps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(config: SceneConfig) -> SyntheticScene {
        SyntheticScene::new(config, &PipelineConfig::default()).unwrap()
    }

    #[test]
    fn frames_follow_selection_and_trigger_period() {
        let pipeline = PipelineConfig::default();
        let mut scene = scene(SceneConfig::default());
        let pairs = pipeline.layout.selected_pairs.clone();
        let first = scene.acquire(&pairs).unwrap();
        let second = scene.acquire(&pairs).unwrap();
        assert_eq!(first.channel_count(), pairs.len());
        assert_eq!(first.sweeps[0].len(), 8192);
        assert_eq!(first.sweeps[1].pair, pairs[1]);
        assert!((second.timestamp - first.timestamp - 0.5).abs() < 1e-12);
    }

    #[test]
    fn target_range_lands_on_requested_bin() {
        let pipeline = PipelineConfig::default();
        let scene = scene(SceneConfig::default());
        let bin_delay = 8192.0 / (137.0 * pipeline.fast_time_rate_hz);
        let expected = 42.0 * bin_delay * SPEED_OF_LIGHT / 2.0;
        assert!((scene.target_range_m() - expected).abs() < 1e-9);
    }

    #[test]
    fn dropout_fails_every_nth_trigger() {
        let pairs = PipelineConfig::default().layout.selected_pairs;
        let mut scene = scene(SceneConfig {
            sweep_len: 1024,
            dropout_every: Some(3),
            ..Default::default()
        });
        let outcomes: Vec<bool> = (0..6).map(|_| scene.acquire(&pairs).is_ok()).collect();
        assert_eq!(outcomes, vec![true, true, false, true, true, false]);
    }

    #[test]
    fn unknown_antenna_is_rejected() {
        let mut scene = scene(SceneConfig::default());
        assert!(matches!(
            scene.acquire(&[AntennaPair::new(1, 77)]),
            Err(StageError::UnknownAntenna(77))
        ));
    }

    #[test]
    fn noiseless_scene_is_deterministic_across_channels_of_same_pair() {
        let mut scene = scene(SceneConfig {
            sweep_len: 2048,
            noise: 0.0,
            ..Default::default()
        });
        let pair = AntennaPair::new(1, 2);
        let frame = scene.acquire(&[pair, pair]).unwrap();
        assert_eq!(frame.sweeps[0].samples, frame.sweeps[1].samples);
        assert!(frame.sweeps[0].samples.iter().any(|v| v.abs() > 0.1));
    }
}
