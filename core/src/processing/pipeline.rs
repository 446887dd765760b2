use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::acquisition::layout::AntennaLayout;
use crate::acquisition::sweep::{AntennaPair, RawSweep, SweepSource};
use crate::acquisition::trigger::TriggerRateTracker;
use crate::prelude::{PipelineConfig, ProcessingStage, StageError, StageResult};
use crate::processing::beamformer::{BeamformInput, Beamformer};
use crate::processing::display::{DisplayContext, DisplayFrame, DisplayMode};
use crate::processing::downsample::DownsampleStage;
use crate::processing::range::RangeStage;
use crate::processing::slow_time::{ProfileFrame, SlowTimeBuffer};
use crate::processing::spectral::{resolve_sample_rate, SpectralEstimate, SpectralEstimator, SpectralInput};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::{MetricsRecorder, MetricsSnapshot};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Everything one processing cycle hands to the presentation layer.
///
/// Estimates that could not be formed this cycle are `None`, never zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub timestamp: Option<f64>,
    pub state: ConnectionState,
    /// Slow-time rate used for this cycle (fallback substituted when unknown).
    pub sample_rate_hz: f64,
    pub buffered_rows: usize,
    /// Set when the history was dropped because the channel or bin count changed.
    pub buffer_reset: bool,
    pub range_bin: Option<usize>,
    pub distance_m: Option<f64>,
    pub waveform: Option<Vec<f64>>,
    pub spectral: Option<SpectralEstimate>,
    pub frame: Option<DisplayFrame>,
}

impl CycleReport {
    fn disconnected(sample_rate_hz: f64, buffered_rows: usize) -> Self {
        Self {
            timestamp: None,
            state: ConnectionState::Disconnected,
            sample_rate_hz,
            buffered_rows,
            buffer_reset: false,
            range_bin: None,
            distance_m: None,
            waveform: None,
            spectral: None,
            frame: None,
        }
    }

    pub fn rate_per_minute(&self) -> Option<f64> {
        self.spectral.as_ref().map(SpectralEstimate::rate_per_minute)
    }
}

/// Owns every stage and the slow-time history; driven once per acquisition tick.
pub struct VitalPipeline {
    config: PipelineConfig,
    layout: AntennaLayout,
    selection: Vec<AntennaPair>,
    mode: DisplayMode,
    state: ConnectionState,
    downsample: DownsampleStage,
    buffer: SlowTimeBuffer,
    range: RangeStage,
    beamformer: Beamformer,
    spectral: SpectralEstimator,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl VitalPipeline {
    pub fn new(config: PipelineConfig) -> StageResult<Self> {
        config.validate()?;
        let layout = AntennaLayout::from_config(&config.layout);
        let selection = config.layout.selected_pairs.clone();

        let mut downsample = DownsampleStage::new();
        downsample.initialize(&config)?;
        let mut range = RangeStage::new();
        range.initialize(&config)?;
        let mut beamformer = Beamformer::new();
        beamformer.initialize(&config)?;
        beamformer.set_channel_positions(layout.channel_positions(&selection)?);
        let mut spectral = SpectralEstimator::new();
        spectral.initialize(&config)?;

        Ok(Self {
            buffer: SlowTimeBuffer::with_capacity(config.buffer_capacity),
            config,
            layout,
            selection,
            mode: DisplayMode::default(),
            state: ConnectionState::Disconnected,
            downsample,
            range,
            beamformer,
            spectral,
            metrics: MetricsRecorder::new(),
            logger: LogManager::new("pipeline"),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn selection(&self) -> &[AntennaPair] {
        &self.selection
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn buffered_rows(&self) -> usize {
        self.buffer.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Switches the antenna pairs; the slow-time history is dropped when they change.
    pub fn set_selection(&mut self, pairs: Vec<AntennaPair>) -> StageResult<()> {
        if pairs.is_empty() {
            return Err(StageError::InvalidInput("no antenna pair selected".into()));
        }
        let positions = self.layout.channel_positions(&pairs)?;
        if pairs != self.selection {
            self.logger.record(&format!(
                "selection changed to {} pair(s), history cleared",
                pairs.len()
            ));
            self.selection = pairs;
            self.beamformer.set_channel_positions(positions);
            self.reset_history();
        }
        Ok(())
    }

    /// Switches the surfaced stage; the slow-time history is dropped when it changes.
    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        if mode != self.mode {
            self.logger
                .record(&format!("display mode {} -> {}", self.mode, mode));
            self.mode = mode;
            self.reset_history();
        }
    }

    fn reset_history(&mut self) {
        self.buffer.clear();
        self.metrics.record_reset();
    }

    /// One acquisition tick: trigger, downsample every channel, then estimate.
    ///
    /// Acquisition trouble aborts the cycle and leaves the pipeline disconnected
    /// until a later cycle succeeds.
    pub fn run_cycle(
        &mut self,
        source: &mut dyn SweepSource,
        tracker: &mut TriggerRateTracker,
    ) -> CycleReport {
        let (sample_rate, _) = resolve_sample_rate(
            tracker.rate_hz(),
            self.config.spectral.fallback_sample_rate_hz,
        );

        let frame = match source.acquire(&self.selection) {
            Ok(frame) => frame,
            Err(err) => return self.disconnect(&err, sample_rate),
        };
        tracker.record(frame.timestamp);

        let profiles = match self.downsample_frame(&frame.sweeps) {
            Ok(profiles) => profiles,
            Err(err) => return self.disconnect(&err, sample_rate),
        };

        if self.state == ConnectionState::Disconnected {
            self.logger.record("acquisition connected");
        }
        self.state = ConnectionState::Connected;

        let mut report = self.process_frame(profiles, tracker.rate_hz(), frame.sweeps.first());
        report.timestamp = Some(frame.timestamp);
        report
    }

    /// Entry point for range profiles that were downsampled elsewhere.
    pub fn ingest_profiles(&mut self, profiles: ProfileFrame, sample_rate_hz: f64) -> CycleReport {
        self.state = ConnectionState::Connected;
        self.process_frame(profiles, sample_rate_hz, None)
    }

    fn disconnect(&mut self, err: &StageError, sample_rate: f64) -> CycleReport {
        self.metrics.record_acquisition_failure();
        self.logger.degraded(&format!("cycle aborted: {}", err));
        self.state = ConnectionState::Disconnected;
        CycleReport::disconnected(sample_rate, self.buffer.len())
    }

    fn downsample_frame(&mut self, sweeps: &[RawSweep]) -> StageResult<ProfileFrame> {
        if sweeps.len() != self.selection.len() {
            return Err(StageError::Acquisition(format!(
                "expected {} sweep(s), received {}",
                self.selection.len(),
                sweeps.len()
            )));
        }
        let mut columns = Vec::with_capacity(sweeps.len());
        for sweep in sweeps {
            columns.push(self.downsample.execute(&sweep.samples)?);
        }
        let bins = columns.first().map(|column| column.len()).unwrap_or(0);
        if columns.iter().any(|column| column.len() != bins) {
            return Err(StageError::Acquisition(
                "sweeps of one trigger differ in length".into(),
            ));
        }
        let mut profiles = Array2::zeros((bins, columns.len()));
        for (channel, column) in columns.iter().enumerate() {
            profiles.index_axis_mut(Axis(1), channel).assign(column);
        }
        Ok(profiles)
    }

    fn absorb(&self, err: &StageError) {
        self.metrics.record_skipped();
        match err {
            StageError::InsufficientHistory { .. }
            | StageError::DegenerateNormalization { .. }
            | StageError::SpectralUnderrun { .. } => {
                self.logger.detail(&format!("no estimate this cycle: {}", err))
            }
            _ => self
                .logger
                .degraded(&format!("no estimate this cycle: {}", err)),
        }
    }

    fn process_frame(
        &mut self,
        profiles: ProfileFrame,
        sample_rate_hz: f64,
        raw: Option<&RawSweep>,
    ) -> CycleReport {
        let (display_rate, _) =
            resolve_sample_rate(sample_rate_hz, self.config.spectral.fallback_sample_rate_hz);
        self.metrics.record_processed();
        let mut report = CycleReport {
            state: self.state,
            ..CycleReport::disconnected(display_rate, self.buffer.len())
        };

        match self.buffer.push(profiles.view()) {
            Ok(()) => {}
            Err(
                err @ (StageError::SelectionMismatch { .. }
                | StageError::ProfileLengthMismatch { .. }),
            ) => {
                self.logger
                    .degraded(&format!("{}, history cleared", err));
                self.reset_history();
                report.buffer_reset = true;
                if let Err(err) = self.buffer.push(profiles.view()) {
                    self.absorb(&err);
                    return report;
                }
            }
            Err(err) => {
                self.absorb(&err);
                return report;
            }
        }
        report.buffered_rows = self.buffer.len();

        let mut variance = None;
        match self.buffer.materialize() {
            Ok(matrix) => match self.range.execute(&matrix) {
                Ok(estimate) => {
                    report.range_bin = Some(estimate.bin);
                    report.distance_m = Some(estimate.distance_m);
                    variance = Some(estimate.variance);
                    let input = BeamformInput {
                        matrix,
                        distance_m: estimate.distance_m,
                    };
                    match self.beamformer.execute(&input) {
                        Ok(output) => report.waveform = Some(output.waveform),
                        Err(err) => self.absorb(&err),
                    }
                }
                Err(err) => self.absorb(&err),
            },
            Err(err) => self.absorb(&err),
        }

        if let Some(waveform) = report.waveform.as_ref() {
            let input = SpectralInput {
                samples: waveform.clone(),
                sample_rate_hz,
            };
            match self.spectral.execute(&input) {
                Ok(estimate) => report.spectral = Some(estimate),
                Err(err) => self.absorb(&err),
            }
        }

        let context = DisplayContext {
            config: &self.config,
            raw,
            variance: variance.as_deref(),
            waveform: report.waveform.as_deref(),
            sample_rate_hz: display_rate,
        };
        report.frame = self.mode.render(&context);
        report
    }
}
