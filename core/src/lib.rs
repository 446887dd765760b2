//! Signal-processing core for contact-free vital-sign radar.
//!
//! Raw fast-time sweeps are downsampled to range profiles, stacked over slow
//! time, and reduced to a target distance, a beamformed chest-motion waveform
//! and its dominant breathing frequency.

pub mod acquisition;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use acquisition::{AntennaLayout, AntennaPair, RawSweep, SweepFrame, SweepSource, TriggerRateTracker};
pub use prelude::{PipelineConfig, ProcessingStage, StageError, StageResult};
pub use processing::{ConnectionState, CycleReport, DisplayMode, VitalPipeline};
