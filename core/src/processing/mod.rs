pub mod beamformer;
pub mod display;
pub mod downsample;
pub mod pipeline;
pub mod range;
pub mod slow_time;
pub mod spectral;

pub use beamformer::{BeamformConfig, Beamformer, CombineMode, WeightCache};
pub use display::{DisplayFrame, DisplayMode};
pub use downsample::DownsampleStage;
pub use pipeline::{ConnectionState, CycleReport, VitalPipeline};
pub use range::{RangeEstimate, RangeStage};
pub use slow_time::SlowTimeBuffer;
pub use spectral::{PsdMethod, SpectralConfig, SpectralEstimate, SpectralEstimator};
