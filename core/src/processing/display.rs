use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::acquisition::sweep::RawSweep;
use crate::prelude::{PipelineConfig, StageError};
use crate::processing::downsample::downconvert;
use crate::processing::range::range_axis;

/// Which stage of the cycle is surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Last raw sweep of the first channel, peak-normalized.
    Raw,
    /// Magnitude of that sweep after carrier removal, peak-normalized.
    Baseband,
    /// Slow-time variance against range.
    RangeProfile,
    /// Beamformed slow-time waveform.
    #[default]
    Physiological,
}

impl DisplayMode {
    pub const ALL: [DisplayMode; 4] = [
        DisplayMode::Raw,
        DisplayMode::Baseband,
        DisplayMode::RangeProfile,
        DisplayMode::Physiological,
    ];

    /// Label of the x axis of frames rendered in this mode.
    pub fn axis_unit(self) -> &'static str {
        match self {
            DisplayMode::Raw | DisplayMode::Baseband => "s (fast time)",
            DisplayMode::RangeProfile => "m",
            DisplayMode::Physiological => "s (slow time)",
        }
    }

    /// Builds the frame for this mode, or `None` when its stage produced nothing
    /// this cycle.
    pub fn render(self, context: &DisplayContext<'_>) -> Option<DisplayFrame> {
        let (axis, values) = match self {
            DisplayMode::Raw => {
                let sweep = context.raw?;
                let axis = fast_time_axis(context.config, sweep.len());
                (axis, peak_normalized(sweep.samples.clone()))
            }
            DisplayMode::Baseband => {
                let sweep = context.raw?;
                let magnitude = downconvert(
                    &sweep.samples,
                    context.config.fast_time_rate_hz,
                    context.config.carrier_hz,
                )
                .into_iter()
                .map(|value| value.norm())
                .collect();
                (fast_time_axis(context.config, sweep.len()), peak_normalized(magnitude))
            }
            DisplayMode::RangeProfile => {
                let variance = context.variance?;
                (range_axis(context.config, variance.len()), variance.to_vec())
            }
            DisplayMode::Physiological => {
                let waveform = context.waveform?;
                let rate = context.sample_rate_hz;
                let axis = (0..waveform.len())
                    .map(|idx| if rate > 0.0 { idx as f64 / rate } else { idx as f64 })
                    .collect();
                (axis, waveform.to_vec())
            }
        };
        Some(DisplayFrame {
            mode: self,
            unit: self.axis_unit().to_string(),
            axis,
            values,
        })
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisplayMode::Raw => "raw",
            DisplayMode::Baseband => "baseband",
            DisplayMode::RangeProfile => "range-profile",
            DisplayMode::Physiological => "physiological",
        };
        f.write_str(name)
    }
}

impl FromStr for DisplayMode {
    type Err = StageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().replace('_', "-").as_str() {
            "raw" => Ok(DisplayMode::Raw),
            "baseband" | "iq" => Ok(DisplayMode::Baseband),
            "range-profile" | "range" | "distance" => Ok(DisplayMode::RangeProfile),
            "physiological" | "vital" => Ok(DisplayMode::Physiological),
            other => Err(StageError::InvalidInput(format!("unknown display mode '{}'", other))),
        }
    }
}

/// Borrowed view of one cycle's intermediate results.
pub struct DisplayContext<'a> {
    pub config: &'a PipelineConfig,
    pub raw: Option<&'a RawSweep>,
    pub variance: Option<&'a [f64]>,
    pub waveform: Option<&'a [f64]>,
    pub sample_rate_hz: f64,
}

/// Plot-ready series handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayFrame {
    pub mode: DisplayMode,
    pub unit: String,
    pub axis: Vec<f64>,
    pub values: Vec<f64>,
}

fn fast_time_axis(config: &PipelineConfig, len: usize) -> Vec<f64> {
    (0..len)
        .map(|n| n as f64 / config.fast_time_rate_hz)
        .collect()
}

fn peak_normalized(mut values: Vec<f64>) -> Vec<f64> {
    let peak = values.iter().fold(0.0f64, |max, v| max.max(v.abs()));
    if peak > 0.0 {
        values.iter_mut().for_each(|v| *v /= peak);
    }
    values
}
