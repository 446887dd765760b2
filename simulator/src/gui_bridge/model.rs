use serde::{Deserialize, Serialize};
use vitalcore::processing::{ConnectionState, CycleReport, DisplayFrame};

/// Latest cycle as seen by a presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizationModel {
    pub connected: bool,
    pub distance_m: Option<f64>,
    pub breathing_per_minute: Option<f64>,
    /// Rate computed with the fallback slow-time rate.
    pub approximate: bool,
    pub buffered_rows: usize,
    pub frame: Option<DisplayFrame>,
}

impl Default for VisualizationModel {
    fn default() -> Self {
        Self {
            connected: false,
            distance_m: None,
            breathing_per_minute: None,
            approximate: false,
            buffered_rows: 0,
            frame: None,
        }
    }
}

impl From<&CycleReport> for VisualizationModel {
    fn from(report: &CycleReport) -> Self {
        Self {
            connected: report.state == ConnectionState::Connected,
            distance_m: report.distance_m,
            breathing_per_minute: report.rate_per_minute(),
            approximate: report
                .spectral
                .as_ref()
                .map(|s| s.approximate)
                .unwrap_or(false),
            buffered_rows: report.buffered_rows,
            frame: report.frame.clone(),
        }
    }
}
