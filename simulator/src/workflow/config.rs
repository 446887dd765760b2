use crate::generator::scene::SceneConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use vitalcore::prelude::PipelineConfig;
use vitalcore::processing::DisplayMode;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub pipeline: PipelineConfig,
    pub scene: SceneConfig,
    /// Cycles run by an offline pass.
    pub cycles: usize,
    pub mode: DisplayMode,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            scene: SceneConfig::default(),
            cycles: 60,
            mode: DisplayMode::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    /// Applies command-line overrides on top of the loaded or default values.
    pub fn with_overrides(mut self, cycles: Option<usize>, mode: Option<DisplayMode>) -> Self {
        if let Some(cycles) = cycles {
            self.cycles = cycles;
        }
        if let Some(mode) = mode {
            self.mode = mode;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn overrides_replace_only_given_values() {
        let cfg = WorkflowConfig::default().with_overrides(Some(12), None);
        assert_eq!(cfg.cycles, 12);
        assert_eq!(cfg.mode, DisplayMode::Physiological);
    }

    #[test]
    fn config_load_reads_partial_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"cycles: 30\nmode: range_profile\npipeline:\n  buffer_capacity: 40\nscene:\n  target_bin: 30.0\n  dropout_every: 5\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.cycles, 30);
        assert_eq!(cfg.mode, DisplayMode::RangeProfile);
        assert_eq!(cfg.pipeline.buffer_capacity, 40);
        assert_eq!(cfg.pipeline.frequency_steps, 137);
        assert_eq!(cfg.scene.target_bin, 30.0);
        assert_eq!(cfg.scene.dropout_every, Some(5));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = WorkflowConfig::load("/nonexistent/workflow.yaml").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/workflow.yaml"));
    }
}
