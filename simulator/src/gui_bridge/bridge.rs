use crate::gui_bridge::model::VisualizationModel;
use anyhow::{anyhow, Result};
use log::info;
use std::sync::{Arc, RwLock};

/// Holds the latest model for a presentation layer and prints status lines.
#[derive(Clone, Default)]
pub struct GuiBridge {
    state: Arc<RwLock<VisualizationModel>>,
}

impl GuiBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, model: &VisualizationModel) -> Result<()> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| anyhow!("visualization state lock poisoned"))?;
        *guard = model.clone();
        let points = guard.frame.as_ref().map(|f| f.values.len()).unwrap_or(0);
        match (guard.distance_m, guard.breathing_per_minute) {
            (Some(distance), Some(rate)) => println!(
                "[GUI] target {:.2} m, breathing {:.1} /min{}, {} plot points",
                distance,
                rate,
                if guard.approximate { " (approx.)" } else { "" },
                points
            ),
            (Some(distance), None) => println!(
                "[GUI] target {:.2} m, waiting for history ({} rows)",
                distance, guard.buffered_rows
            ),
            _ if !guard.connected => println!("[GUI] radar disconnected"),
            _ => println!("[GUI] collecting slow-time history ({} rows)", guard.buffered_rows),
        }
        Ok(())
    }

    pub fn publish_status(&self, message: &str) {
        info!("{}", message);
        println!("[GUI] {}", message);
    }

    pub fn snapshot(&self) -> Result<VisualizationModel> {
        self.state
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| anyhow!("visualization state lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::WorkflowConfig;
    use crate::workflow::runner::Runner;
    use crate::generator::scene::SceneConfig;

    #[test]
    fn gui_bridge_updates_state() {
        let cfg = WorkflowConfig {
            scene: SceneConfig {
                sweep_len: 1024,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut runner = Runner::new(&cfg).unwrap();
        let gui = GuiBridge::new();
        assert!(!gui.snapshot().unwrap().connected);

        let report = runner.tick();
        gui.publish(&VisualizationModel::from(&report)).unwrap();
        let snapshot = gui.snapshot().unwrap();
        assert!(snapshot.connected);
        assert_eq!(snapshot.buffered_rows, 1);
        assert!(snapshot.distance_m.is_none());
    }
}
