use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::acquisition::sweep::AntennaPair;
use crate::prelude::{StageError, StageResult};

/// Antenna geometry table (metres) and the pairs selected at start-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub tx: BTreeMap<u32, [f64; 3]>,
    pub rx: BTreeMap<u32, [f64; 3]>,
    pub selected_pairs: Vec<AntennaPair>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let tx = BTreeMap::from([
            (1, [-0.03, 0.056, 0.0]),
            (4, [0.03, 0.056, 0.0]),
            (17, [-0.03, -0.024, 0.0]),
            (18, [0.03, -0.024, 0.0]),
        ]);
        let rx = BTreeMap::from([
            (2, [-0.01, 0.056, 0.0]),
            (3, [0.01, 0.056, 0.0]),
            (4, [0.03, 0.056, 0.0]),
            (6, [-0.01, 0.036, 0.0]),
            (7, [0.01, 0.036, 0.0]),
            (8, [0.03, 0.036, 0.0]),
            (10, [-0.01, 0.016, 0.0]),
            (11, [0.01, 0.016, 0.0]),
            (12, [0.03, 0.016, 0.0]),
            (14, [-0.01, -0.004, 0.0]),
            (15, [0.01, -0.004, 0.0]),
            (16, [0.03, -0.004, 0.0]),
            (18, [0.03, -0.024, 0.0]),
        ]);
        Self {
            tx,
            rx,
            selected_pairs: vec![
                AntennaPair::new(1, 2),
                AntennaPair::new(1, 6),
                AntennaPair::new(1, 10),
                AntennaPair::new(1, 14),
            ],
        }
    }
}

/// Immutable antenna positions; virtual channels sit at the tx/rx midpoint.
#[derive(Debug, Clone)]
pub struct AntennaLayout {
    tx: BTreeMap<u32, [f64; 3]>,
    rx: BTreeMap<u32, [f64; 3]>,
}

impl AntennaLayout {
    pub fn new(tx: BTreeMap<u32, [f64; 3]>, rx: BTreeMap<u32, [f64; 3]>) -> Self {
        Self { tx, rx }
    }

    pub fn from_config(config: &LayoutConfig) -> Self {
        Self::new(config.tx.clone(), config.rx.clone())
    }

    pub fn tx_position(&self, id: u32) -> StageResult<[f64; 3]> {
        self.tx.get(&id).copied().ok_or(StageError::UnknownAntenna(id))
    }

    pub fn rx_position(&self, id: u32) -> StageResult<[f64; 3]> {
        self.rx.get(&id).copied().ok_or(StageError::UnknownAntenna(id))
    }

    pub fn virtual_position(&self, pair: AntennaPair) -> StageResult<[f64; 3]> {
        let tx = self.tx_position(pair.tx)?;
        let rx = self.rx_position(pair.rx)?;
        Ok([
            (tx[0] + rx[0]) / 2.0,
            (tx[1] + rx[1]) / 2.0,
            (tx[2] + rx[2]) / 2.0,
        ])
    }

    /// L×3 matrix of virtual positions, one row per pair in selection order.
    pub fn channel_positions(&self, pairs: &[AntennaPair]) -> StageResult<Array2<f64>> {
        let mut positions = Array2::zeros((pairs.len(), 3));
        for (row, &pair) in pairs.iter().enumerate() {
            let position = self.virtual_position(pair)?;
            for (axis, value) in position.into_iter().enumerate() {
                positions[[row, axis]] = value;
            }
        }
        Ok(positions)
    }
}

impl Default for AntennaLayout {
    fn default() -> Self {
        Self::from_config(&LayoutConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_position_is_midpoint() {
        let layout = AntennaLayout::default();
        let position = layout.virtual_position(AntennaPair::new(1, 2)).unwrap();
        assert!((position[0] + 0.02).abs() < 1e-12);
        assert!((position[1] - 0.056).abs() < 1e-12);
        assert_eq!(position[2], 0.0);
    }

    #[test]
    fn channel_positions_follow_selection_order() {
        let layout = AntennaLayout::default();
        let pairs = [AntennaPair::new(1, 14), AntennaPair::new(1, 2)];
        let positions = layout.channel_positions(&pairs).unwrap();
        assert_eq!(positions.dim(), (2, 3));
        assert!((positions[[0, 1]] - 0.026).abs() < 1e-12);
        assert!((positions[[1, 1]] - 0.056).abs() < 1e-12);
    }

    #[test]
    fn unknown_antenna_is_reported() {
        let layout = AntennaLayout::default();
        let err = layout
            .channel_positions(&[AntennaPair::new(1, 99)])
            .unwrap_err();
        assert_eq!(err, StageError::UnknownAntenna(99));
    }
}
