use serde::{Deserialize, Serialize};
use std::fmt;

use crate::prelude::StageResult;

/// One transmit/receive antenna combination, identified by 1-based antenna ids.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AntennaPair {
    pub tx: u32,
    pub rx: u32,
}

impl AntennaPair {
    pub fn new(tx: u32, rx: u32) -> Self {
        Self { tx, rx }
    }
}

impl fmt::Display for AntennaPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.tx, self.rx)
    }
}

/// Real fast-time samples of one channel for one trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSweep {
    pub pair: AntennaPair,
    pub samples: Vec<f64>,
}

impl RawSweep {
    pub fn new(pair: AntennaPair, samples: Vec<f64>) -> Self {
        Self { pair, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Everything the acquisition boundary returns for one trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepFrame {
    /// Trigger time in seconds on the acquisition clock.
    pub timestamp: f64,
    pub sweeps: Vec<RawSweep>,
}

impl SweepFrame {
    pub fn new(timestamp: f64, sweeps: Vec<RawSweep>) -> Self {
        Self { timestamp, sweeps }
    }

    pub fn channel_count(&self) -> usize {
        self.sweeps.len()
    }
}

/// Collaborator that triggers the radar and returns one sweep per requested pair.
///
/// Implementations report hardware trouble as `StageError::Acquisition`.
pub trait SweepSource {
    fn acquire(&mut self, pairs: &[AntennaPair]) -> StageResult<SweepFrame>;
}
