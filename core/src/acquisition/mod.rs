pub mod layout;
pub mod sweep;
pub mod trigger;

pub use layout::{AntennaLayout, LayoutConfig};
pub use sweep::{AntennaPair, RawSweep, SweepFrame, SweepSource};
pub use trigger::TriggerRateTracker;
