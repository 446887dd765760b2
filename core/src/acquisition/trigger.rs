/// Exponential moving average of the interval between radar triggers.
///
/// The inverse of the averaged interval is the slow-time sample rate.
#[derive(Debug, Clone)]
pub struct TriggerRateTracker {
    alpha: f64,
    last: Option<f64>,
    ema_interval: Option<f64>,
}

impl TriggerRateTracker {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            last: None,
            ema_interval: None,
        }
    }

    /// Registers a trigger that happened at `timestamp` seconds.
    pub fn record(&mut self, timestamp: f64) {
        if let Some(last) = self.last {
            let dt = timestamp - last;
            self.ema_interval = Some(match self.ema_interval {
                None => dt,
                Some(avg) => self.alpha * dt + (1.0 - self.alpha) * avg,
            });
        }
        self.last = Some(timestamp);
    }

    /// Trigger rate in Hz, NaN until two triggers produced a positive interval.
    pub fn rate_hz(&self) -> f64 {
        match self.ema_interval {
            Some(avg) if avg > 0.0 => 1.0 / avg,
            _ => f64::NAN,
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.ema_interval = None;
    }
}

impl Default for TriggerRateTracker {
    fn default() -> Self {
        Self::new(0.3)
    }
}
