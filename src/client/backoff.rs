use std::time::Duration;

use crate::config::ClientSettings;

const MAX_MULTIPLIER: f64 = 100.0;
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Exponential reconnect delay: starts at `initial`, grows by `multiplier`
/// after each failed attempt, never exceeds `max`, and returns to `initial`
/// once a connection succeeds. `initial` is at least one millisecond, so
/// a zero setting still backs off.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let initial = initial.max(MIN_DELAY);
        let max = max.max(initial);
        Self {
            initial,
            max,
            multiplier: if multiplier.is_finite() {
                multiplier.clamp(1.0, MAX_MULTIPLIER)
            } else {
                1.0
            },
            current: initial,
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(
            settings.reconnect_initial(),
            settings.reconnect_max(),
            settings.backoff_multiplier,
        )
    }

    /// The delay to wait now; the following call returns a longer one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.mul_f64(self.multiplier).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
