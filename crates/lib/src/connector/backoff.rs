use std::time::Duration;

const MIN_DELAY_FLOOR: Duration = Duration::from_millis(1);

/// Poll-loop delay: reset to `min` whenever a poll delivered messages, doubled (capped at `max`) otherwise.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// `min` is raised to 1ms so an empty poll always backs off.
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = min.max(MIN_DELAY_FLOOR);
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
        }
    }

    /// Delay before the next poll, given how many messages the last poll returned.
    pub fn next(&mut self, received: usize) -> Duration {
        if received > 0 {
            self.current = self.min;
        }
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}
