use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

/// Wall-clock source used to time the panorama fade-in.
///
/// Timestamps are milliseconds since the Unix epoch so that they can be
/// compared across strategies without sharing an `Instant` origin.
pub trait Clock {
    fn now_millis(&self) -> f64;
}

/// Clock backed by the operating system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }
}

/// Clock that only moves when told to. Used by tests and headless runs.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: RwLock<f64>,
}

impl ManualClock {
    pub fn new(start_millis: f64) -> Self {
        Self {
            now: RwLock::new(start_millis),
        }
    }

    pub fn set(&self, millis: f64) {
        *self.now.write() = millis;
    }

    pub fn advance(&self, millis: f64) {
        *self.now.write() += millis;
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> f64 {
        *self.now.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_only_on_request() {
        let clock = ManualClock::new(1_000.0);
        assert_eq!(clock.now_millis(), 1_000.0);
        clock.advance(250.0);
        assert_eq!(clock.now_millis(), 1_250.0);
        clock.set(10.0);
        assert_eq!(clock.now_millis(), 10.0);
    }

    #[test]
    fn system_clock_is_past_the_epoch() {
        let first = SystemClock.now_millis();
        let second = SystemClock.now_millis();
        assert!(first > 0.0);
        assert!(second >= first);
    }
}
