//! Time source used for scheduling math and escalation deadlines.

use chrono::{DateTime, Utc};

/// Provides the current time.
///
/// Every component that compares against "now" takes a clock instead of
/// calling `Utc::now()` directly, so scheduling can be tested deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_tracks_wall_time() {
        let before = Utc::now();
        let now = SystemClock.now();
        let after = Utc::now();
        assert!(now >= before);
        assert!(now <= after);
    }
}
