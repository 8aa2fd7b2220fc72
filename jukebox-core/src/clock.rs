use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// A source of "now".
///
/// Every piece of timestamp math in the system goes through this trait, so
/// that tests can substitute a clock that only moves when told to.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The clock used outside of tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that stands still until advanced.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(instant: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(instant),
        }
    }

    /// Moves the clock forward by the given duration.
    pub fn advance(&self, amount: Duration) {
        let mut now = self.now.lock();
        *now = *now + amount;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
