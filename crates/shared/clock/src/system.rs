use chrono::Utc;
use helm_core::{Clock, Timestamp};
use parking_lot::Mutex;

/// Wall clock for production
///
/// Readings never go backwards: if the system time is stepped back (NTP
/// correction, manual change) the last reading is repeated until wall time
/// catches up, so staleness and uptime arithmetic never sees negative ages.
pub struct SystemClock {
    last: Mutex<Option<Timestamp>>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    fn observe(&self, wall: Timestamp) -> Timestamp {
        let mut last = self.last.lock();
        let now = match *last {
            Some(prev) if prev > wall => prev,
            _ => wall,
        };
        *last = Some(now);
        now
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        self.observe(Utc::now())
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}
