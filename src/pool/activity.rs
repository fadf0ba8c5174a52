//! Parent activity clock.
//!
//! Workers launched with `-idlespan` poll the dispatcher for the time
//! since the last external request and self-terminate once it exceeds
//! their span. The clock is stamped by the scheduler on every acquire;
//! serving the poll endpoint itself must not stamp it.

use std::sync::Mutex;
use std::time::Instant;

/// Records the wall-clock instant of the most recent external request.
#[derive(Debug, Default)]
pub struct ActivityClock {
    last_call: Mutex<Option<Instant>>,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp the clock with "now".
    pub fn touch(&self) {
        let mut last = self.last_call.lock().expect("activity mutex poisoned");
        *last = Some(Instant::now());
    }

    /// Whole seconds since the last stamp, or -1 if never stamped.
    pub fn idle_seconds(&self) -> i64 {
        let last = self.last_call.lock().expect("activity mutex poisoned");
        match *last {
            Some(instant) => instant.elapsed().as_secs() as i64,
            None => -1,
        }
    }
}
