//! Time source shared by every subsystem that stamps records.
//!
//! The board has no battery-backed RTC: after a deep sleep the system
//! clock restarts from zero and is corrected by NTP over the cellular
//! link. The correction is modelled as an offset held by the clock so
//! that the statistics module can shift its stored stamps by the same
//! delta before the correction lands.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch, UTC.
    fn now_utc(&self) -> i64;

    /// Shift the clock by `delta` seconds.
    fn adjust(&self, delta: i64);
}

/// Wall clock plus an adjustable offset.
#[derive(Default)]
pub struct SystemClock {
    offset: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_utc(&self) -> i64 {
        let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        };
        now + self.offset.load(Ordering::Relaxed)
    }

    fn adjust(&self, delta: i64) {
        self.offset.fetch_add(delta, Ordering::Relaxed);
    }
}

/// Manually driven clock for tests and host-side simulation.
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::Relaxed);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> i64 {
        self.now.load(Ordering::Relaxed)
    }

    fn adjust(&self, delta: i64) {
        self.now.fetch_add(delta, Ordering::Relaxed);
    }
}
