//! Wall-clock abstraction so lifecycle scheduling can be driven deterministically.

use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

/// Source of wall-clock time for schedule computations and dedup windows.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock time.
    fn now(&self) -> SystemTime;

    /// Current wall-clock time in milliseconds since UNIX epoch.
    fn now_ms(&self) -> u64 {
        self.now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Production clock backed by [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
