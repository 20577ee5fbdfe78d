//! Time source capability
//!
//! Groups and muxers take a clock at construction instead of calling
//! `Instant::now()` directly, so tests can drive time by hand.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by tokio's time driver
///
/// Follows paused time in `#[tokio::test(start_paused = true)]`. Outside a
/// runtime it falls back to the system monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        if tokio::runtime::Handle::try_current().is_ok() {
            tokio::time::Instant::now().into_std()
        } else {
            Instant::now()
        }
    }
}

/// Hand-driven clock for tests
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
