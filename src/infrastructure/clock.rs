use crate::domain::ports::Clock;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that can be pinned to a fixed instant.
///
/// While unpinned it follows the system clock. Used by replays and tests to
/// make time-dependent behavior deterministic.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    pinned: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        let clock = Self::new();
        clock.set(instant);
        clock
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.pinned.write().unwrap_or_else(|e| e.into_inner()) = Some(instant);
    }

    pub fn advance(&self, by: chrono::Duration) {
        let now = self.now();
        self.set(now + by);
    }

    /// Goes back to following the system clock.
    pub fn release(&self) {
        *self.pinned.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let pinned = *self.pinned.read().unwrap_or_else(|e| e.into_inner());
        pinned.unwrap_or_else(Utc::now)
    }
}
