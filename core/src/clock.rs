//! Time sources supplied by the execution environment

use crate::types::Timestamp;
use chrono::Utc;
use std::cell::Cell;

pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Wall clock (seconds since the Unix epoch)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().timestamp().max(0) as Timestamp
    }
}

/// Hand-driven clock for scenarios and tests. Never moves backwards.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.now.set(self.now.get().saturating_add(secs));
    }

    pub fn advance_days(&self, days: u64) {
        self.advance(days.saturating_mul(crate::constants::SECONDS_PER_DAY));
    }

    /// Jump to `to` if it is later than the current time
    pub fn set(&self, to: Timestamp) {
        if to > self.now.get() {
            self.now.set(to);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }
}
