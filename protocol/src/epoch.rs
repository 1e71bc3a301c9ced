//! # Epoch Clock
//!
//! Maps wall-clock time to epoch indices:
//! `epoch(t) = floor((t - epoch_zero) / epoch_duration)`.
//!
//! Nothing here advances time. Every vault operation receives `now` from the
//! caller; a [`Clock`] is only a convenience for whoever composes the
//! components (see `ManualClock` for tests and simulations).

use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{EpochIndex, Timestamp};

/// Pure mapping from timestamps to epochs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochClock {
    epoch_zero: Timestamp,
    duration_secs: i64,
}

impl EpochClock {
    /// Creates a clock whose epoch 0 starts at `epoch_zero`.
    ///
    /// Non-positive durations are clamped to one second so the mapping
    /// stays total; deployment validation rejects them before this point.
    pub fn new(epoch_zero: Timestamp, duration: Duration) -> Self {
        Self {
            epoch_zero,
            duration_secs: duration.num_seconds().max(1),
        }
    }

    /// Start of epoch 0.
    pub fn epoch_zero(&self) -> Timestamp {
        self.epoch_zero
    }

    /// Length of one epoch.
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs)
    }

    /// Epoch containing `t`. Times before epoch zero map to epoch 0.
    pub fn epoch_at(&self, t: Timestamp) -> EpochIndex {
        let elapsed = (t - self.epoch_zero).num_seconds();
        if elapsed <= 0 {
            return 0;
        }
        (elapsed / self.duration_secs) as EpochIndex
    }

    /// Epoch containing `now`.
    pub fn current_epoch(&self, now: Timestamp) -> EpochIndex {
        self.epoch_at(now)
    }

    /// First instant of `epoch`.
    pub fn epoch_start(&self, epoch: EpochIndex) -> Timestamp {
        let offset = (epoch as i64).saturating_mul(self.duration_secs);
        self.epoch_zero + Duration::seconds(offset)
    }

    /// Whether `epoch` has fully elapsed at `now`.
    pub fn has_elapsed(&self, epoch: EpochIndex, now: Timestamp) -> bool {
        self.current_epoch(now) > epoch
    }
}

// ---------------------------------------------------------------------------
// Clock sources
// ---------------------------------------------------------------------------

/// Source of the current time for a composed deployment.
pub trait Clock: Send + Sync {
    /// The current timestamp.
    fn now(&self) -> Timestamp;
}

/// Reads the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying instant, so a test can hold one handle
/// and advance time between "transactions" executed through another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<Timestamp>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Moves the clock forward by `by`. Negative durations are ignored.
    pub fn advance(&self, by: Duration) {
        if by > Duration::zero() {
            let mut now = self.now.write();
            *now += by;
        }
    }

    /// Jumps to `t` if it is not in the past.
    pub fn set(&self, t: Timestamp) {
        let mut now = self.now.write();
        if t > *now {
            *now = t;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.read()
    }
}
