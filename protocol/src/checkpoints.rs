//! # Checkpoints
//!
//! Append-only history of a value over time. Slashing needs to know how
//! much stake existed at a past capture timestamp and how much had already
//! been slashed by then, so every total that matters for exposure is
//! recorded here on each change.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// One recorded value and the instant it took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// When the value took effect.
    pub at: Timestamp,
    /// The value from `at` until the next checkpoint.
    pub value: u128,
    /// Lowest value written at `at`, including writes later overwritten.
    pub low: u128,
}

/// Time-ordered history of a `u128` value. Unset history reads as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoints {
    history: Vec<Checkpoint>,
}

impl Checkpoints {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` as of `at`.
    ///
    /// Several writes at the same instant collapse into one checkpoint that
    /// still remembers the lowest of them. Timestamps earlier than the latest
    /// checkpoint are clamped to it, so the history never goes back in time.
    pub fn push(&mut self, at: Timestamp, value: u128) {
        match self.history.last_mut() {
            Some(last) if at <= last.at => {
                last.value = value;
                last.low = last.low.min(value);
            }
            _ => self.history.push(Checkpoint {
                at,
                value,
                low: value,
            }),
        }
    }

    /// Value in effect at `at`: the latest checkpoint not after `at`.
    pub fn upper_lookup(&self, at: Timestamp) -> u128 {
        let idx = self.history.partition_point(|c| c.at <= at);
        if idx == 0 {
            0
        } else {
            self.history[idx - 1].value
        }
    }

    /// Lowest value held at any point after `at`, starting from the value in
    /// effect at `at`.
    pub fn min_since(&self, at: Timestamp) -> u128 {
        let idx = self.history.partition_point(|c| c.at <= at);
        self.history[idx..]
            .iter()
            .fold(self.upper_lookup(at), |low, c| low.min(c.low))
    }

    /// Most recent value.
    pub fn latest(&self) -> u128 {
        self.history.last().map(|c| c.value).unwrap_or(0)
    }

    /// Number of recorded checkpoints.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether nothing was ever recorded.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
