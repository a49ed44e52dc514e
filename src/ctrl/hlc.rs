//! # Hybrid Logical Clock
//!
//! This module contains the logic for generating and encoding [`HlcTimestamp`]s, through the
//! [`HlcClock`] implementation. Clock skew across restarts is a possibility, that the user
//! has to account for, depending on the wall-clock source feeding the generator.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

/// # Hybrid Logical Clock Timestamp
///
/// Squall uses these to order versioned writes and to decide pushes between
/// conflicting transactions. Timestamps are totally ordered: first by wall
/// millis, then by the logical counter.
#[derive(
    Debug,
    Display,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[debug("{}.{}", self.millis(), self.counter())]
#[display("{}.{}", self.millis(), self.counter())]
pub struct HlcTimestamp(
    /// Packs the millis in the upper 48 bits and the counter in the lower 16 bits.
    u64,
);

impl HlcTimestamp {
    /// The zero timestamp, ordered before every generated timestamp.
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn new(millis: u64, counter: u16) -> Self {
        Self((millis << 16) | (counter as u64))
    }

    #[inline]
    pub const fn millis(&self) -> u64 {
        self.0 >> 16
    }

    #[inline]
    pub const fn counter(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// The smallest timestamp ordered after this one.
    #[inline]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// Generates unique [`HlcTimestamp`]s through the [`now`] method.
///
/// Shared across the store's tasks; successive calls return strictly
/// increasing timestamps even when the wall clock stalls or jumps backwards.
/// Conflict pushes rely on this: the observed "now" sent with each retry must
/// advance, or an abandoned transaction would never be detected as timed out.
///
/// [`now`]: Self::now
#[derive(Debug, Default)]
pub struct HlcClock {
    last_timestamp: AtomicU64,
}

impl HlcClock {
    pub fn new() -> Self {
        Default::default()
    }

    /// Generate the next timestamp from the given wall-clock reading.
    pub fn now_at(&self, now_ms: u64) -> HlcTimestamp {
        let fresh = HlcTimestamp::new(now_ms, 0);
        // `fetch_update` hands back the value *before* the store, so the stamp
        // we generated has to be recomputed from it the same way the closure did.
        let prev = self
            .last_timestamp
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                if fresh.0 > last {
                    // Start a fresh stamp from current ms, with counter reset to zero.
                    Some(fresh.0)
                } else {
                    // Increment counter, potentially jumping physical clock, if counter is
                    // exhausted. This will eventually recover, once we get back ahead of time.
                    // In practice, this will rarely overflow the counter, unless we really need
                    // more than `2^16-1 = 65535` stamps **every millisecond**.
                    Some(last + 1)
                }
            })
            .expect("clock update closure never declines");

        if fresh.0 > prev {
            fresh
        } else {
            HlcTimestamp(prev + 1)
        }
    }

    /// Generate the next timestamp from the system wall clock.
    pub fn now(&self) -> HlcTimestamp {
        let wall_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.now_at(wall_ms)
    }
}
