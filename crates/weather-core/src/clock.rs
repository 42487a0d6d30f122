//! Lamport logical clock.
//!
//! Every participant (aggregation server, content source, query client)
//! owns one clock. The clock is ticked for internal events, stamped onto
//! every outgoing message with [`LamportClock::send`], and merged with the
//! stamp of every incoming message with [`LamportClock::receive`].
//!
//! # Design Principles
//!
//! - The counter lives in a single [`AtomicU64`]; all three operations are
//!   compare-and-swap loops, so they are atomic with respect to each other
//!   without a lock.
//! - Arithmetic saturates at `u64::MAX` instead of wrapping, so the counter
//!   is non-decreasing under every interleaving.
//! - A remote stamp of [`UNKNOWN_TIME`] (absent or unparsable header)
//!   degrades `receive` to a plain tick.

use std::sync::atomic::{AtomicU64, Ordering};

/// Stamp value used when a peer's clock header is absent or unparsable.
pub const UNKNOWN_TIME: i64 = -1;

/// Thread-safe Lamport clock.
#[derive(Debug, Default)]
pub struct LamportClock {
    time: AtomicU64,
}

impl LamportClock {
    /// Create a clock at time 0.
    pub const fn new() -> Self {
        Self {
            time: AtomicU64::new(0),
        }
    }

    /// Create a clock starting at the given time.
    pub const fn starting_at(time: u64) -> Self {
        Self {
            time: AtomicU64::new(time),
        }
    }

    /// Return the current time without advancing the clock.
    pub fn current(&self) -> u64 {
        self.time.load(Ordering::Acquire)
    }

    /// Advance the clock for an internal event. Returns the new time.
    pub fn tick(&self) -> u64 {
        self.advance(|now| now.saturating_add(1))
    }

    /// Advance the clock to stamp an outgoing message. Returns the stamp.
    pub fn send(&self) -> u64 {
        self.tick()
    }

    /// Merge a stamp received from a peer: `time = max(time, remote) + 1`.
    ///
    /// Negative stamps (including [`UNKNOWN_TIME`]) are treated as older
    /// than any local time. Returns the new time.
    pub fn receive(&self, remote: i64) -> u64 {
        let remote = u64::try_from(remote).unwrap_or(0);
        self.advance(|now| now.max(remote).saturating_add(1))
    }

    /// Apply `step` atomically and return the value it produced.
    fn advance(&self, step: impl Fn(u64) -> u64) -> u64 {
        let mut current = self.time.load(Ordering::Acquire);
        loop {
            let next = step(current);
            match self.time.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }
}

impl core::fmt::Display for LamportClock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "LamportClock [time={}]", self.current())
    }
}
