//! Heartbeat timestamps
//!
//! Timestamps are 100-nanosecond ticks counted from 0001-01-01T00:00:00 UTC,
//! encoded as 8 bytes in native byte order. Existing test centrals decode the
//! heartbeat and the read/write characteristic in this format.

use byteorder::{ByteOrder, NativeEndian};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Ticks between 0001-01-01 and the Unix epoch.
const UNIX_EPOCH_TICKS: u64 = 621_355_968_000_000_000;

const NANOS_PER_TICK: u128 = 100;

/// A wall-clock tick source that never repeats a value.
///
/// Two calls landing in the same 100 ns window (or a wall clock stepping
/// backwards) still produce strictly increasing values.
#[derive(Debug, Default)]
pub struct TickClock {
    last: AtomicU64,
}

impl TickClock {
    /// Creates a new clock
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Returns the current tick count, strictly greater than any value
    /// previously returned by this clock.
    pub fn now(&self) -> u64 {
        let wall = wall_ticks();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Returns the current tick count as an 8-byte payload.
    pub fn now_bytes(&self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        NativeEndian::write_u64(&mut buf, self.now());
        buf
    }
}

fn wall_ticks() -> u64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    UNIX_EPOCH_TICKS + (since_epoch.as_nanos() / NANOS_PER_TICK) as u64
}
