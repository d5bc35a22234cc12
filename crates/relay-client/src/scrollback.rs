//! Bounded output history for background sessions.
//!
//! Sessions keep receiving output while their tab is not focused. The last N
//! bytes are kept here so the tab can be redrawn when it regains focus.

use std::collections::VecDeque;

/// Default per-session scrollback (256 KiB).
pub const DEFAULT_SCROLLBACK_BYTES: usize = 256 * 1024;

/// A fixed-capacity byte history that drops the oldest bytes first.
#[derive(Debug)]
pub struct Scrollback {
    buf: VecDeque<u8>,
    capacity: usize,
    total_written: u64,
}

impl Scrollback {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity.min(DEFAULT_SCROLLBACK_BYTES)),
            capacity,
            total_written: 0,
        }
    }

    /// Append output, evicting the oldest bytes past capacity.
    pub fn write(&mut self, data: &[u8]) {
        self.total_written += data.len() as u64;
        if self.capacity == 0 {
            return;
        }

        // Only the tail of an oversized chunk can survive.
        let data = if data.len() > self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };

        let overflow = (self.buf.len() + data.len()).saturating_sub(self.capacity);
        self.buf.drain(..overflow);
        self.buf.extend(data);
    }

    /// Retained bytes, oldest first.
    pub fn snapshot(&self) -> Vec<u8> {
        self.buf.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes ever written, including evicted ones.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }
}
