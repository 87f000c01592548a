//! Kernel log ring
//!
//! A fixed-capacity byte ring shared by the whole kernel. Writers append;
//! readers keep their own dequeue index, so any number of readers can drain
//! the same ring independently. Indices grow monotonically and are reduced
//! modulo the capacity only when touching the buffer. A reader that falls
//! more than one capacity behind silently skips to the oldest byte still
//! retained.
//!
//! [`RingLogger`] plugs the ring into the `log` facade.

use crate::sync::lock;
use log::{LevelFilter, Log, Metadata, Record};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

struct RingState {
    buffer: Vec<u8>,
    enqueue: u64,
}

pub struct LogRing {
    capacity: usize,
    state: Mutex<RingState>,
    readable: Condvar,
}

impl std::fmt::Debug for LogRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogRing")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl LogRing {
    /// Creates a ring holding at most `capacity` bytes (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(RingState {
                buffer: vec![0u8; capacity],
                enqueue: 0,
            }),
            readable: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends bytes, overwriting the oldest ones once the ring is full
    pub fn enqueue(&self, bytes: &[u8]) {
        {
            let mut state = lock(&self.state);
            // Only the tail of an oversized write can be retained
            let skip = bytes.len().saturating_sub(self.capacity);
            let mut position = state.enqueue + skip as u64;
            for byte in &bytes[skip..] {
                let slot = (position % self.capacity as u64) as usize;
                state.buffer[slot] = *byte;
                position += 1;
            }
            state.enqueue += bytes.len() as u64;
        }
        self.readable.notify_all();
    }

    pub fn enqueue_index(&self) -> u64 {
        lock(&self.state).enqueue
    }

    fn oldest(&self, enqueue: u64, dequeue: u64) -> u64 {
        dequeue.max(enqueue.saturating_sub(self.capacity as u64))
    }

    fn available(&self, enqueue: u64, dequeue: u64) -> usize {
        enqueue.saturating_sub(self.oldest(enqueue, dequeue)) as usize
    }

    /// How many bytes a reader at `dequeue` would get, capped at `max`
    pub fn wanted_size(&self, dequeue: u64, max: usize) -> usize {
        let enqueue = lock(&self.state).enqueue;
        self.available(enqueue, dequeue).min(max)
    }

    pub fn has_enough_bytes(&self, dequeue: u64, min: usize) -> bool {
        let enqueue = lock(&self.state).enqueue;
        self.available(enqueue, dequeue) >= min.min(self.capacity)
    }

    /// Copies bytes past `dequeue` into `out`
    ///
    /// Returns the reader's new dequeue index and the number of bytes copied.
    pub fn dequeue_into(&self, dequeue: u64, out: &mut [u8]) -> (u64, usize) {
        let state = lock(&self.state);
        let start = self.oldest(state.enqueue, dequeue);
        let count = self.available(state.enqueue, dequeue).min(out.len());
        for (i, byte) in out[..count].iter_mut().enumerate() {
            let slot = ((start + i as u64) % self.capacity as u64) as usize;
            *byte = state.buffer[slot];
        }
        (start + count as u64, count)
    }

    /// Suspends until at least `min` bytes are readable past `dequeue`
    ///
    /// The reader re-checks every `poll` interval as well as on every
    /// enqueue. Returns false if `timeout` expires first.
    pub fn wait_for_bytes(
        &self,
        dequeue: u64,
        min: usize,
        poll: Duration,
        timeout: Option<Duration>,
    ) -> bool {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let min = min.min(self.capacity);
        let mut state = lock(&self.state);
        loop {
            if self.available(state.enqueue, dequeue) >= min {
                return true;
            }
            let mut interval = poll;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                interval = interval.min(deadline - now);
            }
            let (guard, _) = self
                .readable
                .wait_timeout(state, interval)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }
}

/// `log::Log` implementation that formats records into a [`LogRing`]
#[derive(Debug)]
pub struct RingLogger {
    ring: Arc<LogRing>,
    level: LevelFilter,
}

impl RingLogger {
    pub fn new(ring: Arc<LogRing>, level: LevelFilter) -> Self {
        Self { ring, level }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

impl Log for RingLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            let line = format!("{} {}: {}\n", record.level(), record.target(), record.args());
            self.ring.enqueue(line.as_bytes());
        }
    }

    fn flush(&self) {}
}
