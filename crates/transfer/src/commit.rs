//! Checkpointing of completed work.

use std::mem;
use std::time::{Duration, Instant};

pub const DEFAULT_COMMIT_THRESHOLD: usize = 1000;
pub const DEFAULT_COMMIT_INTERVAL: Duration = Duration::from_secs(900);

/// Completed work waiting to be written to the catalog.
///
/// The buffer is due for a flush once it holds `threshold` entries, or once
/// `interval` has passed since the last flush while it holds anything. An
/// interrupted run loses at most one buffer's worth of bookkeeping, which the
/// next run recovers by finding the objects already present.
#[derive(Debug)]
pub struct CommitBuffer<T> {
    pending: Vec<T>,
    threshold: usize,
    interval: Duration,
    last_flush: Instant,
}

impl<T> CommitBuffer<T> {
    /// A threshold of zero is treated as one.
    pub fn new(threshold: usize, interval: Duration) -> Self {
        let threshold = threshold.max(1);
        Self { pending: Vec::with_capacity(threshold.min(DEFAULT_COMMIT_THRESHOLD)), threshold, interval, last_flush: Instant::now() }
    }

    pub fn push(&mut self, item: T) {
        self.pending.push(item);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        !self.pending.is_empty()
            && (self.pending.len() >= self.threshold || now.saturating_duration_since(self.last_flush) >= self.interval)
    }

    /// Hand over everything pending and restart the interval.
    pub fn take(&mut self, now: Instant) -> Vec<T> {
        self.last_flush = now;
        mem::take(&mut self.pending)
    }
}

impl<T> Default for CommitBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_COMMIT_THRESHOLD, DEFAULT_COMMIT_INTERVAL)
    }
}
