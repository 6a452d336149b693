//! Rolling end-to-end latency over the most recent deliveries.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
struct Ring {
    samples: Vec<i64>,
    index: usize,
    full: bool,
}

/// Fixed-size ring of delivery latencies plus the last reported failure count.
///
/// The average is only meaningful once a full window has been recorded, so a short
/// warm-up burst cannot skew it.
#[derive(Debug)]
pub struct LatencyTracker {
    ring: Mutex<Ring>,
    last_errors: AtomicI64,
}

impl LatencyTracker {
    /// Create a tracker averaging over `window` samples (minimum 1).
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            ring: Mutex::new(Ring { samples: vec![0; window], index: 0, full: false }),
            last_errors: AtomicI64::new(0),
        }
    }

    pub fn window(&self) -> usize {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner).samples.len()
    }

    /// Record a delivery captured at `captured_at` and sent at `now` (both epoch ns).
    pub fn record_sent(&self, captured_at: i64, now: i64) {
        let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = ring.index;
        ring.samples[slot] = now.saturating_sub(captured_at);
        ring.index += 1;
        if ring.index >= ring.samples.len() {
            ring.index = 0;
            ring.full = true;
        }
    }

    /// Remember the most recent failure count reported by the session.
    ///
    /// Overwrites rather than accumulates: a later, smaller report replaces an earlier one.
    pub fn record_failed(&self, count: i64) {
        self.last_errors.store(count, Ordering::Relaxed);
    }

    pub fn last_errors(&self) -> i64 {
        self.last_errors.load(Ordering::Relaxed)
    }

    pub fn is_full(&self) -> bool {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner).full
    }

    /// Mean latency in whole milliseconds over positive samples, once the window is full.
    pub fn average_ms(&self) -> Option<u64> {
        let ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        if !ring.full {
            return None;
        }
        let (total, count) = ring
            .samples
            .iter()
            .filter(|&&v| v > 0)
            .fold((0u128, 0u128), |(t, c), &v| (t + v as u128, c + 1));
        if count == 0 {
            return Some(0);
        }
        Some(u64::try_from(total / count / 1_000_000).unwrap_or(u64::MAX))
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(crate::config::LATENCY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: i64 = 1_000_000;

    #[test]
    fn no_average_until_window_full() {
        let t = LatencyTracker::new(10);
        for i in 0..9 {
            t.record_sent(0, (i + 1) * MS);
            assert_eq!(t.average_ms(), None);
        }
        t.record_sent(0, 10 * MS);
        assert!(t.is_full());
        // mean of 1..=10 ms
        assert_eq!(t.average_ms(), Some(5));
    }

    #[test]
    fn wraps_and_overwrites_oldest() {
        let t = LatencyTracker::new(2);
        t.record_sent(0, 10 * MS);
        t.record_sent(0, 20 * MS);
        assert_eq!(t.average_ms(), Some(15));
        t.record_sent(0, 40 * MS);
        // slots now hold 40ms and 20ms
        assert_eq!(t.average_ms(), Some(30));
    }

    #[test]
    fn non_positive_samples_are_ignored() {
        let t = LatencyTracker::new(3);
        t.record_sent(5 * MS, 5 * MS);
        t.record_sent(10 * MS, 4 * MS);
        t.record_sent(0, 9 * MS);
        assert_eq!(t.average_ms(), Some(9));
    }

    #[test]
    fn failure_count_overwrites() {
        let t = LatencyTracker::default();
        assert_eq!(t.window(), 10);
        t.record_failed(5);
        t.record_failed(2);
        assert_eq!(t.last_errors(), 2);
    }
}
