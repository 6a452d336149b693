//! Shared bounded priority queue between the bridge and the consuming session.
//!
//! The bridge only needs `put` and `len`; capacity is enforced by the producer, not the
//! queue, so a consumer can always drain what was admitted.

use crate::error::QueueError;
use crate::value::QueuedValue;
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Producer-side view of the shared queue.
pub trait ValueQueue: Send + Sync + 'static {
    /// Insert a value. Fails only once the consumer has closed the queue.
    fn put(&self, value: QueuedValue) -> Result<(), QueueError>;

    /// Number of values waiting to be consumed.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<Q: ValueQueue + ?Sized> ValueQueue for Arc<Q> {
    fn put(&self, value: QueuedValue) -> Result<(), QueueError> {
        (**self).put(value)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

#[derive(Debug)]
struct Entry {
    timestamp: i64,
    seq: u64,
    value: QueuedValue,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.timestamp.cmp(&other.timestamp).then(self.seq.cmp(&other.seq))
    }
}

#[derive(Debug, Default)]
struct Heap {
    entries: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

/// In-process priority queue ordered by delivery timestamp, then insertion order.
///
/// Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct PriorityQueue {
    heap: Arc<Mutex<Heap>>,
    closed: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn heap(&self) -> MutexGuard<'_, Heap> {
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove the value with the earliest timestamp, if any.
    pub fn pop(&self) -> Option<QueuedValue> {
        self.heap().entries.pop().map(|Reverse(e)| e.value)
    }

    /// Remove every pending value in priority order.
    pub fn drain(&self) -> Vec<QueuedValue> {
        let mut heap = self.heap();
        let mut out = Vec::with_capacity(heap.entries.len());
        while let Some(Reverse(e)) = heap.entries.pop() {
            out.push(e.value);
        }
        out
    }

    /// Wait for the next value. Returns `None` once closed and empty.
    pub async fn recv(&self) -> Option<QueuedValue> {
        loop {
            let notified = self.notify.notified();
            if let Some(v) = self.pop() {
                return Some(v);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Close the queue; subsequent `put` calls fail with [`QueueError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl ValueQueue for PriorityQueue {
    fn put(&self, value: QueuedValue) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        {
            let mut heap = self.heap();
            let seq = heap.next_seq;
            heap.next_seq += 1;
            heap.entries.push(Reverse(Entry { timestamp: value.timestamp, seq, value }));
        }
        self.notify.notify_one();
        Ok(())
    }

    fn len(&self) -> usize {
        self.heap().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{SubscriptionPath, TypedValue, ValueKind};
    use std::time::Duration;

    fn value(ts: i64, text: &str) -> QueuedValue {
        QueuedValue {
            prefix: SubscriptionPath::default(),
            path: None,
            timestamp: ts,
            kind: ValueKind::Event,
            value: TypedValue::String(text.into()),
        }
    }

    #[test]
    fn pops_in_timestamp_then_insertion_order() {
        let q = PriorityQueue::new();
        q.put(value(30, "c")).unwrap();
        q.put(value(10, "a1")).unwrap();
        q.put(value(10, "a2")).unwrap();
        q.put(value(20, "b")).unwrap();
        assert_eq!(q.len(), 4);

        let order: Vec<_> = q
            .drain()
            .into_iter()
            .map(|v| match v.value {
                TypedValue::String(s) => s,
                TypedValue::JsonIetf(_) => unreachable!(),
            })
            .collect();
        assert_eq!(order, ["a1", "a2", "b", "c"]);
        assert!(q.is_empty());
    }

    #[test]
    fn put_fails_after_close() {
        let q = PriorityQueue::new();
        q.put(value(1, "x")).unwrap();
        q.close();
        assert_eq!(q.put(value(2, "y")), Err(QueueError::Closed));
        // admitted values remain drainable
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn recv_wakes_on_put_and_ends_on_close() {
        let q = PriorityQueue::new();
        let consumer = q.clone();
        let handle = tokio::spawn(async move {
            let mut got = Vec::new();
            while let Some(v) = consumer.recv().await {
                got.push(v.timestamp);
            }
            got
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        q.put(value(7, "x")).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.close();

        let got = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(got, vec![7]);
    }
}
