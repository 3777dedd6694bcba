// Bounded drop-oldest queue between the receiver and the control loop
//
// The only state shared across execution contexts. Every operation takes the
// lock once and is O(1); a push into a full queue evicts the oldest entry
// instead of waiting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::messages::Intent;

/// A decoded intent tagged with its arrival order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedIntent {
    pub seq: u64,
    pub intent: Intent,
}

pub struct CommandQueue {
    inner: Mutex<Inner>,
    capacity: usize,
    evicted: AtomicU64,
}

struct Inner {
    entries: VecDeque<QueuedIntent>,
    next_seq: u64,
}

impl CommandQueue {
    /// A capacity of zero is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                next_seq: 0,
            }),
            capacity,
            evicted: AtomicU64::new(0),
        }
    }

    /// Enqueue an intent. Returns the entry evicted to make room, if any.
    pub fn push(&self, intent: Intent) -> Option<QueuedIntent> {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let evicted = if inner.entries.len() >= self.capacity {
            inner.entries.pop_front()
        } else {
            None
        };
        inner.entries.push_back(QueuedIntent { seq, intent });
        drop(inner);

        if let Some(old) = &evicted {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            debug!("Queue full, dropped intent #{}", old.seq);
        }
        evicted
    }

    /// Dequeue the oldest intent, if any
    pub fn pop(&self) -> Option<QueuedIntent> {
        self.lock().entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total entries dropped by overflow since creation
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    // A panic while holding the lock cannot leave the deque half-updated,
    // so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn left(v: f64) -> Intent {
        Intent::tank(v, 0.0)
    }

    #[test]
    fn test_fifo_order() {
        let q = CommandQueue::new(3);
        q.push(left(0.1));
        q.push(left(0.2));
        assert_eq!(q.pop().unwrap().intent, left(0.1));
        assert_eq!(q.pop().unwrap().intent, left(0.2));
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_full_queue_keeps_most_recent_entries() {
        let q = CommandQueue::new(3);
        for i in 0..5 {
            q.push(left(i as f64 / 10.0));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.evicted(), 2);

        let seqs: Vec<u64> = std::iter::from_fn(|| q.pop()).map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
    }

    #[test]
    fn test_push_reports_evicted_entry() {
        let q = CommandQueue::new(1);
        assert!(q.push(left(0.1)).is_none());
        let old = q.push(left(0.2)).unwrap();
        assert_eq!(old.seq, 0);
        assert_eq!(old.intent, left(0.1));
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let q = CommandQueue::new(0);
        assert_eq!(q.capacity(), 1);
        q.push(left(0.5));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_concurrent_producer_and_consumer() {
        let q = Arc::new(CommandQueue::new(4));
        let producer = {
            let q = q.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    q.push(left(0.5));
                }
            })
        };

        let mut popped = 0u64;
        let mut last_seq = None;
        while !producer.is_finished() || !q.is_empty() {
            if let Some(entry) = q.pop() {
                // Arrival order survives eviction
                if let Some(prev) = last_seq {
                    assert!(entry.seq > prev);
                }
                last_seq = Some(entry.seq);
                popped += 1;
            }
        }
        producer.join().unwrap();
        assert_eq!(popped + q.evicted(), 1000);
    }
}
