//! Bounded drop-newest queue between pipeline stages

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use crossbeam::utils::CachePadded;

/// Fixed-capacity FIFO shared by one producer and one consumer.
///
/// When full, `try_push` discards the incoming item and leaves queued items
/// untouched, so a saturated consumer never sees frames out of order.
pub struct BoundedQueue<T> {
    name: &'static str,
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    pushed: AtomicUsize,
    popped: AtomicUsize,
    dropped: AtomicUsize,
}

/// Counters reported by [`BoundedQueue::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pushed: usize,
    pub popped: usize,
    pub dropped: usize,
    pub len: usize,
}

impl<T> BoundedQueue<T> {
    /// `capacity` must be at least 1.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = channel::bounded(capacity);
        Self {
            name,
            tx,
            rx,
            capacity,
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Producer: enqueue without blocking. Returns false (and drops `item`) when full.
    pub fn try_push(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => {
                self.stats.pushed.fetch_add(1, Ordering::Relaxed);
                true
            }
            // both ends live in self, so Disconnected cannot happen
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("argus_frames_dropped_total", "queue" => self.name).increment(1);
                false
            }
        }
    }

    /// Consumer: dequeue without blocking.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.rx.try_recv().ok()?;
        self.stats.popped.fetch_add(1, Ordering::Relaxed);
        Some(item)
    }

    /// Consumer: wait up to `timeout` for an item.
    pub fn pop_blocking(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => {
                self.stats.popped.fetch_add(1, Ordering::Relaxed);
                Some(item)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Discard everything currently queued, releasing the held buffers.
    pub fn drain_all(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pushed: self.stats.pushed.load(Ordering::Relaxed),
            popped: self.stats.popped.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            len: self.len(),
        }
    }

    pub(crate) fn reset_stats(&self) {
        self.stats.pushed.store(0, Ordering::Relaxed);
        self.stats.popped.store(0, Ordering::Relaxed);
        self.stats.dropped.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn full_queue_drops_newest() {
        let q = BoundedQueue::new("test", 3);
        assert!(q.try_push(1));
        assert!(q.try_push(2));
        assert!(q.try_push(3));
        assert!(!q.try_push(4));
        assert!(!q.try_push(5));

        assert_eq!(q.len(), 3);
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), None);

        let stats = q.stats();
        assert_eq!((stats.pushed, stats.popped, stats.dropped), (3, 3, 2));
    }

    #[test]
    fn pop_blocking_times_out_when_empty() {
        let q: BoundedQueue<u8> = BoundedQueue::new("test", 1);
        let start = Instant::now();
        assert_eq!(q.pop_blocking(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn pop_blocking_wakes_on_push_from_other_thread() {
        let q = Arc::new(BoundedQueue::new("test", 2));
        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                q.try_push(42u32)
            })
        };
        assert_eq!(q.pop_blocking(Duration::from_secs(2)), Some(42));
        assert!(producer.join().unwrap());
    }

    #[test]
    fn drain_all_empties_queue() {
        let q = BoundedQueue::new("test", 3);
        q.try_push("a");
        q.try_push("b");
        assert_eq!(q.drain_all(), 2);
        assert!(q.is_empty());
        assert!(q.try_push("c"));
    }

    #[test]
    fn zero_capacity_is_promoted_to_one() {
        let q = BoundedQueue::new("test", 0);
        assert_eq!(q.capacity(), 1);
        assert!(q.try_push(()));
        assert!(!q.try_push(()));
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity_and_keeps_oldest(
            capacity in 1usize..8,
            ops in prop::collection::vec(any::<bool>(), 0..64),
        ) {
            let q = BoundedQueue::new("prop", capacity);
            let mut model = std::collections::VecDeque::new();
            let mut next = 0u32;

            // true = push, false = pop
            for push in ops {
                if push {
                    let accepted = q.try_push(next);
                    prop_assert_eq!(accepted, model.len() < capacity);
                    if accepted {
                        model.push_back(next);
                    }
                    next += 1;
                } else {
                    prop_assert_eq!(q.try_pop(), model.pop_front());
                }
                prop_assert!(q.len() <= capacity);
            }
        }
    }
}
