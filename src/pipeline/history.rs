use std::sync::{Arc, Mutex, MutexGuard};

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

use crate::detect::DetectionResult;

/// Most recent detection results, oldest overwritten first.
pub struct DetectionHistory {
    ring: Mutex<HeapRb<Arc<DetectionResult>>>,
}

impl DetectionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(HeapRb::new(capacity.max(1))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HeapRb<Arc<DetectionResult>>> {
        self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, result: Arc<DetectionResult>) {
        self.lock().push_overwrite(result);
    }

    /// Newest entry, for on-demand capture.
    pub fn latest(&self) -> Option<Arc<DetectionResult>> {
        self.lock().iter().last().cloned()
    }

    /// Entries in arrival order, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<DetectionResult>> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        let mut ring = self.lock();
        while ring.try_pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Frame, PixelFormat};
    use std::time::{Duration, Instant};

    fn result(sequence: u64) -> Arc<DetectionResult> {
        Arc::new(DetectionResult {
            sequence,
            timestamp: Instant::now(),
            frame: Frame::new(vec![0u8; 3], 1, 1, PixelFormat::Rgb24, sequence),
            detections: Vec::new(),
            inference_time: Duration::ZERO,
        })
    }

    #[test]
    fn keeps_last_ten_in_arrival_order() {
        let history = DetectionHistory::new(10);
        for seq in 1..=15 {
            history.push(result(seq));
        }

        assert_eq!(history.len(), 10);
        let seqs: Vec<u64> = history.snapshot().iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, (6..=15).collect::<Vec<_>>());
        assert_eq!(history.latest().map(|r| r.sequence), Some(15));
    }

    #[test]
    fn empty_history_has_no_latest() {
        let history = DetectionHistory::new(10);
        assert!(history.latest().is_none());
        assert!(history.is_empty());
    }

    #[test]
    fn clear_resets_to_empty() {
        let history = DetectionHistory::new(3);
        history.push(result(1));
        history.push(result(2));
        history.clear();
        assert!(history.is_empty());
        history.push(result(3));
        assert_eq!(history.latest().map(|r| r.sequence), Some(3));
    }
}
