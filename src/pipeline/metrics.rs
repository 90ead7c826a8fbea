//! Throughput and efficiency accounting

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crossbeam::utils::CachePadded;
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

/// Arrivals closer than this are treated as this far apart.
const MIN_ARRIVAL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub average_fps: f64,
    pub total_frames_seen: u64,
    pub processed_frames: u64,
    pub efficiency_percent: f64,
}

struct FpsWindow {
    samples: HeapRb<f64>,
    last_arrival: Option<Instant>,
}

/// Rolling FPS window plus seen/processed counters.
///
/// Counters are bumped from the acquisition and detection threads; the FPS
/// window is fed from the presentation thread, so it describes what is shown.
pub struct MetricsTracker {
    window: Mutex<FpsWindow>,
    frames_seen: CachePadded<AtomicU64>,
    frames_processed: CachePadded<AtomicU64>,
}

impl MetricsTracker {
    pub fn new(window: usize) -> Self {
        Self {
            window: Mutex::new(FpsWindow {
                samples: HeapRb::new(window.max(1)),
                last_arrival: None,
            }),
            frames_seen: CachePadded::new(AtomicU64::new(0)),
            frames_processed: CachePadded::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FpsWindow> {
        self.window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Feed one presented frame into the FPS window.
    ///
    /// The first arrival after a reset only seeds the clock.
    pub fn record_frame_arrival(&self, now: Instant) {
        let mut window = self.lock();
        if let Some(last) = window.last_arrival {
            let delta = now.saturating_duration_since(last).max(MIN_ARRIVAL_INTERVAL);
            window.samples.push_overwrite(1.0 / delta.as_secs_f64());
        }
        window.last_arrival = Some(now);
    }

    pub fn average_fps(&self) -> f64 {
        let window = self.lock();
        let n = window.samples.occupied_len();
        if n == 0 {
            return 0.0;
        }
        window.samples.iter().sum::<f64>() / n as f64
    }

    pub fn record_seen(&self) {
        self.frames_seen.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("argus_frames_seen_total").increment(1);
    }

    pub fn record_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("argus_frames_processed_total").increment(1);
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen.load(Ordering::Relaxed)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// processed / max(seen, 1) * 100, clamped to [0, 100].
    pub fn efficiency(&self) -> f64 {
        efficiency_percent(self.frames_processed(), self.frames_seen())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let processed_frames = self.frames_processed();
        let total_frames_seen = self.frames_seen();
        MetricsSnapshot {
            average_fps: self.average_fps(),
            total_frames_seen,
            processed_frames,
            efficiency_percent: efficiency_percent(processed_frames, total_frames_seen),
        }
    }

    pub fn reset(&self) {
        {
            let mut window = self.lock();
            while window.samples.try_pop().is_some() {}
            window.last_arrival = None;
        }
        self.frames_seen.store(0, Ordering::Relaxed);
        self.frames_processed.store(0, Ordering::Relaxed);
    }
}

fn efficiency_percent(processed: u64, seen: u64) -> f64 {
    (processed as f64 / seen.max(1) as f64 * 100.0).clamp(0.0, 100.0)
}
