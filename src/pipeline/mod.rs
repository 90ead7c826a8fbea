//! Acquisition -> detection -> presentation pipeline
//!
//! Three OS threads connected by two bounded drop-newest queues:
//!
//! ```text
//! FrameSource -> [acquisition] -> frames(K) -> [detection] -> results(K)
//!                                                   |            |
//!                                        DetectionHistory   [presentation] -> Dispatcher
//! ```
//!
//! No unit ever blocks on queue capacity. Each unit checks the shared run flag
//! at its natural suspension point (device read, bounded queue wait), so a stop
//! request is observed within one iteration. Device reads carry their own
//! timeout; `stop` detaches an acquisition thread still stuck past
//! `stop_timeout_ms`.

pub mod acquisition;
pub mod config;
pub mod controller;
pub mod detection;
pub mod history;
pub mod metrics;
pub mod presentation;
pub mod queue;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tracing::{error, warn};

use crate::capture::Frame;
use crate::detect::DetectionResult;
use crate::display::Dispatcher;
use crate::error::{CaptureError, DetectorError};
use crate::PipelineSettings;

pub use config::{ConfigUpdate, PipelineConfig};
pub use controller::{PipelineController, PipelineQueues};
pub use history::DetectionHistory;
pub use metrics::{MetricsSnapshot, MetricsTracker};
pub use queue::{BoundedQueue, QueueStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Running,
}

/// Fatal condition that ended a run
#[derive(Debug, Error)]
pub enum PipelineFault {
    #[error("acquisition stopped: {0}")]
    Capture(#[from] CaptureError),

    #[error("detection stopped: {0}")]
    Detector(#[from] DetectorError),
}

/// State-change events delivered to the presentation owner
#[derive(Debug, Clone)]
pub enum PipelineStatus {
    Running,
    Stopped,
    Faulted(Arc<PipelineFault>),
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStatus::Running => f.write_str("running"),
            PipelineStatus::Stopped => f.write_str("stopped"),
            PipelineStatus::Faulted(fault) => write!(f, "faulted: {fault}"),
        }
    }
}

/// Per-unit view of everything that crosses thread boundaries
pub(crate) struct Shared {
    running: AtomicBool,
    run_id: AtomicU64,
    pub(crate) frames: BoundedQueue<Frame>,
    pub(crate) results: BoundedQueue<Arc<DetectionResult>>,
    pub(crate) history: DetectionHistory,
    pub(crate) metrics: MetricsTracker,
    pub(crate) config: PipelineConfig,
    pub(crate) dispatcher: Dispatcher,
    fault: ArcSwapOption<PipelineFault>,
    pub(crate) presentation_wait: Duration,
    pub(crate) idle_wait: Duration,
}

impl Shared {
    pub(crate) fn new(settings: &PipelineSettings, dispatcher: Dispatcher) -> Self {
        Self {
            running: AtomicBool::new(false),
            run_id: AtomicU64::new(0),
            frames: BoundedQueue::new("frames", settings.queue_capacity),
            results: BoundedQueue::new("results", settings.queue_capacity),
            history: DetectionHistory::new(settings.history_capacity),
            metrics: MetricsTracker::new(settings.fps_window),
            config: PipelineConfig::new(settings),
            dispatcher,
            fault: ArcSwapOption::empty(),
            presentation_wait: Duration::from_millis(settings.presentation_wait_ms),
            idle_wait: Duration::from_millis(settings.idle_wait_ms),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::AcqRel)
    }

    pub(crate) fn current_run(&self) -> u64 {
        self.run_id.load(Ordering::Acquire)
    }

    /// Running, and still the run identified by `run_id`.
    ///
    /// A reader detached by a bounded `stop` may return long after a restart.
    pub(crate) fn is_live(&self, run_id: u64) -> bool {
        self.is_running() && self.current_run() == run_id
    }

    /// Record a fatal fault and ask every unit to wind down.
    ///
    /// The first fault of a run wins; later ones are only logged, so the
    /// single `Faulted` event always matches `last_fault`.
    pub(crate) fn fail(&self, fault: PipelineFault) {
        let fault = Arc::new(fault);
        let previous = self
            .fault
            .rcu(|current| current.clone().or_else(|| Some(fault.clone())));
        self.set_running(false);

        match previous {
            None => self.dispatcher.send_status(PipelineStatus::Faulted(fault)),
            Some(first) => warn!("Ignoring {} after {}", fault, first),
        }
    }

    pub(crate) fn last_fault(&self) -> Option<Arc<PipelineFault>> {
        self.fault.load_full()
    }

    /// Clear per-run state ahead of a start.
    pub(crate) fn reset(&self) {
        self.metrics.reset();
        self.history.clear();
        self.frames.drain_all();
        self.results.drain_all();
        self.frames.reset_stats();
        self.results.reset_stats();
        self.fault.store(None);
        self.run_id.fetch_add(1, Ordering::AcqRel);
    }
}

/// Stops the whole pipeline if a unit unwinds.
pub(crate) struct UnitGuard<'a> {
    pub(crate) unit: &'static str,
    pub(crate) shared: &'a Shared,
}

impl Drop for UnitGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("{} thread panicked; stopping pipeline", self.unit);
            self.shared.set_running(false);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::display::{dispatch_channel, PresentationPump};

    pub(crate) fn shared(settings: PipelineSettings) -> (Arc<Shared>, PresentationPump) {
        let (dispatcher, pump) = dispatch_channel(settings.dispatch_capacity);
        (Arc::new(Shared::new(&settings, dispatcher)), pump)
    }
}
