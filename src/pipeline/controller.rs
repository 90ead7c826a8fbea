//! Start/stop lifecycle and the live control surface

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use tracing::{debug, error, info, warn};

use super::config::{ConfigUpdate, PipelineConfig};
use super::detection::SharedDetector;
use super::metrics::MetricsSnapshot;
use super::queue::QueueStats;
use super::{acquisition, detection, presentation};
use super::{PipelineFault, PipelineState, PipelineStatus, Shared};
use crate::capture::{FrameSource, SourceFactory};
use crate::detect::{DetectionResult, Detector};
use crate::display::Dispatcher;
use crate::error::PipelineError;
use crate::{CaptureConfig, Config};

/// Occupancy and drop counters of both inter-unit queues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineQueues {
    pub frames: QueueStats,
    pub results: QueueStats,
}

#[derive(Default)]
struct Workers {
    acquisition: Option<JoinHandle<()>>,
    /// Disconnects when the acquisition thread exits
    acquisition_done: Option<Receiver<()>>,
    detection: Option<JoinHandle<()>>,
    presentation: Option<JoinHandle<()>>,
}

impl Workers {
    /// Join every unit. Acquisition may sit in a device read, so it gets at
    /// most `timeout` before being detached.
    fn join(mut self, timeout: Duration) {
        if let Some(done) = self.acquisition_done.take() {
            if let Err(RecvTimeoutError::Timeout) = done.recv_timeout(timeout) {
                warn!(?timeout, "Acquisition thread stuck in a device read; detaching");
                self.acquisition = None;
            }
        }

        for (unit, handle) in [
            ("acquisition", self.acquisition),
            ("detection", self.detection),
            ("presentation", self.presentation),
        ] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    error!("{} thread panicked", unit);
                }
            }
        }
    }
}

/// Owns the three pipeline units.
///
/// All methods take `&self`; control calls may come from any thread. Dropping
/// the controller stops the pipeline.
pub struct PipelineController {
    shared: Arc<Shared>,
    capture: CaptureConfig,
    detection_core: Option<usize>,
    stop_timeout: Duration,
    open_source: Mutex<SourceFactory>,
    detector: SharedDetector,
    workers: Mutex<Option<Workers>>,
}

impl PipelineController {
    pub fn new(
        config: &Config,
        open_source: SourceFactory,
        detector: Box<dyn Detector>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(&config.pipeline, dispatcher)),
            capture: config.capture.clone(),
            detection_core: config.pipeline.detection_core,
            stop_timeout: Duration::from_millis(config.pipeline.stop_timeout_ms),
            open_source: Mutex::new(open_source),
            detector: Arc::new(Mutex::new(detector)),
            workers: Mutex::new(None),
        }
    }

    fn workers(&self) -> MutexGuard<'_, Option<Workers>> {
        self.workers.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Open the device and launch all units. No-op when already running.
    ///
    /// On error nothing is left running and the state stays `Stopped`.
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut workers = self.workers();
        if self.shared.is_running() {
            debug!("Pipeline already running");
            return Ok(());
        }

        // units that wound down after a fault
        if let Some(stale) = workers.take() {
            stale.join(self.stop_timeout);
        }

        let mut source = {
            let mut open = self.open_source.lock().unwrap_or_else(|p| p.into_inner());
            (*open)(&self.capture)?
        };
        if let Err(err) = source.configure(&self.capture) {
            source.close();
            return Err(err.into());
        }

        if let Err(err) = self
            .detector
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .warm_up()
        {
            source.close();
            return Err(err.into());
        }

        self.shared.reset();
        self.shared.set_running(true);

        let mut spawned = Workers::default();
        let result = self.spawn_units(&mut spawned, source);
        if let Err(err) = result {
            error!("Failed to start pipeline: {}", err);
            self.shared.set_running(false);
            spawned.join(self.stop_timeout);
            return Err(err);
        }
        *workers = Some(spawned);

        self.shared.dispatcher.send_status(PipelineStatus::Running);
        info!(
            device = ?self.capture.device_index,
            width = self.capture.width,
            height = self.capture.height,
            fps = self.capture.fps,
            "Pipeline started"
        );
        Ok(())
    }

    /// Consumers first, so the first frames read have somewhere to go.
    fn spawn_units(
        &self,
        workers: &mut Workers,
        source: Box<dyn FrameSource>,
    ) -> Result<(), PipelineError> {
        let shared = self.shared.clone();
        workers.presentation = Some(spawn("presentation", move || presentation::run(shared))?);

        let shared = self.shared.clone();
        let detector = self.detector.clone();
        let core = self.detection_core;
        workers.detection = Some(spawn("detection", move || {
            detection::run(shared, detector, core)
        })?);

        let shared = self.shared.clone();
        let run_id = self.shared.current_run();
        let (done, acquisition_done) = channel::bounded::<()>(0);
        workers.acquisition = Some(spawn("acquisition", move || {
            let _done = done;
            acquisition::run(shared, source, run_id)
        })?);
        workers.acquisition_done = Some(acquisition_done);
        Ok(())
    }

    /// Stop all units, release the device and drain both queues.
    ///
    /// Idempotent and safe to call before `start`. Returns once every unit
    /// has exited, or once `stop_timeout_ms` has passed for an acquisition
    /// thread blocked in the device. A detached reader releases the device
    /// when its read returns and never touches a later run.
    pub fn stop(&self) {
        let mut workers = self.workers();
        let was_running = self.shared.set_running(false);
        let Some(units) = workers.take() else {
            return;
        };
        units.join(self.stop_timeout);

        let discarded = self.shared.frames.drain_all() + self.shared.results.drain_all();
        if was_running {
            self.shared.dispatcher.send_status(PipelineStatus::Stopped);
        }
        info!(discarded, "Pipeline stopped");
    }

    pub fn state(&self) -> PipelineState {
        if self.shared.is_running() {
            PipelineState::Running
        } else {
            PipelineState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Apply new parameters from the next detection cycle on.
    pub fn update_config(&self, update: ConfigUpdate) {
        self.shared.config.apply(update);
    }

    pub fn set_confidence(&self, v: f32) {
        self.shared.config.set_confidence(v);
    }

    pub fn set_iou(&self, v: f32) {
        self.shared.config.set_iou(v);
    }

    pub fn set_max_detections(&self, n: usize) {
        self.shared.config.set_max_detections(n);
    }

    pub fn set_flip(&self, enabled: bool) {
        self.shared.config.set_flip(enabled);
    }

    pub fn set_frame_skip(&self, n: usize) {
        self.shared.config.set_frame_skip(n);
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    /// Most recent result still held by the history, if any.
    pub fn snapshot_latest(&self) -> Option<Arc<DetectionResult>> {
        self.shared.history.latest()
    }

    /// Oldest to newest.
    pub fn history(&self) -> Vec<Arc<DetectionResult>> {
        self.shared.history.snapshot()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Fault that ended the last run. Cleared by the next successful `start`.
    pub fn last_fault(&self) -> Option<Arc<PipelineFault>> {
        self.shared.last_fault()
    }

    pub fn queue_stats(&self) -> PipelineQueues {
        PipelineQueues {
            frames: self.shared.frames.stats(),
            results: self.shared.results.stats(),
        }
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn<F>(unit: &'static str, f: F) -> Result<JoinHandle<()>, PipelineError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(format!("argus-{unit}"))
        .spawn(f)
        .map_err(|source| PipelineError::Spawn { unit, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticSource;
    use crate::detect::NullDetector;
    use crate::display::dispatch_channel;
    use crate::error::CameraError;

    fn controller(frames: Option<u64>) -> (PipelineController, crate::display::PresentationPump) {
        let (dispatcher, pump) = dispatch_channel(4);
        let mut config = Config::default();
        config.capture.width = 8;
        config.capture.height = 4;
        config.capture.fps = 200;
        let factory: SourceFactory = Box::new(move |_| {
            let source = match frames {
                Some(n) => SyntheticSource::new().with_limit(n),
                None => SyntheticSource::new(),
            };
            Ok(Box::new(source) as Box<dyn FrameSource>)
        });
        (
            PipelineController::new(&config, factory, Box::new(NullDetector), dispatcher),
            pump,
        )
    }

    #[test]
    fn stop_is_idempotent_and_safe_before_start() {
        let (controller, _pump) = controller(None);
        controller.stop();
        controller.stop();
        assert_eq!(controller.state(), PipelineState::Stopped);
    }

    #[test]
    fn start_twice_keeps_a_single_run() {
        let (controller, _pump) = controller(None);
        controller.start().unwrap();
        controller.start().unwrap();
        assert_eq!(controller.state(), PipelineState::Running);
        controller.stop();
        assert_eq!(controller.state(), PipelineState::Stopped);
        assert_eq!(controller.queue_stats().frames.len, 0);
        assert_eq!(controller.queue_stats().results.len, 0);
    }

    #[test]
    fn open_failure_leaves_pipeline_stopped() {
        let (dispatcher, _pump) = dispatch_channel(1);
        let factory: SourceFactory = Box::new(|_| Err(CameraError::NotFound));
        let controller = PipelineController::new(
            &Config::default(),
            factory,
            Box::new(NullDetector),
            dispatcher,
        );

        assert!(matches!(
            controller.start(),
            Err(PipelineError::Camera(CameraError::NotFound))
        ));
        assert_eq!(controller.state(), PipelineState::Stopped);
    }

    #[test]
    fn restart_after_end_of_stream_resets_counters() {
        let (controller, _pump) = controller(Some(5));
        controller.start().unwrap();
        while controller.is_running() {
            thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(controller.metrics().total_frames_seen, 5);
        assert!(controller.last_fault().is_some());

        controller.start().unwrap();
        while controller.is_running() {
            thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(controller.metrics().total_frames_seen, 5);
        controller.stop();
    }
}
