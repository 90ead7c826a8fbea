//! Hand-off from the presentation worker to whatever context owns the screen
//!
//! The worker never touches presentation resources. It pushes
//! [`PresentedFrame`]s into a small bounded channel (dropping when the owner
//! lags) and status changes into an unbounded one; the owning context drains
//! both at its own cadence through [`PresentationPump`].

pub mod logger;
#[cfg(feature = "sdl-display")]
pub mod sdl;

use std::sync::Arc;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::capture::Frame;
use crate::detect::{Detection, DetectionResult};
use crate::pipeline::PipelineStatus;

pub use logger::LogPresenter;
#[cfg(feature = "sdl-display")]
pub use sdl::Sdl2Presenter;

/// Presentation capability. Only ever called from the pumping context.
pub trait Presenter {
    fn render(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        average_fps: f64,
        efficiency_percent: f64,
    );

    fn status(&mut self, _status: &PipelineStatus) {}
}

/// One result ready for display, with the metrics current at dispatch time
#[derive(Debug, Clone)]
pub struct PresentedFrame {
    pub result: Arc<DetectionResult>,
    pub average_fps: f64,
    pub efficiency_percent: f64,
}

/// Worker side of the hand-off. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    frames: Sender<PresentedFrame>,
    status: Sender<PipelineStatus>,
}

/// Owner side of the hand-off.
pub struct PresentationPump {
    frames: Receiver<PresentedFrame>,
    status: Receiver<PipelineStatus>,
}

pub fn dispatch_channel(capacity: usize) -> (Dispatcher, PresentationPump) {
    let (frame_tx, frame_rx) = flume::bounded(capacity.max(1));
    let (status_tx, status_rx) = flume::unbounded();
    (
        Dispatcher {
            frames: frame_tx,
            status: status_tx,
        },
        PresentationPump {
            frames: frame_rx,
            status: status_rx,
        },
    )
}

impl Dispatcher {
    /// Fire-and-forget. Returns false when the owner is lagging or gone.
    pub fn send_frame(&self, frame: PresentedFrame) -> bool {
        match self.frames.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                metrics::counter!("argus_frames_dropped_total", "queue" => "presentation")
                    .increment(1);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn send_status(&self, status: PipelineStatus) {
        // a missing owner is not the worker's problem
        let _ = self.status.send(status);
    }
}

impl PresentationPump {
    /// Wait up to `timeout` for a frame, then render everything pending.
    ///
    /// Status changes are delivered before and after the frames. Returns the
    /// number of messages handled.
    pub fn pump(&self, presenter: &mut dyn Presenter, timeout: Duration) -> usize {
        let mut handled = self.drain_status(presenter);

        match self.frames.recv_timeout(timeout) {
            Ok(first) => {
                render(presenter, &first);
                handled += 1;
                for next in self.frames.try_iter() {
                    render(presenter, &next);
                    handled += 1;
                }
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
        }

        handled + self.drain_status(presenter)
    }

    /// Render whatever is pending without waiting.
    pub fn try_pump(&self, presenter: &mut dyn Presenter) -> usize {
        let mut handled = self.drain_status(presenter);
        for next in self.frames.try_iter() {
            render(presenter, &next);
            handled += 1;
        }
        handled
    }

    fn drain_status(&self, presenter: &mut dyn Presenter) -> usize {
        let mut handled = 0;
        for status in self.status.try_iter() {
            presenter.status(&status);
            handled += 1;
        }
        handled
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }
}

fn render(presenter: &mut dyn Presenter, frame: &PresentedFrame) {
    presenter.render(
        &frame.result.frame,
        &frame.result.detections,
        frame.average_fps,
        frame.efficiency_percent,
    );
}
