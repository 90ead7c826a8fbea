//! Headless presenter that reports through tracing

use tracing::{error, info};

use super::Presenter;
use crate::capture::Frame;
use crate::detect::Detection;
use crate::pipeline::PipelineStatus;

/// Logs a one-line summary every `every` rendered frames.
pub struct LogPresenter {
    every: u64,
    rendered: u64,
}

impl LogPresenter {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            rendered: 0,
        }
    }

    pub fn rendered(&self) -> u64 {
        self.rendered
    }
}

impl Presenter for LogPresenter {
    fn render(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        average_fps: f64,
        efficiency_percent: f64,
    ) {
        self.rendered += 1;
        if self.rendered % self.every != 0 {
            return;
        }

        let labels: Vec<&str> = detections.iter().map(|d| d.label.as_str()).collect();
        info!(
            seq = frame.sequence(),
            objects = detections.len(),
            "FPS: {:.1} | Efficiency: {:.1}% | {:?}",
            average_fps,
            efficiency_percent,
            labels
        );
    }

    fn status(&mut self, status: &PipelineStatus) {
        match status {
            PipelineStatus::Faulted(fault) => error!("Pipeline stopped: {}", fault),
            other => info!("Pipeline {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;

    #[test]
    fn counts_every_rendered_frame() {
        let mut presenter = LogPresenter::new(0);
        let frame = Frame::new(vec![0u8; 3], 1, 1, PixelFormat::Rgb24, 1);
        for _ in 0..3 {
            presenter.render(&frame, &[], 10.0, 100.0);
        }
        assert_eq!(presenter.rendered(), 3);
    }
}
