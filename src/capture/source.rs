//! Frame source abstraction and a camera-free test pattern source

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::frame::{Frame, PixelFormat};
use crate::error::{CameraError, CaptureError};
use crate::CaptureConfig;

/// A device producing raw frames on demand.
///
/// Opening happens in the concrete constructor; the pipeline then calls
/// `configure` once, `read_frame` from the acquisition thread, and `close`
/// when that thread exits.
pub trait FrameSource: Send {
    /// Apply size, rate and driver buffer depth.
    fn configure(&mut self, config: &CaptureConfig) -> Result<(), CameraError>;

    /// Block until the next frame is available or the device fails.
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Release the device. Must be idempotent.
    fn close(&mut self);

    fn describe(&self) -> String {
        "frame source".to_string()
    }
}

/// Opens (but does not configure) a frame source for a pipeline run.
pub type SourceFactory =
    Box<dyn FnMut(&CaptureConfig) -> Result<Box<dyn FrameSource>, CameraError> + Send>;

/// Moving vertical bar over a dark gradient, paced at the configured fps.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    interval: Option<Duration>,
    limit: Option<u64>,
    sequence: u64,
    next_due: Option<Instant>,
    open: bool,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            width: 640,
            height: 480,
            interval: None,
            limit: None,
            sequence: 0,
            next_due: None,
            open: true,
        }
    }

    /// Report end of stream after `frames` frames.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    fn render(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let bar_width = (w / 16).max(1);
        let bar_start = (self.sequence as usize * 4) % w.max(1);
        let mut data = vec![0u8; w * h * 3];

        for (y, row) in data.chunks_exact_mut(w * 3).enumerate() {
            let shade = (y * 96 / h.max(1)) as u8;
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                let in_bar = (x + w - bar_start) % w < bar_width;
                if in_bar {
                    px.copy_from_slice(&[240, 200, 40]);
                } else {
                    px.copy_from_slice(&[shade, shade, shade.saturating_add(32)]);
                }
            }
        }
        data
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for SyntheticSource {
    fn configure(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        if config.width == 0 || config.height == 0 {
            return Err(CameraError::Configure(format!(
                "invalid size {}x{}",
                config.width, config.height
            )));
        }
        self.width = config.width;
        self.height = config.height;
        self.interval = (config.fps > 0).then(|| Duration::from_secs(1) / config.fps);
        info!(
            width = self.width,
            height = self.height,
            fps = config.fps,
            "Synthetic source configured"
        );
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotStreaming);
        }
        if self.limit.is_some_and(|limit| self.sequence >= limit) {
            return Err(CaptureError::EndOfStream);
        }

        if let Some(interval) = self.interval {
            let due = self.next_due.unwrap_or_else(Instant::now);
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
            // don't try to catch up after a stall
            self.next_due = Some(due.max(now) + interval);
        }

        self.sequence += 1;
        Ok(Frame::new(
            self.render(),
            self.width,
            self.height,
            PixelFormat::Rgb24,
            self.sequence,
        ))
    }

    fn close(&mut self) {
        if self.open {
            debug!(frames = self.sequence, "Synthetic source closed");
        }
        self.open = false;
    }

    fn describe(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }
}
