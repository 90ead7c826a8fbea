//! V4L2 camera source with memory-mapped buffers

use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::{info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::decoder;
use super::frame::{CaptureFormat, Frame};
use super::source::FrameSource;
use crate::error::{CameraError, CaptureError};
use crate::CaptureConfig;

const MIN_STALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Camera opened through V4L2
pub struct V4l2Source {
    index: u32,
    device: Box<Device>,
    stream: Option<MmapStream<'static>>,
    format: CaptureFormat,
    width: u32,
    height: u32,
    sequence: u64,
    stall_timeout: Duration,
}

impl V4l2Source {
    /// Open `/dev/video{index}` and check it can capture.
    pub fn open(index: u32) -> Result<Self, CameraError> {
        let device =
            Device::new(index as usize).map_err(|source| CameraError::Open { index, source })?;

        let caps = device
            .query_caps()
            .map_err(|source| CameraError::Open { index, source })?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CameraError::NotCapture { index });
        }

        Ok(Self {
            index,
            device: Box::new(device),
            stream: None,
            format: CaptureFormat::Mjpeg,
            width: 0,
            height: 0,
            sequence: 0,
            stall_timeout: MIN_STALL_TIMEOUT,
        })
    }

    /// Open the configured device, probing for one when no index is set.
    pub fn open_configured(config: &CaptureConfig) -> Result<Self, CameraError> {
        let index = match config.device_index {
            Some(index) => index,
            None => find_capture_device().ok_or(CameraError::NotFound)?,
        };
        Self::open(index)
    }
}

impl FrameSource for V4l2Source {
    fn configure(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        let configure_err = |e: std::io::Error| CameraError::Configure(e.to_string());

        let mut fmt = self.device.format().map_err(configure_err)?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = match config.format {
            CaptureFormat::Mjpeg => FourCC::new(b"MJPG"),
            CaptureFormat::Yuyv => FourCC::new(b"YUYV"),
        };
        // The driver may pick the nearest supported mode
        let actual = self.device.set_format(&fmt).map_err(configure_err)?;
        if actual.fourcc != fmt.fourcc {
            return Err(CameraError::Configure(format!(
                "device refused {} capture",
                config.format.name()
            )));
        }

        if config.fps > 0 {
            if let Err(e) = self.device.set_params(&Parameters::with_fps(config.fps)) {
                warn!("Device ignored frame rate request: {}", e);
            }
        }

        // Small driver queue keeps reads close to real time
        let depth = config.buffer_depth.max(1);
        let mut stream = MmapStream::with_buffers(&self.device, Type::VideoCapture, depth)
            .map_err(configure_err)?;
        self.stall_timeout = stall_timeout(config.fps);
        stream.set_timeout(self.stall_timeout);

        self.stream = Some(stream);
        self.format = config.format;
        self.width = actual.width;
        self.height = actual.height;
        info!(
            "Capture stream started on /dev/video{}: {}x{} {} with {} buffers",
            self.index,
            actual.width,
            actual.height,
            config.format.name(),
            depth
        );
        Ok(())
    }

    #[instrument(skip(self), fields(device = self.index))]
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let stall_timeout = self.stall_timeout;
        let stream = self.stream.as_mut().ok_or(CaptureError::NotStreaming)?;
        let (buf, meta) = stream.next().map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut => CaptureError::Stalled(stall_timeout),
            _ => CaptureError::Disconnected(e),
        })?;

        let decoded = decoder::decode_frame(buf, self.format, self.width, self.height)?;
        self.sequence += 1;

        let device_ts = Duration::from_secs(meta.timestamp.sec as u64)
            + Duration::from_micros(meta.timestamp.usec as u64);

        Ok(Frame::new(
            decoded.pixels,
            decoded.width,
            decoded.height,
            decoded.format,
            self.sequence,
        )
        .with_device_timestamp(device_ts))
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("Released /dev/video{} after {} frames", self.index, self.sequence);
        }
    }

    fn describe(&self) -> String {
        format!("/dev/video{}", self.index)
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        self.close();
    }
}

/// Longest a read may wait for the driver: a few frame intervals, at least 1 s.
fn stall_timeout(fps: u32) -> Duration {
    match fps {
        0 => MIN_STALL_TIMEOUT,
        fps => (Duration::from_secs(4) / fps).max(MIN_STALL_TIMEOUT),
    }
}

/// First `/dev/video*` node that advertises capture and a format we decode.
pub fn find_capture_device() -> Option<u32> {
    info!("Auto-detecting capture devices...");

    for index in 0..10u32 {
        let path = format!("/dev/video{}", index);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::new(index as usize) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            continue;
        }

        if let Ok(formats) = dev.enum_formats() {
            let decodable = [FourCC::new(b"MJPG"), FourCC::new(b"YUYV")];
            let supported = formats.iter().any(|fmt| decodable.contains(&fmt.fourcc));
            if supported {
                info!("Found capture device: {} - {}", path, caps.card);
                return Some(index);
            }
        }
    }

    None
}
