//! Error taxonomy for the capture -> detection -> presentation pipeline

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Device open/configure failure. Fatal to `start()`; the pipeline stays stopped.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("failed to open camera device {index}: {source}")]
    Open {
        index: u32,
        #[source]
        source: io::Error,
    },

    #[error("camera device {index} does not support video capture")]
    NotCapture { index: u32 },

    #[error("no usable camera device found")]
    NotFound,

    #[error("failed to configure camera: {0}")]
    Configure(String),
}

/// Device read failure while running. Fatal to the acquisition unit.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera disconnected: {0}")]
    Disconnected(#[source] io::Error),

    #[error("camera stalled: no frame within {0:?}")]
    Stalled(Duration),

    #[error("capture stream not started")]
    NotStreaming,

    #[error("failed to decode {format} frame: {reason}")]
    Decode {
        format: &'static str,
        reason: String,
    },

    #[error("frame source reached end of stream")]
    EndOfStream,
}

/// Inference failure. Fatal to the detection unit, never skipped.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("failed to load model: {0}")]
    Model(String),

    #[error("frame rejected by detector: {0}")]
    InvalidInput(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Returned by `PipelineController::start`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("detector warm-up failed: {0}")]
    Detector(#[from] DetectorError),

    #[error("failed to spawn {unit} thread: {source}")]
    Spawn {
        unit: &'static str,
        #[source]
        source: io::Error,
    },
}
