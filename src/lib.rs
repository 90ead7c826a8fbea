pub mod capture;
pub mod detect;
pub mod display;
pub mod error;
pub mod pipeline;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use capture::{CaptureFormat, Frame, FrameSource, PixelFormat};
pub use detect::{BoundingBox, Detection, DetectionParams, DetectionResult, Detector};
pub use display::{Presenter, PresentationPump};
pub use error::{CameraError, CaptureError, ConfigError, DetectorError, PipelineError};
pub use pipeline::{
    MetricsSnapshot, PipelineConfig, PipelineController, PipelineFault, PipelineState,
    PipelineStatus,
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineSettings,
    pub detector: DetectorConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// `/dev/video{index}`; `None` picks the first capture-capable device
    pub device_index: Option<u32>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: CaptureFormat,
    /// Driver-side buffer depth, kept tiny so reads return the freshest frame
    pub buffer_depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub queue_capacity: usize,
    pub history_capacity: usize,
    pub fps_window: usize,
    pub dispatch_capacity: usize,
    pub presentation_wait_ms: u64,
    pub idle_wait_ms: u64,
    /// How long `stop` waits for a blocked device read before detaching it
    pub stop_timeout_ms: u64,
    pub detection_core: Option<usize>,

    // Initial values of the live-tunable parameters
    pub confidence: f32,
    pub iou: f32,
    pub max_detections: usize,
    pub flip: bool,
    pub frame_skip: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    /// Frames between `LogPresenter` summaries
    pub log_every: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: Some(0),
            width: 640,
            height: 480,
            fps: 30,
            format: CaptureFormat::Mjpeg,
            buffer_depth: 1,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 3,
            history_capacity: 10,
            fps_window: 30,
            dispatch_capacity: 2,
            presentation_wait_ms: 100,
            idle_wait_ms: 10,
            stop_timeout_ms: 1000,
            detection_core: None,
            confidence: 0.5,
            iou: 0.45,
            max_detections: 100,
            flip: true,
            frame_skip: 1,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: 640,
            labels: None,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 900,
            height: 600,
            log_every: 30,
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `ARGUS__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let loaded: Self = builder
            .add_source(
                config::Environment::with_prefix("ARGUS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if !(0.0..=1.0).contains(&p.confidence) {
            return Err(ConfigError::Invalid(format!(
                "confidence {} outside [0, 1]",
                p.confidence
            )));
        }
        if !(0.0..=1.0).contains(&p.iou) {
            return Err(ConfigError::Invalid(format!("iou {} outside [0, 1]", p.iou)));
        }
        if p.frame_skip == 0 {
            return Err(ConfigError::Invalid("frame_skip must be at least 1".into()));
        }
        for (name, value) in [
            ("queue_capacity", p.queue_capacity),
            ("history_capacity", p.history_capacity),
            ("fps_window", p.fps_window),
            ("dispatch_capacity", p.dispatch_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
            }
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(ConfigError::Invalid("capture size must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_describe_a_small_realtime_pipeline() {
        let config = Config::default();
        assert_eq!(config.pipeline.queue_capacity, 3);
        assert_eq!(config.pipeline.history_capacity, 10);
        assert_eq!(config.pipeline.fps_window, 30);
        assert_eq!(config.capture.buffer_depth, 1);
        assert!(config.pipeline.flip);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_overlays_toml_file_on_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[pipeline]\nconfidence = 0.25\nframe_skip = 2\n\n[capture]\nwidth = 320\nheight = 240"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert!((config.pipeline.confidence - 0.25).abs() < f32::EPSILON);
        assert_eq!(config.pipeline.frame_skip, 2);
        assert_eq!(config.capture.width, 320);
        // untouched keys keep their defaults
        assert_eq!(config.pipeline.queue_capacity, 3);
        assert_eq!(config.capture.fps, 30);
    }

    #[test]
    fn load_rejects_out_of_range_threshold() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[pipeline]\niou = 1.5").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn validate_rejects_zero_stride() {
        let mut config = Config::default();
        config.pipeline.frame_skip = 0;
        assert!(config.validate().is_err());
    }
}
