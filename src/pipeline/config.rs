//! Live-tunable detection parameters
//!
//! Each field is its own atomic: writers never block the detection thread,
//! and a cycle may observe a mix of old and new values across fields.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use tracing::{info, warn};

use crate::detect::DetectionParams;
use crate::PipelineSettings;

/// f32 stored as its bit pattern
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(v: f32) -> Self {
        Self(AtomicU32::new(v.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, v: f32) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
}

pub struct PipelineConfig {
    confidence: AtomicF32,
    iou: AtomicF32,
    max_detections: AtomicUsize,
    flip: AtomicBool,
    frame_skip: AtomicUsize,
}

/// Partial update; `None` fields are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigUpdate {
    pub confidence: Option<f32>,
    pub iou: Option<f32>,
    pub max_detections: Option<usize>,
    pub flip: Option<bool>,
    pub frame_skip: Option<usize>,
}

impl PipelineConfig {
    pub fn new(settings: &PipelineSettings) -> Self {
        Self {
            confidence: AtomicF32::new(unit_interval(settings.confidence).unwrap_or(0.5)),
            iou: AtomicF32::new(unit_interval(settings.iou).unwrap_or(0.45)),
            max_detections: AtomicUsize::new(settings.max_detections),
            flip: AtomicBool::new(settings.flip),
            frame_skip: AtomicUsize::new(settings.frame_skip.max(1)),
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence.load()
    }

    pub fn iou(&self) -> f32 {
        self.iou.load()
    }

    pub fn max_detections(&self) -> usize {
        self.max_detections.load(Ordering::Relaxed)
    }

    pub fn flip(&self) -> bool {
        self.flip.load(Ordering::Relaxed)
    }

    pub fn frame_skip(&self) -> usize {
        self.frame_skip.load(Ordering::Relaxed)
    }

    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            confidence: self.confidence(),
            iou: self.iou(),
            max_detections: self.max_detections(),
        }
    }

    /// Values outside [0, 1] are clamped; NaN is ignored.
    pub fn set_confidence(&self, v: f32) {
        match unit_interval(v) {
            Some(v) => self.confidence.store(v),
            None => warn!("Ignoring non-numeric confidence threshold"),
        }
    }

    pub fn set_iou(&self, v: f32) {
        match unit_interval(v) {
            Some(v) => self.iou.store(v),
            None => warn!("Ignoring non-numeric IOU threshold"),
        }
    }

    pub fn set_max_detections(&self, n: usize) {
        self.max_detections.store(n, Ordering::Relaxed);
    }

    pub fn set_flip(&self, enabled: bool) {
        self.flip.store(enabled, Ordering::Relaxed);
        info!("Camera flip: {}", if enabled { "ON" } else { "OFF" });
    }

    /// Stride 0 is treated as 1.
    pub fn set_frame_skip(&self, n: usize) {
        self.frame_skip.store(n.max(1), Ordering::Relaxed);
    }

    pub fn apply(&self, update: ConfigUpdate) {
        if let Some(v) = update.confidence {
            self.set_confidence(v);
        }
        if let Some(v) = update.iou {
            self.set_iou(v);
        }
        if let Some(n) = update.max_detections {
            self.set_max_detections(n);
        }
        if let Some(flip) = update.flip {
            self.set_flip(flip);
        }
        if let Some(n) = update.frame_skip {
            self.set_frame_skip(n);
        }
    }
}

fn unit_interval(v: f32) -> Option<f32> {
    (!v.is_nan()).then(|| v.clamp(0.0, 1.0))
}
