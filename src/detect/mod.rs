//! Detector capability consumed by the pipeline

pub mod postprocess;
#[cfg(feature = "yolo-tract")]
pub mod tract;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::capture::Frame;
use crate::error::DetectorError;

pub use postprocess::postprocess;
#[cfg(feature = "yolo-tract")]
pub use tract::TractYolo;

/// Thresholds read from the live config at the start of each detection cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    pub confidence: f32,
    pub iou: f32,
    pub max_detections: usize,
}

/// Axis-aligned box in source-frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union, 0 for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
}

/// Outcome of one completed detection cycle. Read-only once built.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub sequence: u64,
    /// When inference finished
    pub timestamp: Instant,
    pub frame: Frame,
    pub detections: Vec<Detection>,
    pub inference_time: Duration,
}

impl DetectionResult {
    pub fn detection_count(&self) -> usize {
        self.detections.len()
    }
}

/// Object detector invoked from the single detection thread.
pub trait Detector: Send {
    fn name(&self) -> &'static str;

    fn infer(
        &mut self,
        frame: &Frame,
        params: &DetectionParams,
    ) -> Result<Vec<Detection>, DetectorError>;

    /// Optional warm-up hook, run once per pipeline start.
    fn warm_up(&mut self) -> Result<(), DetectorError> {
        Ok(())
    }
}

/// Capture-only mode: never reports anything.
#[derive(Debug, Default)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn name(&self) -> &'static str {
        "null"
    }

    fn infer(
        &mut self,
        _frame: &Frame,
        _params: &DetectionParams,
    ) -> Result<Vec<Detection>, DetectorError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox { x1, y1, x2, y2 }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = BoundingBox::from_center(10.0, 10.0, 4.0, 4.0);
        assert!((b.iou(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = rect(0.0, 0.0, 2.0, 2.0);
        let b = rect(1.0, 0.0, 3.0, 2.0);
        // intersection 2, union 6
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_and_degenerate_boxes_have_zero_iou() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(5.0, 5.0, 6.0, 6.0);
        let empty = rect(2.0, 2.0, 2.0, 2.0);
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(empty.iou(&empty), 0.0);
    }
}
