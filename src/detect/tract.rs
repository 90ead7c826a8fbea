//! YOLOv8-style ONNX detector running on tract

use std::path::Path;

use image::imageops::{self, FilterType};
use tracing::{info, instrument};
use tract_onnx::prelude::*;

use super::{postprocess, BoundingBox, Detection, DetectionParams, Detector};
use crate::capture::Frame;
use crate::error::DetectorError;

const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Expects a `[1, 3, S, S]` float input and a `[1, 4 + classes, candidates]` output.
pub struct TractYolo {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>,
    input_size: u32,
    labels: Vec<String>,
}

impl TractYolo {
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        input_size: u32,
        labels: Option<Vec<String>>,
    ) -> Result<Self, DetectorError> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .and_then(|m| {
                let fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size));
                m.with_input_fact(0, fact)
            })
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| DetectorError::Model(format!("{}: {e}", model_path.display())))?;

        info!("Loaded YOLO model {} ({}px input)", model_path.display(), input_size);

        Ok(Self {
            model,
            input_size,
            labels: labels
                .unwrap_or_else(|| COCO_LABELS.iter().map(|l| l.to_string()).collect()),
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor, DetectorError> {
        let rgb = frame.to_rgb_image().ok_or_else(|| {
            DetectorError::InvalidInput(format!(
                "frame {} buffer does not match {}x{}",
                frame.sequence(),
                frame.width(),
                frame.height()
            ))
        })?;
        let resized = imageops::resize(
            &rgb,
            self.input_size,
            self.input_size,
            FilterType::Triangle,
        );

        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, output: &Tensor, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| DetectorError::Inference(format!("output tensor was not f32: {e}")))?;
        let shape = view.shape();
        if shape.len() != 3 || shape[1] <= 4 {
            return Err(DetectorError::Inference(format!("unexpected output shape {shape:?}")));
        }

        let (channels, candidates) = (shape[1], shape[2]);
        let sx = frame.width() as f32 / self.input_size as f32;
        let sy = frame.height() as f32 / self.input_size as f32;

        let mut detections = Vec::new();
        for i in 0..candidates {
            let (class_id, score) = (4..channels)
                .map(|c| (c - 4, view[[0, c, i]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });

            if !score.is_finite() {
                continue;
            }

            let bbox = BoundingBox::from_center(
                view[[0, 0, i]] * sx,
                view[[0, 1, i]] * sy,
                view[[0, 2, i]] * sx,
                view[[0, 3, i]] * sy,
            );
            detections.push(Detection {
                bbox,
                class_id,
                label: self
                    .labels
                    .get(class_id)
                    .cloned()
                    .unwrap_or_else(|| format!("class {class_id}")),
                confidence: score,
            });
        }
        Ok(detections)
    }
}

impl Detector for TractYolo {
    fn name(&self) -> &'static str {
        "tract-yolo"
    }

    #[instrument(skip_all, fields(seq = frame.sequence()))]
    fn infer(
        &mut self,
        frame: &Frame,
        params: &DetectionParams,
    ) -> Result<Vec<Detection>, DetectorError> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| DetectorError::Inference(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| DetectorError::Inference("model produced no outputs".into()))?;

        let candidates = self.decode(output, frame)?;
        Ok(postprocess(candidates, params))
    }
}
