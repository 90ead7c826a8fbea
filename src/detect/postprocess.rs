use std::cmp::Ordering;

use super::{Detection, DetectionParams};

/// Confidence filter, class-aware greedy NMS, then truncation to `max_detections`.
pub fn postprocess(mut candidates: Vec<Detection>, params: &DetectionParams) -> Vec<Detection> {
    candidates.retain(|d| d.confidence >= params.confidence);
    candidates.sort_unstable_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len().min(params.max_detections));
    for candidate in candidates {
        if kept.len() >= params.max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > params.iou
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(x: f32, class_id: usize, confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox {
                x1: x,
                y1: 0.0,
                x2: x + 10.0,
                y2: 10.0,
            },
            class_id,
            label: format!("class{class_id}"),
            confidence,
        }
    }

    fn params(confidence: f32, iou: f32, max_detections: usize) -> DetectionParams {
        DetectionParams {
            confidence,
            iou,
            max_detections,
        }
    }

    #[test]
    fn drops_low_confidence_candidates() {
        let out = postprocess(vec![det(0.0, 0, 0.3), det(50.0, 0, 0.7)], &params(0.5, 0.45, 10));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].confidence, 0.7);
    }

    #[test]
    fn suppresses_overlapping_boxes_of_same_class() {
        let out = postprocess(
            vec![det(0.0, 0, 0.6), det(1.0, 0, 0.9), det(100.0, 0, 0.8)],
            &params(0.1, 0.45, 10),
        );
        let confidences: Vec<f32> = out.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.8]);
    }

    #[test]
    fn keeps_overlapping_boxes_of_different_classes() {
        let out = postprocess(vec![det(0.0, 0, 0.9), det(1.0, 1, 0.8)], &params(0.1, 0.45, 10));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn truncates_to_max_detections_keeping_best() {
        let candidates = (0..5).map(|i| det(i as f32 * 100.0, 0, 0.5 + i as f32 * 0.1)).collect();
        let out = postprocess(candidates, &params(0.1, 0.45, 2));
        assert_eq!(out.len(), 2);
        assert!(out[0].confidence > out[1].confidence);
        assert!((out[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn zero_max_detections_yields_nothing() {
        assert!(postprocess(vec![det(0.0, 0, 0.9)], &params(0.1, 0.45, 0)).is_empty());
    }
}
