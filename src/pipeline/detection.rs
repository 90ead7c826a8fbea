//! Detection unit: frame queue -> detector -> history + result queue

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::{Shared, UnitGuard};
use crate::detect::{DetectionResult, Detector};

pub(crate) type SharedDetector = Arc<Mutex<Box<dyn Detector>>>;

/// Process frames until stopped or the detector fails.
///
/// Parameters and the flip flag are re-read for every frame, so updates take
/// effect on the next cycle and never on a frame already being processed.
pub(crate) fn run(shared: Arc<Shared>, detector: SharedDetector, core: Option<usize>) {
    let _guard = UnitGuard {
        unit: "detection",
        shared: &shared,
    };
    if let Some(core) = core {
        pin_to_core(core);
    }

    // only this thread touches the detector while a run is live
    let mut detector = detector.lock().unwrap_or_else(|p| p.into_inner());
    info!(detector = detector.name(), "Detection started");

    while shared.is_running() {
        let Some(mut frame) = shared.frames.pop_blocking(shared.idle_wait) else {
            continue;
        };

        let params = shared.config.detection_params();
        if shared.config.flip() {
            frame.flip_horizontal();
        }

        let started = Instant::now();
        let detections = match detector.infer(&frame, &params) {
            Ok(detections) => detections,
            Err(err) => {
                error!(detector = detector.name(), "Detection error: {}", err);
                shared.fail(err.into());
                break;
            }
        };
        let inference_time = started.elapsed();

        shared.metrics.record_processed();
        metrics::histogram!("argus_inference_time_us").record(inference_time.as_micros() as f64);

        let result = Arc::new(DetectionResult {
            sequence: frame.sequence(),
            timestamp: Instant::now(),
            frame,
            detections,
            inference_time,
        });
        shared.history.push(result.clone());

        let seq = result.sequence;
        if !shared.results.try_push(result) {
            debug!(seq, "Result queue full, dropping newest result");
        }
    }

    let discarded = shared.frames.drain_all();
    info!(
        processed = shared.metrics.frames_processed(),
        discarded, "Detection stopped"
    );
}

fn pin_to_core(core: usize) {
    let Some(id) = core_affinity::get_core_ids()
        .and_then(|ids| ids.into_iter().find(|id| id.id == core))
    else {
        warn!(core, "Requested detection core not available");
        return;
    };

    if core_affinity::set_for_current(id) {
        info!(core, "Detection thread pinned");
    } else {
        warn!(core, "Failed to pin detection thread");
    }
}
