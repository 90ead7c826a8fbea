//! Presentation unit: result queue -> metrics -> dispatcher

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use super::{Shared, UnitGuard};
use crate::display::PresentedFrame;

pub(crate) fn run(shared: Arc<Shared>) {
    let _guard = UnitGuard {
        unit: "presentation",
        shared: &shared,
    };
    info!("Presentation started");

    let mut dispatched: u64 = 0;
    while shared.is_running() {
        let Some(result) = shared.results.pop_blocking(shared.presentation_wait) else {
            continue;
        };

        shared.metrics.record_frame_arrival(Instant::now());
        let snapshot = shared.metrics.snapshot();
        metrics::gauge!("argus_average_fps").set(snapshot.average_fps);

        if shared.dispatcher.send_frame(PresentedFrame {
            result,
            average_fps: snapshot.average_fps,
            efficiency_percent: snapshot.efficiency_percent,
        }) {
            dispatched += 1;
        }
    }

    shared.results.drain_all();
    info!(dispatched, "Presentation stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::capture::{Frame, PixelFormat};
    use crate::detect::{Detection, DetectionResult};
    use crate::display::Presenter;
    use crate::pipeline::test_support;
    use crate::PipelineSettings;

    #[derive(Default)]
    struct Seen(Vec<(u64, f64)>);

    impl Presenter for Seen {
        fn render(&mut self, frame: &Frame, _: &[Detection], _: f64, efficiency: f64) {
            self.0.push((frame.sequence(), efficiency));
        }
    }

    fn result(seq: u64) -> Arc<DetectionResult> {
        Arc::new(DetectionResult {
            sequence: seq,
            timestamp: Instant::now(),
            frame: Frame::new(vec![0u8; 3], 1, 1, PixelFormat::Rgb24, seq),
            detections: Vec::new(),
            inference_time: Duration::ZERO,
        })
    }

    #[test]
    fn results_reach_the_owner_in_order_with_metrics() {
        let (shared, pump) = test_support::shared(PipelineSettings {
            dispatch_capacity: 8,
            presentation_wait_ms: 5,
            ..PipelineSettings::default()
        });
        for _ in 0..4 {
            shared.metrics.record_seen();
        }
        shared.metrics.record_processed();
        for seq in 1..=2 {
            shared.results.try_push(result(seq));
        }

        shared.set_running(true);
        let worker = {
            let shared = shared.clone();
            std::thread::spawn(move || run(shared))
        };

        let mut seen = Seen::default();
        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.0.len() < 2 && Instant::now() < deadline {
            pump.pump(&mut seen, Duration::from_millis(10));
        }
        shared.set_running(false);
        worker.join().unwrap();

        assert_eq!(seen.0, vec![(1, 25.0), (2, 25.0)]);
    }
}
