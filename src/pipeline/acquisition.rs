//! Acquisition unit: device reads into the frame queue

use std::sync::Arc;

use tracing::{debug, error, info};

use super::{Shared, UnitGuard};
use crate::capture::FrameSource;

/// Read frames until stopped or the device fails.
///
/// Every successful read counts as seen; only every `frame_skip`-th read is
/// offered to detection. The source is closed on the way out. Once `run_id`
/// is no longer current the unit only cleans up.
pub(crate) fn run(shared: Arc<Shared>, mut source: Box<dyn FrameSource>, run_id: u64) {
    let _guard = UnitGuard {
        unit: "acquisition",
        shared: &shared,
    };
    info!(source = %source.describe(), "Acquisition started");

    let mut counter: u64 = 0;
    while shared.is_live(run_id) {
        let frame = match source.read_frame() {
            Ok(frame) if shared.is_live(run_id) => frame,
            Ok(_) => break,
            Err(err) => {
                if shared.is_live(run_id) {
                    error!("Capture failed: {}", err);
                    shared.fail(err.into());
                }
                break;
            }
        };

        shared.metrics.record_seen();
        counter += 1;
        let stride = shared.config.frame_skip().max(1) as u64;
        if counter % stride != 0 {
            continue;
        }

        let seq = frame.sequence();
        if !shared.frames.try_push(frame) {
            debug!(seq, "Frame queue full, dropping newest frame");
        }
    }

    source.close();
    info!(
        frames_seen = shared.metrics.frames_seen(),
        "Acquisition stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticSource;
    use crate::pipeline::test_support;
    use crate::{CaptureConfig, PipelineSettings};

    fn source(frames: u64) -> Box<dyn FrameSource> {
        let mut source = SyntheticSource::new().with_limit(frames);
        let config = CaptureConfig {
            width: 4,
            height: 2,
            fps: 0,
            ..CaptureConfig::default()
        };
        source.configure(&config).unwrap();
        Box::new(source)
    }

    #[test]
    fn stride_forwards_every_nth_frame() {
        let (shared, _pump) = test_support::shared(PipelineSettings {
            queue_capacity: 16,
            frame_skip: 3,
            ..PipelineSettings::default()
        });
        shared.set_running(true);
        run(shared.clone(), source(9), shared.current_run());

        assert_eq!(shared.metrics.frames_seen(), 9);
        let forwarded: Vec<u64> = std::iter::from_fn(|| shared.frames.try_pop())
            .map(|f| f.sequence())
            .collect();
        assert_eq!(forwarded, vec![3, 6, 9]);
    }

    #[test]
    fn full_queue_keeps_the_oldest_frames() {
        let (shared, _pump) = test_support::shared(PipelineSettings::default());
        shared.set_running(true);
        run(shared.clone(), source(8), shared.current_run());

        assert_eq!(shared.frames.len(), 3);
        assert_eq!(shared.frames.stats().dropped, 5);
        assert_eq!(shared.frames.try_pop().map(|f| f.sequence()), Some(1));
    }

    #[test]
    fn end_of_stream_faults_the_pipeline() {
        let (shared, _pump) = test_support::shared(PipelineSettings::default());
        shared.set_running(true);
        run(shared.clone(), source(2), shared.current_run());

        assert!(!shared.is_running());
        assert!(matches!(
            shared.last_fault().as_deref(),
            Some(crate::pipeline::PipelineFault::Capture(_))
        ));
    }

    #[test]
    fn superseded_run_neither_faults_nor_forwards() {
        let (shared, _pump) = test_support::shared(PipelineSettings::default());
        let stale = shared.current_run();
        shared.reset();
        shared.set_running(true);
        run(shared.clone(), source(2), stale);

        assert!(shared.is_running());
        assert!(shared.last_fault().is_none());
        assert_eq!(shared.frames.len(), 0);
    }
}
