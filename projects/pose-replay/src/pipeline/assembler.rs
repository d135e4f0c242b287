use super::types::{FrameImage, FrameRecord, ProcessingState, STAGE_DETECT, STAGE_SAMPLE};
use crate::error::{DetectError, InitError, PipelineError};
use crate::pose::PoseAdapter;
use crate::video::sampler::{FrameSampler, DEFAULT_SAMPLE_RATE};
use crate::video::{VideoInfo, VideoSource};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblerConfig {
    /// Samples per second drawn from the video.
    pub sample_rate: f64,
    /// Thumbnail width kept per record; 0 keeps no image.
    pub thumbnail_width: u32,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            thumbnail_width: 160,
        }
    }
}

/// Result of a completed assembly. `records` may be empty.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub records: Vec<FrameRecord>,
    pub sampled: usize,
    pub skipped: usize,
    pub video: VideoInfo,
}

/// Pulls samples one at a time through the detector and keeps the ones with
/// a pose, in sample order.
///
/// Sampling and detection run strictly in sequence on the calling thread.
/// The job is abandoned with `PipelineError::Cancelled` as soon as `state`
/// is cancelled; a detection that was already running when that happened
/// is thrown away.
pub fn assemble<S: VideoSource + ?Sized>(
    source: &mut S,
    adapter: &mut PoseAdapter,
    config: &AssemblerConfig,
    state: &ProcessingState,
) -> Result<Assembly, PipelineError> {
    adapter.initialize()?;

    let video = source.info();
    let mut sampler = FrameSampler::new(source, config.sample_rate);
    state.set_total(sampler.total_samples());

    tracing::info!(
        "Assembling job {}: {:.2}s at {} Hz -> {} samples, detector '{}'",
        state.job_id,
        video.duration_secs,
        config.sample_rate,
        sampler.total_samples(),
        adapter.detector_name()
    );

    let mut records: Vec<FrameRecord> = Vec::new();
    let mut sampled = 0usize;

    loop {
        if state.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let sample_start = Instant::now();
        let sample = match sampler.next() {
            Some(result) => result?,
            None => break,
        };
        sampled += 1;
        state.update_stage(
            STAGE_SAMPLE,
            sample.index + 1,
            sample_start.elapsed().as_secs_f64() * 1000.0,
        );

        let detect_start = Instant::now();
        let detection = adapter.detect(&sample.image);
        state.update_stage(
            STAGE_DETECT,
            sample.index + 1,
            detect_start.elapsed().as_secs_f64() * 1000.0,
        );

        if state.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let landmarks = match detection {
            Ok(Some(landmarks)) => landmarks,
            Ok(None) => continue,
            Err(DetectError::Transient(reason)) => {
                tracing::warn!(
                    "Pose detection failed at {:.3}s, skipping: {}",
                    sample.timestamp_secs,
                    reason
                );
                continue;
            }
            Err(DetectError::Unavailable(reason)) => {
                return Err(PipelineError::Init(InitError::Unavailable(reason)));
            }
            Err(DetectError::NotInitialized) => {
                return Err(PipelineError::Init(InitError::Unavailable(
                    "detector not initialized".to_string(),
                )));
            }
        };

        tracing::debug!(
            "Pose at {}ms (max visibility {:.2})",
            sample.timestamp_ms,
            landmarks.max_visibility()
        );
        state.record_detection();
        records.push(FrameRecord {
            timestamp_ms: sample.timestamp_ms,
            frame_image: FrameImage::encode_thumbnail(&sample.image, config.thumbnail_width),
            landmarks,
        });
    }

    let skipped = sampler.skipped();
    tracing::info!(
        "Job {} assembled: {} records from {} samples ({} undecodable)",
        state.job_id,
        records.len(),
        sampled,
        skipped
    );

    Ok(Assembly {
        records,
        sampled,
        skipped,
        video,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VideoDecodeError;
    use crate::pose::simulated::{synthetic_pose, NullDetector};
    use crate::pose::{LandmarkName, LandmarkSet, PoseDetector, LANDMARK_COUNT};
    use crate::video::sampler::tests::FakeSource;
    use image::RgbImage;
    use std::sync::Arc;

    /// Finds a pose on every `every`-th call, optionally misbehaving on some.
    struct ScriptedDetector {
        calls: usize,
        every: usize,
        transient_at: Vec<usize>,
        unavailable_at: Option<usize>,
        fail_init: bool,
        cancel_on_call: Option<(usize, Arc<ProcessingState>)>,
    }

    impl ScriptedDetector {
        fn every(every: usize) -> Self {
            Self {
                calls: 0,
                every,
                transient_at: Vec::new(),
                unavailable_at: None,
                fail_init: false,
                cancel_on_call: None,
            }
        }
    }

    impl PoseDetector for ScriptedDetector {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn initialize(&mut self) -> Result<(), InitError> {
            if self.fail_init {
                Err(InitError::ModelNotFound("pose.onnx".into()))
            } else {
                Ok(())
            }
        }

        fn detect(&mut self, _image: &RgbImage) -> Result<Option<LandmarkSet>, DetectError> {
            let call = self.calls;
            self.calls += 1;
            if let Some((at, state)) = &self.cancel_on_call {
                if *at == call {
                    state.cancel();
                }
            }
            if self.unavailable_at == Some(call) {
                return Err(DetectError::Unavailable("service down".into()));
            }
            if self.transient_at.contains(&call) {
                return Err(DetectError::Transient("blurry".into()));
            }
            if call % self.every == 0 {
                Ok(Some(synthetic_pose(call as f32)))
            } else {
                Ok(None)
            }
        }
    }

    fn run(
        source: &mut FakeSource,
        detector: ScriptedDetector,
        state: &ProcessingState,
    ) -> Result<Assembly, PipelineError> {
        let mut adapter = PoseAdapter::new(Box::new(detector));
        assemble(source, &mut adapter, &AssemblerConfig::default(), state)
    }

    fn state() -> ProcessingState {
        ProcessingState::new(1, "clip.mp4".to_string())
    }

    #[test]
    fn test_scenario_a_even_indices() {
        let mut source = FakeSource::new(2.0);
        let assembly = run(&mut source, ScriptedDetector::every(2), &state()).unwrap();

        assert_eq!(assembly.sampled, 20);
        let ms: Vec<u64> = assembly.records.iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(ms, vec![0, 200, 400, 600, 800, 1000, 1200, 1400, 1600, 1800]);
    }

    #[test]
    fn test_records_are_ordered_dense_and_complete() {
        let mut source = FakeSource::new(3.7);
        source.bad = vec![4, 9, 10];
        let mut detector = ScriptedDetector::every(3);
        detector.transient_at = vec![6, 12];
        let assembly = run(&mut source, detector, &state()).unwrap();

        // strictly increasing
        assert!(assembly
            .records
            .windows(2)
            .all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
        // never more records than floor(duration * rate)
        assert!(assembly.records.len() <= (3.7_f64 * 10.0).floor() as usize);
        assert_eq!(assembly.skipped, 3);
        for record in &assembly.records {
            assert_eq!(record.landmarks.len(), LANDMARK_COUNT);
            let names: Vec<LandmarkName> = record.landmarks.iter().map(|l| l.name).collect();
            assert_eq!(names, LandmarkName::ALL.to_vec());
        }
    }

    #[test]
    fn test_records_carry_thumbnails() {
        let mut source = FakeSource::new(0.5);
        let assembly = run(&mut source, ScriptedDetector::every(1), &state()).unwrap();
        assert_eq!(assembly.records.len(), 5);
        assert!(assembly.records.iter().all(|r| r.has_image()));

        let mut source = FakeSource::new(0.5);
        let mut adapter = PoseAdapter::new(Box::new(ScriptedDetector::every(1)));
        let config = AssemblerConfig {
            thumbnail_width: 0,
            ..AssemblerConfig::default()
        };
        let assembly = assemble(&mut source, &mut adapter, &config, &state()).unwrap();
        assert!(assembly.records.iter().all(|r| !r.has_image()));
    }

    #[test]
    fn test_scenario_b_init_failure() {
        let mut source = FakeSource::new(2.0);
        let mut detector = ScriptedDetector::every(1);
        detector.fail_init = true;
        let result = run(&mut source, detector, &state());

        assert!(matches!(
            result,
            Err(PipelineError::Init(InitError::ModelNotFound(_)))
        ));
        // nothing decoded once initialization failed
        assert!(source.requested.is_empty());
    }

    #[test]
    fn test_null_detector_gives_empty_success() {
        let mut source = FakeSource::new(2.0);
        let mut adapter = PoseAdapter::new(Box::new(NullDetector));
        let assembly =
            assemble(&mut source, &mut adapter, &AssemblerConfig::default(), &state()).unwrap();
        assert!(assembly.records.is_empty());
        assert_eq!(assembly.sampled, 20);
    }

    #[test]
    fn test_unavailable_detector_is_terminal() {
        let mut source = FakeSource::new(2.0);
        let mut detector = ScriptedDetector::every(1);
        detector.unavailable_at = Some(3);
        let result = run(&mut source, detector, &state());
        assert!(matches!(
            result,
            Err(PipelineError::Init(InitError::Unavailable(_)))
        ));
        assert_eq!(source.requested.len(), 4);
    }

    #[test]
    fn test_unusable_video_is_terminal() {
        let mut source = FakeSource::new(2.0);
        source.fatal_at = Some(5);
        let result = run(&mut source, ScriptedDetector::every(1), &state());
        assert!(matches!(
            result,
            Err(PipelineError::Decode(VideoDecodeError::Unusable { .. }))
        ));
    }

    #[test]
    fn test_cancellation_discards_in_flight_detection() {
        let state = Arc::new(state());
        let mut source = FakeSource::new(2.0);
        let mut detector = ScriptedDetector::every(1);
        detector.cancel_on_call = Some((4, state.clone()));

        let result = run(&mut source, detector, &state);
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(source.requested.len(), 5);
        assert_eq!(state.detected.load(std::sync::atomic::Ordering::Relaxed), 4);
    }

    #[test]
    fn test_cancelled_before_start() {
        let state = state();
        state.cancel();
        let mut source = FakeSource::new(2.0);
        let result = run(&mut source, ScriptedDetector::every(1), &state);
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(source.requested.is_empty());
    }

    #[test]
    fn test_progress_is_reported() {
        let state = state();
        let mut source = FakeSource::new(1.0);
        run(&mut source, ScriptedDetector::every(2), &state).unwrap();

        let json = state.to_progress_json();
        assert_eq!(json["total_samples"], 10);
        assert_eq!(json["detected"], 5);
        assert_eq!(json["stages"]["sample"]["current"], 10);
        assert_eq!(json["stages"]["detect"]["current"], 10);
    }
}
