// Pipeline orchestrator: runs one extraction job end to end
//
// Opens the video, builds the configured detector and drives the assembler
// on a dedicated thread, reporting progress through `ProcessingState`.

use super::assembler::{assemble, AssemblerConfig, Assembly};
pub use super::types::ProcessingState;
use crate::error::PipelineError;
use crate::pose::{create_detector, DetectorConfig, PoseAdapter};
use crate::video::{open_video, VideoBackend};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

/// Everything needed to process one video.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub video_path: PathBuf,
    pub backend: VideoBackend,
    pub detector: DetectorConfig,
    pub assembler: AssemblerConfig,
}

/// Runs the pipeline on the calling thread and marks `state` finished.
pub fn run_pipeline(
    request: &PipelineRequest,
    state: &ProcessingState,
) -> Result<Assembly, PipelineError> {
    let result = run_stages(request, state);
    match &result {
        Ok(assembly) => {
            tracing::info!(
                "Job {} finished: {} frames with a pose",
                state.job_id,
                assembly.records.len()
            );
            state.finish(None);
        }
        Err(PipelineError::Cancelled) => {
            tracing::info!("Job {} cancelled", state.job_id);
            state.finish(Some(PipelineError::Cancelled.user_message().to_string()));
        }
        Err(e) => {
            tracing::error!("Job {} failed: {}", state.job_id, e);
            state.finish(Some(e.user_message().to_string()));
        }
    }
    result
}

fn run_stages(
    request: &PipelineRequest,
    state: &ProcessingState,
) -> Result<Assembly, PipelineError> {
    // Detector first: a missing capability should not cost a video decode.
    let mut adapter = PoseAdapter::new(create_detector(&request.detector)?);
    adapter.initialize()?;

    if state.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let mut source = open_video(request.backend, &request.video_path)?;
    assemble(source.as_mut(), &mut adapter, &request.assembler, state)
}

/// Start processing on a background thread. `on_done` receives the outcome
/// on that same thread.
pub fn spawn_pipeline<F>(
    request: PipelineRequest,
    state: Arc<ProcessingState>,
    on_done: F,
) -> thread::JoinHandle<()>
where
    F: FnOnce(Result<Assembly, PipelineError>) + Send + 'static,
{
    thread::spawn(move || {
        tracing::info!(
            "Spawning pipeline worker for job {} ({})",
            state.job_id,
            request.video_path.display()
        );
        let result = run_pipeline(&request, &state);
        on_done(result);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InitError, VideoDecodeError};
    use crate::pose::DetectorKind;
    use std::sync::atomic::Ordering;
    use std::sync::mpsc;

    fn request(kind: DetectorKind) -> PipelineRequest {
        PipelineRequest {
            video_path: PathBuf::from("/nonexistent/clip.mp4"),
            backend: VideoBackend::Ffmpeg,
            detector: DetectorConfig {
                kind,
                ..DetectorConfig::default()
            },
            assembler: AssemblerConfig::default(),
        }
    }

    #[test]
    fn test_missing_model_fails_before_video() {
        let state = ProcessingState::new(1, "clip.mp4".to_string());
        let result = run_pipeline(&request(DetectorKind::Onnx), &state);

        assert!(matches!(
            result,
            Err(PipelineError::Init(InitError::ModelNotFound(_)))
        ));
        let json = state.to_progress_json();
        assert_eq!(json["is_complete"], true);
        assert_eq!(json["error"], "pose detection unavailable");
    }

    #[test]
    fn test_missing_video_is_decode_failure() {
        let state = ProcessingState::new(2, "clip.mp4".to_string());
        let result = run_pipeline(&request(DetectorKind::Null), &state);

        assert!(matches!(
            result,
            Err(PipelineError::Decode(VideoDecodeError::Open { .. }))
        ));
        assert_eq!(state.to_progress_json()["error"], "failed to process video");
    }

    #[test]
    fn test_cancelled_job_never_opens_video() {
        let state = ProcessingState::new(3, "clip.mp4".to_string());
        state.cancel();
        let result = run_pipeline(&request(DetectorKind::Simulated), &state);
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[test]
    fn test_spawn_pipeline_reports_outcome() {
        let state = Arc::new(ProcessingState::new(4, "clip.mp4".to_string()));
        let (tx, rx) = mpsc::channel();
        let handle = spawn_pipeline(request(DetectorKind::Null), state.clone(), move |result| {
            let _ = tx.send(result.is_err());
        });
        handle.join().unwrap();

        assert_eq!(rx.recv().unwrap(), true);
        assert!(state.is_complete.load(Ordering::SeqCst));
    }
}
