// The session boundary: owns the playback controller, starts extraction jobs
// and applies their outcome. At most one job is current; anything a
// superseded job produces is dropped on arrival.

use crate::error::PipelineError;
use crate::pipeline::{spawn_pipeline, AssemblerConfig, Assembly, PipelineRequest, ProcessingState};
use crate::playback::{PlaybackController, PlaybackSnapshot, ScrubIndex};
use crate::pose::DetectorConfig;
use crate::video::VideoBackend;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Processing { job_id: u64 },
    Ready { frames: usize },
    NoPoses,
    Failed { message: String },
}

/// Pipeline options applied to every upload in this session.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub backend: VideoBackend,
    pub detector: DetectorConfig,
    pub assembler: AssemblerConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub status: SessionStatus,
    pub video: Option<String>,
    pub playback: PlaybackSnapshot,
}

struct Inner {
    status: SessionStatus,
    next_job_id: u64,
    current: Option<Arc<ProcessingState>>,
    /// Most recent job, kept after it finishes for progress reporting.
    latest: Option<Arc<ProcessingState>>,
    video: Option<String>,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<Inner>>,
    controller: PlaybackController,
    settings: PipelineSettings,
}

impl Session {
    pub fn new(runtime: Handle, settings: PipelineSettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                status: SessionStatus::Idle,
                next_job_id: 1,
                current: None,
                latest: None,
                video: None,
            })),
            controller: PlaybackController::new(runtime),
            settings,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn scrub(&self) -> ScrubIndex {
        ScrubIndex::new(self.controller.clone())
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status.clone()
    }

    /// Starts processing `video_path` in the background, superseding any job
    /// still running. Returns the new job id.
    pub fn upload(&self, video_path: PathBuf) -> u64 {
        let (job_id, state) = self.start_job(video_path.display().to_string());
        let request = PipelineRequest {
            video_path,
            backend: self.settings.backend,
            detector: self.settings.detector.clone(),
            assembler: self.settings.assembler,
        };

        let session = self.clone();
        spawn_pipeline(request, state, move |result| {
            session.complete_job(job_id, result);
        });
        job_id
    }

    /// Cancels the current job, releases playback and registers a new job.
    pub fn start_job(&self, video: String) -> (u64, Arc<ProcessingState>) {
        let mut inner = self.lock();
        if let Some(previous) = inner.current.take() {
            tracing::info!("Job {} superseded by a new upload", previous.job_id);
            previous.cancel();
        }
        self.controller.teardown();

        let job_id = inner.next_job_id;
        inner.next_job_id += 1;
        let state = Arc::new(ProcessingState::new(job_id, video.clone()));
        inner.current = Some(state.clone());
        inner.latest = Some(state.clone());
        inner.video = Some(video);
        inner.status = SessionStatus::Processing { job_id };
        tracing::info!("Job {} started", job_id);
        (job_id, state)
    }

    /// Applies a finished job. Returns false when the job is no longer
    /// current and its result was discarded.
    pub fn complete_job(&self, job_id: u64, result: Result<Assembly, PipelineError>) -> bool {
        let mut inner = self.lock();
        // superseding or cancelling a job removes it from `current`
        let is_current = inner
            .current
            .as_ref()
            .is_some_and(|state| state.job_id == job_id);
        if !is_current {
            tracing::info!("Discarding result of stale job {}", job_id);
            return false;
        }
        inner.current = None;

        inner.status = match result {
            Ok(assembly) if assembly.records.is_empty() => {
                tracing::info!("Job {}: no poses detected", job_id);
                self.controller.load(Vec::new());
                SessionStatus::NoPoses
            }
            Ok(assembly) => {
                let frames = assembly.records.len();
                self.controller.load(assembly.records);
                SessionStatus::Ready { frames }
            }
            Err(PipelineError::Cancelled) => SessionStatus::Idle,
            Err(e) => SessionStatus::Failed {
                message: e.user_message().to_string(),
            },
        };
        true
    }

    /// Abandons the current job, if any.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        if let Some(state) = inner.current.take() {
            tracing::info!("Job {} cancelled", state.job_id);
            state.cancel();
            inner.status = SessionStatus::Idle;
        }
    }

    /// Ends the session: cancels processing and releases playback.
    pub fn end(&self) {
        let mut inner = self.lock();
        if let Some(state) = inner.current.take() {
            state.cancel();
        }
        self.controller.teardown();
        inner.status = SessionStatus::Idle;
        inner.video = None;
    }

    pub fn progress(&self) -> Option<serde_json::Value> {
        self.lock().latest.as_ref().map(|state| state.to_progress_json())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            status: inner.status.clone(),
            video: inner.video.clone(),
            playback: self.controller.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InitError, VideoDecodeError};
    use crate::playback::controller::tests::records;
    use crate::playback::PlaybackState;
    use crate::pose::DetectorKind;
    use crate::video::VideoInfo;
    use std::time::Duration;

    fn session(kind: DetectorKind) -> Session {
        Session::new(
            Handle::current(),
            PipelineSettings {
                backend: VideoBackend::Ffmpeg,
                detector: DetectorConfig {
                    kind,
                    ..DetectorConfig::default()
                },
                assembler: AssemblerConfig::default(),
            },
        )
    }

    fn assembly(n: usize) -> Assembly {
        Assembly {
            records: records(n),
            sampled: n * 2,
            skipped: 0,
            video: VideoInfo {
                duration_secs: n as f64,
                width: 64,
                height: 48,
                fps: 30.0,
            },
        }
    }

    #[tokio::test]
    async fn test_ready_loads_playback() {
        let session = session(DetectorKind::Simulated);
        let (job_id, _) = session.start_job("a.mp4".to_string());
        assert_eq!(session.status(), SessionStatus::Processing { job_id });

        assert!(session.complete_job(job_id, Ok(assembly(5))));
        assert_eq!(session.status(), SessionStatus::Ready { frames: 5 });
        assert_eq!(session.controller().state(), PlaybackState::Paused { index: 0 });
    }

    #[tokio::test]
    async fn test_new_upload_supersedes_running_job() {
        let session = session(DetectorKind::Simulated);
        let (first, first_state) = session.start_job("a.mp4".to_string());
        let (second, _) = session.start_job("b.mp4".to_string());
        assert!(first_state.is_cancelled());

        // the first job's late result must not touch playback
        assert!(!session.complete_job(first, Ok(assembly(7))));
        assert_eq!(session.status(), SessionStatus::Processing { job_id: second });
        assert_eq!(session.controller().state(), PlaybackState::Idle);

        assert!(session.complete_job(second, Ok(assembly(3))));
        assert_eq!(session.controller().records().len(), 3);
    }

    #[tokio::test]
    async fn test_upload_tears_down_playback() {
        let session = session(DetectorKind::Simulated);
        let (job_id, _) = session.start_job("a.mp4".to_string());
        session.complete_job(job_id, Ok(assembly(4)));
        session.controller().play();

        session.start_job("b.mp4".to_string());
        assert_eq!(session.controller().state(), PlaybackState::Idle);
        assert!(session.controller().records().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_b_init_failure_leaves_playback_idle() {
        let session = session(DetectorKind::Onnx);
        let (job_id, _) = session.start_job("a.mp4".to_string());
        session.complete_job(
            job_id,
            Err(PipelineError::Init(InitError::ModelNotFound("pose.onnx".into()))),
        );

        assert_eq!(
            session.status(),
            SessionStatus::Failed {
                message: "pose detection unavailable".to_string()
            }
        );
        assert_eq!(session.controller().state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_scenario_d_no_poses() {
        let session = session(DetectorKind::Null);
        let (job_id, _) = session.start_job("a.mp4".to_string());
        session.complete_job(job_id, Ok(assembly(0)));

        assert_eq!(session.status(), SessionStatus::NoPoses);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.playback.state, PlaybackState::Idle);
        assert_eq!(snapshot.playback.frame_count, 0);
    }

    #[tokio::test]
    async fn test_decode_failure_message() {
        let session = session(DetectorKind::Simulated);
        let (job_id, _) = session.start_job("a.mp4".to_string());
        session.complete_job(
            job_id,
            Err(PipelineError::Decode(VideoDecodeError::Unusable {
                reason: "corrupt".into(),
            })),
        );
        assert_eq!(
            session.status(),
            SessionStatus::Failed {
                message: "failed to process video".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_cancel_discards_result() {
        let session = session(DetectorKind::Simulated);
        let (job_id, state) = session.start_job("a.mp4".to_string());
        session.cancel();
        assert!(state.is_cancelled());
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(!session.complete_job(job_id, Ok(assembly(2))));
        assert_eq!(session.controller().state(), PlaybackState::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upload_of_missing_video_fails() {
        let session = session(DetectorKind::Simulated);
        session.upload(PathBuf::from("/nonexistent/clip.mp4"));

        let mut status = session.status();
        for _ in 0..100 {
            if !matches!(status, SessionStatus::Processing { .. }) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            status = session.status();
        }
        assert_eq!(
            status,
            SessionStatus::Failed {
                message: "failed to process video".to_string()
            }
        );
        assert_eq!(session.progress().unwrap()["is_complete"], true);
    }
}
