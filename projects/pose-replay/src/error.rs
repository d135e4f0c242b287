// Error taxonomy shared by the extraction pipeline and the playback engine.
//
// Per-frame problems (`DetectError::Transient`, `VideoDecodeError::Frame`) are
// absorbed where they happen. Everything that reaches `PipelineError` is a
// terminal failure for the current processing attempt.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InitError {
    #[error("pose model not found at {0}")]
    ModelNotFound(String),

    #[error("failed to load pose model: {0}")]
    ModelLoad(String),

    #[error("pose service unreachable: {0}")]
    Unreachable(String),

    #[error("pose detector unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectError {
    #[error("pose detector used before initialization")]
    NotInitialized,

    /// A miss on this frame only; the next frame may succeed.
    #[error("pose detection failed for frame: {0}")]
    Transient(String),

    /// The detector itself stopped working.
    #[error("pose detector stopped working: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VideoDecodeError {
    #[error("failed to open video {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("video became unreadable: {reason}")]
    Unusable { reason: String },

    #[error("failed to decode frame near {timestamp_secs:.3}s: {reason}")]
    Frame { timestamp_secs: f64, reason: String },
}

impl VideoDecodeError {
    /// True when the handle as a whole can no longer be used.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, VideoDecodeError::Frame { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Init(#[from] InitError),

    #[error(transparent)]
    Decode(#[from] VideoDecodeError),

    #[error("processing was cancelled")]
    Cancelled,
}

impl PipelineError {
    /// The single message shown to the user for a terminal failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::Init(_) => "pose detection unavailable",
            PipelineError::Decode(_) => "failed to process video",
            PipelineError::Cancelled => "processing cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("no frames loaded")]
    Empty,

    #[error("frame index {index} out of range for {len} frames")]
    IndexOutOfRange { index: usize, len: usize },
}
