pub mod adapter;
pub mod landmarks;
pub mod onnx;
pub mod remote;
pub mod simulated;

pub use adapter::PoseAdapter;
pub use landmarks::{BodySide, Landmark, LandmarkName, LandmarkSet, LANDMARK_COUNT};

use crate::error::{DetectError, InitError};
use image::RgbImage;
use std::path::PathBuf;

/// A backend that turns one still image into zero or one landmark sets.
///
/// `&mut self` on `detect` keeps at most one call in flight per instance.
pub trait PoseDetector: Send {
    fn name(&self) -> &'static str;
    fn initialize(&mut self) -> Result<(), InitError>;
    fn detect(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>, DetectError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DetectorKind {
    /// On-device landmark model run through ONNX Runtime
    Onnx,
    /// HTTP pose service
    Remote,
    /// Synthetic figure, no model required
    Simulated,
    /// Never reports a pose
    Null,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub kind: DetectorKind,
    pub model_path: Option<PathBuf>,
    pub remote_url: Option<String>,
    pub min_pose_confidence: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: DetectorKind::Simulated,
            model_path: None,
            remote_url: None,
            min_pose_confidence: 0.5,
        }
    }
}

/// Builds the configured detector. Selection happens once, here; everything
/// downstream only sees `dyn PoseDetector`.
pub fn create_detector(config: &DetectorConfig) -> Result<Box<dyn PoseDetector>, InitError> {
    let detector: Box<dyn PoseDetector> = match config.kind {
        DetectorKind::Onnx => {
            let path = config.model_path.clone().ok_or_else(|| {
                InitError::ModelNotFound("no --model-path configured".to_string())
            })?;
            Box::new(onnx::OnnxPoseDetector::new(path, config.min_pose_confidence))
        }
        DetectorKind::Remote => {
            let url = config.remote_url.clone().ok_or_else(|| {
                InitError::Unreachable("no --remote-url configured".to_string())
            })?;
            Box::new(remote::RemotePoseDetector::new(url))
        }
        DetectorKind::Simulated => Box::new(simulated::SimulatedDetector::new()),
        DetectorKind::Null => Box::new(simulated::NullDetector),
    };

    tracing::info!("Using pose detector: {}", detector.name());
    Ok(detector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_detector_requires_model_path() {
        let config = DetectorConfig {
            kind: DetectorKind::Onnx,
            ..DetectorConfig::default()
        };
        assert!(matches!(
            create_detector(&config),
            Err(InitError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_create_detector_requires_remote_url() {
        let config = DetectorConfig {
            kind: DetectorKind::Remote,
            ..DetectorConfig::default()
        };
        assert!(matches!(
            create_detector(&config),
            Err(InitError::Unreachable(_))
        ));
    }

    #[test]
    fn test_create_simulated_and_null() {
        let simulated = create_detector(&DetectorConfig::default()).unwrap();
        assert_eq!(simulated.name(), "simulated");

        let null = create_detector(&DetectorConfig {
            kind: DetectorKind::Null,
            ..DetectorConfig::default()
        })
        .unwrap();
        assert_eq!(null.name(), "null");
    }
}
