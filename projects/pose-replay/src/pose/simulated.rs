// Detectors that need no model: a null backend for environments without a
// pose capability, and a synthetic figure for demos and tests.

use super::{LandmarkName, LandmarkSet, PoseDetector};
use crate::error::{DetectError, InitError};
use image::RgbImage;

/// Always reports "no pose".
pub struct NullDetector;

impl PoseDetector for NullDetector {
    fn name(&self) -> &'static str {
        "null"
    }

    fn initialize(&mut self) -> Result<(), InitError> {
        tracing::warn!("Pose detection is not available; every frame will report no pose");
        Ok(())
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Option<LandmarkSet>, DetectError> {
        Ok(None)
    }
}

/// Produces a standing figure that sways and swings its arms a little more on
/// every call. Output only depends on how many frames were seen.
pub struct SimulatedDetector {
    frames_seen: u64,
}

impl SimulatedDetector {
    pub fn new() -> Self {
        Self { frames_seen: 0 }
    }
}

impl Default for SimulatedDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseDetector for SimulatedDetector {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn initialize(&mut self) -> Result<(), InitError> {
        Ok(())
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Option<LandmarkSet>, DetectError> {
        let phase = self.frames_seen as f32 * 0.2;
        self.frames_seen += 1;
        Ok(Some(synthetic_pose(phase)))
    }
}

/// Front-facing rest pose, normalized to the frame. The subject's left side
/// appears on the right half of the image.
fn rest_position(name: LandmarkName) -> (f32, f32) {
    use LandmarkName::*;
    match name {
        Nose => (0.500, 0.200),
        LeftEyeInner => (0.510, 0.185),
        LeftEye => (0.520, 0.185),
        LeftEyeOuter => (0.530, 0.185),
        RightEyeInner => (0.490, 0.185),
        RightEye => (0.480, 0.185),
        RightEyeOuter => (0.470, 0.185),
        LeftEar => (0.545, 0.195),
        RightEar => (0.455, 0.195),
        MouthLeft => (0.515, 0.225),
        MouthRight => (0.485, 0.225),
        LeftShoulder => (0.580, 0.300),
        RightShoulder => (0.420, 0.300),
        LeftElbow => (0.620, 0.420),
        RightElbow => (0.380, 0.420),
        LeftWrist => (0.640, 0.530),
        RightWrist => (0.360, 0.530),
        LeftPinky => (0.645, 0.560),
        RightPinky => (0.355, 0.560),
        LeftIndex => (0.640, 0.565),
        RightIndex => (0.360, 0.565),
        LeftThumb => (0.630, 0.550),
        RightThumb => (0.370, 0.550),
        LeftHip => (0.555, 0.550),
        RightHip => (0.445, 0.550),
        LeftKnee => (0.560, 0.700),
        RightKnee => (0.440, 0.700),
        LeftAnkle => (0.565, 0.850),
        RightAnkle => (0.435, 0.850),
        LeftHeel => (0.560, 0.870),
        RightHeel => (0.440, 0.870),
        LeftFootIndex => (0.580, 0.890),
        RightFootIndex => (0.420, 0.890),
    }
}

fn is_arm(name: LandmarkName) -> bool {
    use LandmarkName::*;
    matches!(
        name,
        LeftElbow
            | RightElbow
            | LeftWrist
            | RightWrist
            | LeftPinky
            | RightPinky
            | LeftIndex
            | RightIndex
            | LeftThumb
            | RightThumb
    )
}

pub(crate) fn synthetic_pose(phase: f32) -> LandmarkSet {
    let sway = 0.03 * phase.sin();
    let swing = 0.04 * (phase * 1.5).sin();

    LandmarkSet::from_fn(|name| {
        let (mut x, mut y) = rest_position(name);
        x += sway;
        if is_arm(name) {
            // arms swing in opposition
            match name.side() {
                super::BodySide::Left => y -= swing,
                _ => y += swing,
            }
        }
        let z = 0.05 * (phase + name.index() as f32 * 0.3).cos();
        let visibility = 0.9 + 0.1 * (phase + name.index() as f32).sin().abs();
        (x.clamp(0.0, 1.0), y.clamp(0.0, 1.0), z, visibility.min(1.0))
    })
}
