// Landmark definitions for the 33-point full-body pose topology.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const LANDMARK_COUNT: usize = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkName {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodySide {
    Left,
    Right,
    Center,
}

impl LandmarkName {
    /// Fixed anatomical order. Index `i` here is index `i` in every `LandmarkSet`.
    pub const ALL: [LandmarkName; LANDMARK_COUNT] = [
        Self::Nose,
        Self::LeftEyeInner,
        Self::LeftEye,
        Self::LeftEyeOuter,
        Self::RightEyeInner,
        Self::RightEye,
        Self::RightEyeOuter,
        Self::LeftEar,
        Self::RightEar,
        Self::MouthLeft,
        Self::MouthRight,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftPinky,
        Self::RightPinky,
        Self::LeftIndex,
        Self::RightIndex,
        Self::LeftThumb,
        Self::RightThumb,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
        Self::LeftHeel,
        Self::RightHeel,
        Self::LeftFootIndex,
        Self::RightFootIndex,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEyeInner => "left_eye_inner",
            Self::LeftEye => "left_eye",
            Self::LeftEyeOuter => "left_eye_outer",
            Self::RightEyeInner => "right_eye_inner",
            Self::RightEye => "right_eye",
            Self::RightEyeOuter => "right_eye_outer",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::MouthLeft => "mouth_left",
            Self::MouthRight => "mouth_right",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftPinky => "left_pinky",
            Self::RightPinky => "right_pinky",
            Self::LeftIndex => "left_index",
            Self::RightIndex => "right_index",
            Self::LeftThumb => "left_thumb",
            Self::RightThumb => "right_thumb",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
            Self::LeftHeel => "left_heel",
            Self::RightHeel => "right_heel",
            Self::LeftFootIndex => "left_foot_index",
            Self::RightFootIndex => "right_foot_index",
        }
    }

    /// Accepts both `left_eye` and `LEFT_EYE` spellings.
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|n| n.as_str() == lower)
    }

    pub fn side(self) -> BodySide {
        match self {
            Self::MouthLeft => BodySide::Left,
            Self::MouthRight => BodySide::Right,
            _ => {
                let name = self.as_str();
                if name.starts_with("left_") {
                    BodySide::Left
                } else if name.starts_with("right_") {
                    BodySide::Right
                } else {
                    BodySide::Center
                }
            }
        }
    }

    /// Nose, eyes and ears.
    pub fn is_face(self) -> bool {
        let name = self.as_str();
        name == "nose" || name.contains("eye") || name.contains("ear")
    }
}

impl fmt::Display for LandmarkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked body point. `x`/`y` are normalized to the source frame,
/// `z` is relative depth and `visibility` a confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub name: LandmarkName,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LandmarkSetError {
    #[error("expected {LANDMARK_COUNT} landmarks, got {0}")]
    WrongCount(usize),

    #[error("landmark {index} is {found}, expected {expected}")]
    OutOfOrder {
        index: usize,
        expected: LandmarkName,
        found: LandmarkName,
    },
}

/// A complete pose: exactly 33 landmarks in `LandmarkName::ALL` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Vec<Landmark>", try_from = "Vec<Landmark>")]
pub struct LandmarkSet {
    points: [Landmark; LANDMARK_COUNT],
}

impl LandmarkSet {
    /// Builds a set by asking for `(x, y, z, visibility)` of each name in order.
    pub fn from_fn<F>(mut f: F) -> Self
    where
        F: FnMut(LandmarkName) -> (f32, f32, f32, f32),
    {
        let points = std::array::from_fn(|i| {
            let name = LandmarkName::ALL[i];
            let (x, y, z, visibility) = f(name);
            Landmark {
                name,
                x,
                y,
                z,
                visibility,
            }
        });
        Self { points }
    }

    pub fn from_vec(landmarks: Vec<Landmark>) -> Result<Self, LandmarkSetError> {
        let points: [Landmark; LANDMARK_COUNT] = landmarks
            .try_into()
            .map_err(|v: Vec<Landmark>| LandmarkSetError::WrongCount(v.len()))?;

        for (index, (point, expected)) in points.iter().zip(LandmarkName::ALL).enumerate() {
            if point.name != expected {
                return Err(LandmarkSetError::OutOfOrder {
                    index,
                    expected,
                    found: point.name,
                });
            }
        }

        Ok(Self { points })
    }

    pub fn get(&self, name: LandmarkName) -> &Landmark {
        &self.points[name.index()]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Landmark> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        LANDMARK_COUNT
    }

    // TODO: once a visibility threshold is agreed on, sets where every point is
    // below it should count as "no pose" instead of a detection.
    pub fn max_visibility(&self) -> f32 {
        self.points
            .iter()
            .map(|p| p.visibility)
            .fold(0.0_f32, f32::max)
    }
}

impl From<LandmarkSet> for Vec<Landmark> {
    fn from(set: LandmarkSet) -> Self {
        set.points.to_vec()
    }
}

impl TryFrom<Vec<Landmark>> for LandmarkSet {
    type Error = LandmarkSetError;

    fn try_from(value: Vec<Landmark>) -> Result<Self, Self::Error> {
        Self::from_vec(value)
    }
}

impl<'a> IntoIterator for &'a LandmarkSet {
    type Item = &'a Landmark;
    type IntoIter = std::slice::Iter<'a, Landmark>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> LandmarkSet {
        LandmarkSet::from_fn(|name| (name.index() as f32 / 40.0, 0.5, 0.01, 0.9))
    }

    #[test]
    fn test_fixed_order_matches_discriminants() {
        for (i, name) in LandmarkName::ALL.iter().enumerate() {
            assert_eq!(name.index(), i);
        }
        assert_eq!(LandmarkName::ALL[0], LandmarkName::Nose);
        assert_eq!(LandmarkName::ALL[32], LandmarkName::RightFootIndex);
    }

    #[test]
    fn test_sides() {
        assert_eq!(LandmarkName::Nose.side(), BodySide::Center);
        assert_eq!(LandmarkName::LeftEyeInner.side(), BodySide::Left);
        assert_eq!(LandmarkName::RightHeel.side(), BodySide::Right);
        assert_eq!(LandmarkName::MouthLeft.side(), BodySide::Left);
        assert_eq!(LandmarkName::MouthRight.side(), BodySide::Right);
    }

    #[test]
    fn test_parse_accepts_upper_case() {
        assert_eq!(
            LandmarkName::parse("LEFT_FOOT_INDEX"),
            Some(LandmarkName::LeftFootIndex)
        );
        assert_eq!(LandmarkName::parse("nose"), Some(LandmarkName::Nose));
        assert_eq!(LandmarkName::parse("tail"), None);
    }

    #[test]
    fn test_from_vec_rejects_partial_sets() {
        let mut points: Vec<Landmark> = sample_set().into();
        points.pop();
        assert_eq!(
            LandmarkSet::from_vec(points),
            Err(LandmarkSetError::WrongCount(32))
        );
    }

    #[test]
    fn test_from_vec_rejects_reordered_sets() {
        let mut points: Vec<Landmark> = sample_set().into();
        points.swap(1, 2);
        assert!(matches!(
            LandmarkSet::from_vec(points),
            Err(LandmarkSetError::OutOfOrder { index: 1, .. })
        ));
    }

    #[test]
    fn test_serde_keeps_all_points() {
        let set = sample_set();
        let json = serde_json::to_string(&set).unwrap();
        let back: LandmarkSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), LANDMARK_COUNT);
        assert_eq!(back, set);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[9]["name"], "mouth_left");
    }
}
