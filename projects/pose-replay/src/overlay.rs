//! Overlay projection: places normalized landmarks on a pixel viewport.
//!
//! Placement uses only `x` and `y`; depth and visibility are carried through
//! untouched by the rest of the pipeline but play no part here. Markers come
//! out in the fixed anatomical order of the input set.

use crate::pose::{BodySide, LandmarkName, LandmarkSet};
use serde::Serialize;

pub const DEFAULT_MARKER_RADIUS: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerColor {
    Red,
    Blue,
    Green,
    Yellow,
}

impl MarkerColor {
    pub fn hex(self) -> &'static str {
        match self {
            MarkerColor::Red => "#ff0000",
            MarkerColor::Blue => "#0000ff",
            MarkerColor::Green => "#00ff00",
            MarkerColor::Yellow => "#ffff00",
        }
    }
}

/// Left side red, right side blue, central face points green, anything
/// else yellow.
pub fn landmark_color(name: LandmarkName) -> MarkerColor {
    match name.side() {
        BodySide::Left => MarkerColor::Red,
        BodySide::Right => MarkerColor::Blue,
        BodySide::Center if name.is_face() => MarkerColor::Green,
        BodySide::Center => MarkerColor::Yellow,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub name: LandmarkName,
    pub pixel_x: f32,
    pub pixel_y: f32,
    /// Top-left corner of a dot of `radius` centred on the joint.
    pub left: f32,
    pub top: f32,
    pub radius: f32,
    pub color: MarkerColor,
    /// CSS color for `color`
    pub hex: &'static str,
}

pub fn project(landmarks: &LandmarkSet, viewport_width: f32, viewport_height: f32) -> Vec<Marker> {
    project_with_radius(landmarks, viewport_width, viewport_height, DEFAULT_MARKER_RADIUS)
}

pub fn project_with_radius(
    landmarks: &LandmarkSet,
    viewport_width: f32,
    viewport_height: f32,
    radius: f32,
) -> Vec<Marker> {
    landmarks
        .iter()
        .map(|landmark| {
            let pixel_x = landmark.x * viewport_width;
            let pixel_y = landmark.y * viewport_height;
            let color = landmark_color(landmark.name);
            Marker {
                name: landmark.name,
                pixel_x,
                pixel_y,
                left: pixel_x - radius,
                top: pixel_y - radius,
                radius,
                color,
                hex: color.hex(),
            }
        })
        .collect()
}

/// Limb segments of the full-body topology.
pub const SKELETON_CONNECTIONS: [(LandmarkName, LandmarkName); 35] = {
    use LandmarkName::*;
    [
        (Nose, LeftEyeInner),
        (LeftEyeInner, LeftEye),
        (LeftEye, LeftEyeOuter),
        (LeftEyeOuter, LeftEar),
        (Nose, RightEyeInner),
        (RightEyeInner, RightEye),
        (RightEye, RightEyeOuter),
        (RightEyeOuter, RightEar),
        (MouthLeft, MouthRight),
        (LeftShoulder, RightShoulder),
        (LeftShoulder, LeftElbow),
        (LeftElbow, LeftWrist),
        (LeftWrist, LeftPinky),
        (LeftWrist, LeftIndex),
        (LeftWrist, LeftThumb),
        (LeftPinky, LeftIndex),
        (RightShoulder, RightElbow),
        (RightElbow, RightWrist),
        (RightWrist, RightPinky),
        (RightWrist, RightIndex),
        (RightWrist, RightThumb),
        (RightPinky, RightIndex),
        (LeftShoulder, LeftHip),
        (RightShoulder, RightHip),
        (LeftHip, RightHip),
        (LeftHip, LeftKnee),
        (RightHip, RightKnee),
        (LeftKnee, LeftAnkle),
        (RightKnee, RightAnkle),
        (LeftAnkle, LeftHeel),
        (RightAnkle, RightHeel),
        (LeftHeel, LeftFootIndex),
        (RightHeel, RightFootIndex),
        (LeftAnkle, LeftFootIndex),
        (RightAnkle, RightFootIndex),
    ]
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bone {
    pub from: LandmarkName,
    pub to: LandmarkName,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub width: f32,
    pub height: f32,
    pub markers: Vec<Marker>,
    pub bones: Vec<Bone>,
}

/// Markers plus skeleton segments for one landmark set.
pub fn project_overlay(landmarks: &LandmarkSet, viewport_width: f32, viewport_height: f32) -> Overlay {
    let markers = project(landmarks, viewport_width, viewport_height);
    let bones = SKELETON_CONNECTIONS
        .iter()
        .map(|&(from, to)| {
            // markers are in anatomical order, so the name index is the slot
            let a = &markers[from.index()];
            let b = &markers[to.index()];
            Bone {
                from,
                to,
                x1: a.pixel_x,
                y1: a.pixel_y,
                x2: b.pixel_x,
                y2: b.pixel_y,
            }
        })
        .collect();

    Overlay {
        width: viewport_width,
        height: viewport_height,
        markers,
        bones,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::simulated::synthetic_pose;

    #[test]
    fn test_every_name_has_a_color() {
        for name in LandmarkName::ALL {
            let color = landmark_color(name);
            assert!(color.hex().starts_with('#'), "{}", name);
        }
    }

    #[test]
    fn test_color_rules() {
        assert_eq!(landmark_color(LandmarkName::Nose), MarkerColor::Green);
        assert_eq!(landmark_color(LandmarkName::LeftEye), MarkerColor::Red);
        assert_eq!(landmark_color(LandmarkName::RightEar), MarkerColor::Blue);
        assert_eq!(landmark_color(LandmarkName::MouthLeft), MarkerColor::Red);
        assert_eq!(landmark_color(LandmarkName::MouthRight), MarkerColor::Blue);
        assert_eq!(landmark_color(LandmarkName::LeftFootIndex), MarkerColor::Red);
        assert_eq!(landmark_color(LandmarkName::RightKnee), MarkerColor::Blue);
    }

    #[test]
    fn test_project_scales_and_keeps_order() {
        let set = LandmarkSet::from_fn(|name| {
            let t = name.index() as f32 / 32.0;
            (t, 1.0 - t, 0.3, 0.1)
        });
        let markers = project(&set, 640.0, 480.0);

        assert_eq!(markers.len(), 33);
        for (marker, name) in markers.iter().zip(LandmarkName::ALL) {
            assert_eq!(marker.name, name);
        }
        let last = &markers[32];
        assert!((last.pixel_x - 640.0).abs() < 1e-3);
        assert!(last.pixel_y.abs() < 1e-3);
        assert_eq!(markers[0].pixel_x, 0.0);
        assert_eq!(markers[0].pixel_y, 480.0);
        assert_eq!(markers[0].left, -5.0);
        assert_eq!(markers[0].top, 475.0);
        assert_eq!(markers[0].color, MarkerColor::Green);
        assert_eq!(markers[0].hex, "#00ff00");
    }

    #[test]
    fn test_overlay_bones_follow_markers() {
        let set = synthetic_pose(0.5);
        let overlay = project_overlay(&set, 320.0, 240.0);
        assert_eq!(overlay.bones.len(), 35);

        let shoulders = &overlay.bones[9];
        assert_eq!(shoulders.from, LandmarkName::LeftShoulder);
        let left = set.get(LandmarkName::LeftShoulder);
        assert!((shoulders.x1 - left.x * 320.0).abs() < 1e-3);
        assert!((shoulders.y1 - left.y * 240.0).abs() < 1e-3);
    }
}
