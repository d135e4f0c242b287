// On-device full-body landmark model run through ONNX Runtime.
//
// The model takes a 1x256x256x3 RGB tensor in [0, 1] and produces a flat
// landmark tensor (39 points x 5 values: x, y, z in input pixels, then
// visibility and presence logits) plus a single pose-presence score. Only the
// first 33 points are body landmarks.

use super::{LandmarkSet, PoseDetector, LANDMARK_COUNT};
use crate::error::{DetectError, InitError};
use image::{imageops, Rgb, RgbImage};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::PathBuf;

pub const INPUT_SIZE: u32 = 256;
const VALUES_PER_LANDMARK: usize = 5;
const MIN_LANDMARK_VALUES: usize = LANDMARK_COUNT * VALUES_PER_LANDMARK;

pub struct OnnxPoseDetector {
    model_path: PathBuf,
    min_pose_confidence: f32,
    session: Option<Session>,
}

impl OnnxPoseDetector {
    pub fn new(model_path: PathBuf, min_pose_confidence: f32) -> Self {
        Self {
            model_path,
            min_pose_confidence,
            session: None,
        }
    }
}

impl PoseDetector for OnnxPoseDetector {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn initialize(&mut self) -> Result<(), InitError> {
        if !self.model_path.exists() {
            return Err(InitError::ModelNotFound(
                self.model_path.display().to_string(),
            ));
        }

        let session = Session::builder()
            .map_err(|e| InitError::ModelLoad(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| InitError::ModelLoad(e.to_string()))?
            .commit_from_file(&self.model_path)
            .map_err(|e| InitError::ModelLoad(e.to_string()))?;

        tracing::info!(
            "OnnxPoseDetector: loaded {} ({} inputs, {} outputs)",
            self.model_path.display(),
            session.inputs.len(),
            session.outputs.len()
        );

        self.session = Some(session);
        Ok(())
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>, DetectError> {
        let session = self.session.as_mut().ok_or(DetectError::NotInitialized)?;

        let letterbox = Letterbox::fit(image.width(), image.height(), INPUT_SIZE);
        let input_tensor = preprocess(image, &letterbox);

        let input_name = session
            .inputs
            .first()
            .map_or_else(|| "input_1".to_string(), |i| i.name.clone());

        let input_ref = ort::value::TensorRef::from_array_view(&input_tensor)
            .map_err(|e| DetectError::Transient(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![input_name.as_str() => input_ref])
            .map_err(|e| DetectError::Transient(e.to_string()))?;

        let mut landmarks: Option<Vec<f32>> = None;
        let mut presence: Option<f32> = None;
        for (_, value) in outputs.iter() {
            let Ok((_, data)) = value.try_extract_tensor::<f32>() else {
                continue;
            };
            if data.len() >= MIN_LANDMARK_VALUES && landmarks.is_none() {
                landmarks = Some(data.to_vec());
            } else if data.len() == 1 && presence.is_none() {
                presence = Some(data[0]);
            }
        }

        let landmarks = landmarks.ok_or_else(|| {
            DetectError::Unavailable("model produced no landmark tensor".to_string())
        })?;

        // Models exported without the presence head are trusted as-is.
        let score = presence.map(presence_probability).unwrap_or(1.0);
        if score < self.min_pose_confidence {
            return Ok(None);
        }

        decode_landmarks(&landmarks, &letterbox).map(Some)
    }
}

/// Aspect-preserving fit of a frame into the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub frame_width: u32,
    pub frame_height: u32,
    pub scale: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    pub fn fit(frame_width: u32, frame_height: u32, target: u32) -> Self {
        let w = frame_width.max(1) as f32;
        let h = frame_height.max(1) as f32;
        let scale = (target as f32 / w).min(target as f32 / h);
        let scaled_width = ((w * scale).round() as u32).clamp(1, target);
        let scaled_height = ((h * scale).round() as u32).clamp(1, target);

        Self {
            frame_width: frame_width.max(1),
            frame_height: frame_height.max(1),
            scale,
            scaled_width,
            scaled_height,
            pad_x: (target - scaled_width) as f32 / 2.0,
            pad_y: (target - scaled_height) as f32 / 2.0,
        }
    }

    /// Maps a point in model-input pixels back to frame-normalized `[0, 1]`.
    pub fn to_frame_normalized(&self, px: f32, py: f32) -> (f32, f32) {
        let fx = (px - self.pad_x) / self.scale / self.frame_width as f32;
        let fy = (py - self.pad_y) / self.scale / self.frame_height as f32;
        (fx.clamp(0.0, 1.0), fy.clamp(0.0, 1.0))
    }
}

fn preprocess(image: &RgbImage, letterbox: &Letterbox) -> Array4<f32> {
    let resized = imageops::resize(
        image,
        letterbox.scaled_width,
        letterbox.scaled_height,
        imageops::FilterType::Triangle,
    );

    let mut canvas = RgbImage::from_pixel(INPUT_SIZE, INPUT_SIZE, Rgb([0, 0, 0]));
    imageops::replace(
        &mut canvas,
        &resized,
        letterbox.pad_x as i64,
        letterbox.pad_y as i64,
    );

    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        tensor[[0, y as usize, x as usize, 0]] = f32::from(r) / 255.0;
        tensor[[0, y as usize, x as usize, 1]] = f32::from(g) / 255.0;
        tensor[[0, y as usize, x as usize, 2]] = f32::from(b) / 255.0;
    }
    tensor
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Some exports apply the sigmoid in-graph, some don't.
fn presence_probability(raw: f32) -> f32 {
    if (0.0..=1.0).contains(&raw) {
        raw
    } else {
        sigmoid(raw)
    }
}

fn decode_landmarks(values: &[f32], letterbox: &Letterbox) -> Result<LandmarkSet, DetectError> {
    if values.len() < MIN_LANDMARK_VALUES {
        return Err(DetectError::Transient(format!(
            "landmark tensor too short: {} values",
            values.len()
        )));
    }

    Ok(LandmarkSet::from_fn(|name| {
        let base = name.index() * VALUES_PER_LANDMARK;
        let (x, y) = letterbox.to_frame_normalized(values[base], values[base + 1]);
        // z shares the x scale in input pixels
        let z = values[base + 2] / letterbox.scale / letterbox.frame_width as f32;
        let visibility = sigmoid(values[base + 3]);
        (x, y, z, visibility)
    }))
}
