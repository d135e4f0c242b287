// Pose detector backed by an HTTP service.
//
// GET  {base}/health  -> any 2xx means ready
// POST {base}/detect  (image/jpeg body) -> {"landmarks": null | [33 points]}

use super::{Landmark, LandmarkName, LandmarkSet, PoseDetector, LANDMARK_COUNT};
use crate::error::{DetectError, InitError};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub landmarks: Option<Vec<RemoteLandmark>>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteLandmark {
    #[serde(default)]
    pub name: Option<String>,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(default = "default_visibility")]
    pub visibility: f32,
}

fn default_visibility() -> f32 {
    1.0
}

pub struct RemotePoseDetector {
    base_url: String,
    client: Option<Client>,
}

impl RemotePoseDetector {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: None,
        }
    }
}

impl PoseDetector for RemotePoseDetector {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn initialize(&mut self) -> Result<(), InitError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InitError::Unreachable(e.to_string()))?;

        let url = format!("{}/health", self.base_url);
        let response = client
            .get(&url)
            .send()
            .map_err(|e| InitError::Unreachable(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(InitError::Unreachable(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        tracing::info!("RemotePoseDetector: service at {} is healthy", self.base_url);
        self.client = Some(client);
        Ok(())
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>, DetectError> {
        let client = self.client.as_ref().ok_or(DetectError::NotInitialized)?;

        let mut body = Vec::new();
        JpegEncoder::new_with_quality(&mut body, JPEG_QUALITY)
            .encode_image(image)
            .map_err(|e| DetectError::Transient(format!("jpeg encode: {}", e)))?;

        let response = client
            .post(format!("{}/detect", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    DetectError::Unavailable(e.to_string())
                } else {
                    DetectError::Transient(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(DetectError::Unavailable(format!("service returned {}", status)));
        }
        if !status.is_success() {
            return Err(DetectError::Transient(format!("service returned {}", status)));
        }

        let payload: DetectResponse = response
            .json()
            .map_err(|e| DetectError::Transient(format!("malformed response: {}", e)))?;

        landmarks_from_response(payload)
    }
}

/// Validates a service response. Anything short of a full, ordered set is a
/// per-frame miss.
pub fn landmarks_from_response(
    payload: DetectResponse,
) -> Result<Option<LandmarkSet>, DetectError> {
    let points = match payload.landmarks {
        None => return Ok(None),
        Some(points) if points.is_empty() => return Ok(None),
        Some(points) => points,
    };

    if points.len() != LANDMARK_COUNT {
        return Err(DetectError::Transient(format!(
            "partial landmark set: {} points",
            points.len()
        )));
    }

    let mut landmarks = Vec::with_capacity(LANDMARK_COUNT);
    for (point, expected) in points.into_iter().zip(LandmarkName::ALL) {
        let name = match point.name.as_deref() {
            None => expected,
            Some(raw) => LandmarkName::parse(raw).ok_or_else(|| {
                DetectError::Transient(format!("unknown landmark name '{}'", raw))
            })?,
        };
        landmarks.push(Landmark {
            name,
            x: point.x,
            y: point.y,
            z: point.z,
            visibility: point.visibility,
        });
    }

    LandmarkSet::from_vec(landmarks)
        .map(Some)
        .map_err(|e| DetectError::Transient(e.to_string()))
}
