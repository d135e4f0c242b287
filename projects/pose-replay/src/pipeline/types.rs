use crate::pose::LandmarkSet;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, RgbImage};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

pub const STAGE_SAMPLE: &str = "sample";
pub const STAGE_DETECT: &str = "detect";

const THUMBNAIL_JPEG_QUALITY: u8 = 80;

/// Downscaled still kept alongside a record for scrubbing.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameImage {
    pub width: u32,
    pub height: u32,
    pub jpeg: Arc<[u8]>,
}

impl FrameImage {
    /// Encodes `image` scaled to `max_width`, never upscaling. `None` when
    /// `max_width` is 0 or encoding fails.
    pub fn encode_thumbnail(image: &RgbImage, max_width: u32) -> Option<Self> {
        if max_width == 0 || image.width() == 0 || image.height() == 0 {
            return None;
        }

        let scaled;
        let source = if image.width() > max_width {
            let height = ((image.height() as f64 * max_width as f64 / image.width() as f64)
                .round() as u32)
                .max(1);
            scaled = imageops::resize(image, max_width, height, imageops::FilterType::Triangle);
            &scaled
        } else {
            image
        };

        let mut jpeg = Vec::new();
        if let Err(e) = JpegEncoder::new_with_quality(&mut jpeg, THUMBNAIL_JPEG_QUALITY)
            .encode_image(source)
        {
            tracing::warn!("Failed to encode frame thumbnail: {}", e);
            return None;
        }

        Some(Self {
            width: source.width(),
            height: source.height(),
            jpeg: jpeg.into(),
        })
    }
}

/// One sampled instant with a detected pose.
#[derive(Debug, Clone, Serialize)]
pub struct FrameRecord {
    /// Milliseconds from the start of the video.
    pub timestamp_ms: u64,
    #[serde(skip)]
    pub frame_image: Option<FrameImage>,
    pub landmarks: LandmarkSet,
}

impl FrameRecord {
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp_ms as f64 / 1000.0
    }

    pub fn has_image(&self) -> bool {
        self.frame_image.is_some()
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct StageProgress {
    pub current: usize,
    pub total: usize,
    pub ms_per_frame: f64,
}

/// Processing state shared between the pipeline thread and the HTTP handlers
#[derive(Debug)]
pub struct ProcessingState {
    pub job_id: u64,
    pub video: String,
    /// Planned samples; known once the video is opened.
    pub total_samples: AtomicUsize,
    /// Cleared to cancel the job.
    pub is_active: AtomicBool,
    pub is_complete: AtomicBool,
    pub error: RwLock<Option<String>>,
    pub stages: RwLock<BTreeMap<String, StageProgress>>,
    /// Samples in which a pose was found
    pub detected: AtomicUsize,
    pub started_at: DateTime<Utc>,
}

impl ProcessingState {
    pub fn new(job_id: u64, video: String) -> Self {
        let mut stages = BTreeMap::new();
        for stage in [STAGE_SAMPLE, STAGE_DETECT] {
            stages.insert(
                stage.to_string(),
                StageProgress {
                    current: 0,
                    total: 0,
                    ms_per_frame: 0.0,
                },
            );
        }

        Self {
            job_id,
            video,
            total_samples: AtomicUsize::new(0),
            is_active: AtomicBool::new(true),
            is_complete: AtomicBool::new(false),
            error: RwLock::new(None),
            stages: RwLock::new(stages),
            detected: AtomicUsize::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn set_total(&self, total: usize) {
        self.total_samples.store(total, Ordering::Relaxed);
        if let Ok(mut stages) = self.stages.write() {
            for progress in stages.values_mut() {
                progress.total = total;
            }
        }
    }

    pub fn update_stage(&self, stage: &str, current: usize, ms_per_frame: f64) {
        if let Ok(mut stages) = self.stages.write() {
            if let Some(progress) = stages.get_mut(stage) {
                progress.current = current;
                // Simple exponential moving average for smoothing durations
                if progress.ms_per_frame == 0.0 {
                    progress.ms_per_frame = ms_per_frame;
                } else {
                    progress.ms_per_frame = progress.ms_per_frame * 0.9 + ms_per_frame * 0.1;
                }
            }
        }
    }

    pub fn record_detection(&self) {
        self.detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cancel(&self) {
        self.is_active.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        !self.is_active.load(Ordering::SeqCst)
    }

    /// Marks the job finished, successfully or with `error`.
    pub fn finish(&self, error: Option<String>) {
        if let Ok(mut slot) = self.error.write() {
            *slot = error;
        }
        self.is_complete.store(true, Ordering::SeqCst);
        self.is_active.store(false, Ordering::SeqCst);
    }

    pub fn to_progress_json(&self) -> serde_json::Value {
        let stages = self
            .stages
            .read()
            .map(|s| s.clone())
            .unwrap_or_default();
        let error = self.error.read().ok().and_then(|e| e.clone());

        let elapsed = (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0;
        let sampled = stages.get(STAGE_SAMPLE).map(|s| s.current).unwrap_or(0);
        let effective_fps = if elapsed > 0.0 {
            sampled as f64 / elapsed
        } else {
            0.0
        };

        // Convert stages to JSON with extra 'fps' field
        let stages_json: BTreeMap<String, serde_json::Value> = stages
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    serde_json::json!({
                        "current": v.current,
                        "total": v.total,
                        "ms_per_frame": v.ms_per_frame,
                        "fps": if v.ms_per_frame > 0.0 { 1000.0 / v.ms_per_frame } else { 0.0 }
                    }),
                )
            })
            .collect();

        serde_json::json!({
            "job_id": self.job_id,
            "video": self.video,
            "total_samples": self.total_samples.load(Ordering::Relaxed),
            "detected": self.detected.load(Ordering::Relaxed),
            "is_active": self.is_active.load(Ordering::Relaxed),
            "is_complete": self.is_complete.load(Ordering::Relaxed),
            "error": error,
            "stages": stages_json,
            "started_at": self.started_at.to_rfc3339(),
            "effective_fps": effective_fps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_scales_down_only() {
        let big = RgbImage::new(640, 360);
        let thumb = FrameImage::encode_thumbnail(&big, 160).unwrap();
        assert_eq!((thumb.width, thumb.height), (160, 90));
        assert_eq!(&thumb.jpeg[..2], &[0xFF, 0xD8]);

        let small = RgbImage::new(100, 50);
        let thumb = FrameImage::encode_thumbnail(&small, 160).unwrap();
        assert_eq!((thumb.width, thumb.height), (100, 50));
    }

    #[test]
    fn test_thumbnail_disabled() {
        let image = RgbImage::new(64, 64);
        assert!(FrameImage::encode_thumbnail(&image, 0).is_none());
    }

    #[test]
    fn test_stage_ema() {
        let state = ProcessingState::new(1, "clip.mp4".to_string());
        state.set_total(20);
        state.update_stage(STAGE_DETECT, 1, 10.0);
        state.update_stage(STAGE_DETECT, 2, 20.0);

        let json = state.to_progress_json();
        assert_eq!(json["stages"]["detect"]["current"], 2);
        assert_eq!(json["stages"]["detect"]["total"], 20);
        assert!((json["stages"]["detect"]["ms_per_frame"].as_f64().unwrap() - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_cancel_and_finish() {
        let state = ProcessingState::new(3, "clip.mp4".to_string());
        assert!(!state.is_cancelled());
        state.cancel();
        assert!(state.is_cancelled());

        state.finish(Some("failed to process video".to_string()));
        let json = state.to_progress_json();
        assert_eq!(json["is_complete"], true);
        assert_eq!(json["error"], "failed to process video");
        assert_eq!(json["job_id"], 3);
    }
}
