use super::{VideoInfo, VideoSource};
use crate::error::VideoDecodeError;
use anyhow::{anyhow, Result};
use image::RgbImage;
use opencv::{
    prelude::*,
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
        CAP_PROP_FRAME_WIDTH, CAP_PROP_HW_ACCELERATION, CAP_PROP_POS_FRAMES,
        CAP_PROP_POS_MSEC, VIDEO_ACCELERATION_ANY,
    },
};
use std::path::Path;

pub struct OpencvReader {
    capture: VideoCapture,
    info: VideoInfo,
}

impl OpencvReader {
    pub fn new(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow!("Video file not found: {}", path.display()));
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Video path is not valid UTF-8: {}", path.display()))?;

        let mut capture = VideoCapture::from_file(path_str, CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(anyhow!("Failed to open video file: {}", path.display()));
        }

        // VA-API, VideoToolbox, etc. when the build supports it
        match capture.set(CAP_PROP_HW_ACCELERATION, VIDEO_ACCELERATION_ANY as f64) {
            Ok(true) => tracing::debug!("OpencvReader: hardware acceleration enabled"),
            _ => tracing::debug!("OpencvReader: hardware acceleration not available"),
        }

        let mut fps = capture.get(CAP_PROP_FPS)?;
        if fps <= 0.0 {
            tracing::warn!("OpencvReader: Failed to get FPS from metadata, falling back to 30.0");
            fps = 30.0;
        }
        let raw_count = capture.get(CAP_PROP_FRAME_COUNT)?.max(0.0);
        let info = VideoInfo {
            duration_secs: raw_count / fps,
            width: capture.get(CAP_PROP_FRAME_WIDTH)?.max(0.0) as u32,
            height: capture.get(CAP_PROP_FRAME_HEIGHT)?.max(0.0) as u32,
            fps,
        };

        tracing::info!(
            "OpencvReader: opened {}, duration={:.2}s, fps={:.2}, stream_frames={}",
            path.display(),
            info.duration_secs,
            info.fps,
            raw_count
        );

        Ok(Self { capture, info })
    }

    fn read_at(&mut self, timestamp_secs: f64) -> Result<RgbImage> {
        let target_frame = (timestamp_secs * self.info.fps).round() as i64;
        let current_frame = self.capture.get(CAP_PROP_POS_FRAMES)? as i64;

        if target_frame < current_frame || target_frame - current_frame > self.info.fps as i64 {
            self.capture
                .set(CAP_PROP_POS_MSEC, timestamp_secs * 1000.0)?;
        } else {
            // Skip forward without decoding
            for _ in current_frame..target_frame {
                if !self.capture.grab()? {
                    return Err(anyhow!("Failed to grab frame before {:.3}s", timestamp_secs));
                }
            }
        }

        let mut frame = Mat::default();
        let success = self.capture.read(&mut frame)?;
        if !success || frame.empty() {
            return Err(anyhow!("Failed to read frame"));
        }
        mat_to_rgb_image(&frame)
    }
}

/// Converts a BGR frame into an owned RGB image.
fn mat_to_rgb_image(mat: &Mat) -> Result<RgbImage> {
    let mut rgb_mat = Mat::default();
    opencv::imgproc::cvt_color_def(mat, &mut rgb_mat, opencv::imgproc::COLOR_BGR2RGB)?;

    let size = rgb_mat.size()?;
    if !rgb_mat.is_continuous() {
        return Err(anyhow!("Mat is not continuous"));
    }

    let buffer = rgb_mat.data_bytes()?.to_vec();
    RgbImage::from_raw(size.width as u32, size.height as u32, buffer)
        .ok_or_else(|| anyhow!("Failed to create RgbImage from Mat data"))
}

impl VideoSource for OpencvReader {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn decode_frame_near(&mut self, timestamp_secs: f64) -> Result<RgbImage, VideoDecodeError> {
        self.read_at(timestamp_secs)
            .map_err(|e| VideoDecodeError::Frame {
                timestamp_secs,
                reason: format!("{:#}", e),
            })
    }
}
