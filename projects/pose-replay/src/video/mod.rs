pub mod ffmpeg_reader;
pub mod opencv_reader;
pub mod sampler;

use crate::error::VideoDecodeError;
use image::RgbImage;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VideoInfo {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// An opened, seekable video.
pub trait VideoSource: Send {
    fn info(&self) -> VideoInfo;

    /// Decodes the frame nearest `timestamp_secs`. `VideoDecodeError::Frame`
    /// means only this timestamp failed; any other error means the handle is
    /// no longer usable.
    fn decode_frame_near(&mut self, timestamp_secs: f64) -> Result<RgbImage, VideoDecodeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum VideoBackend {
    Ffmpeg,
    Opencv,
}

pub fn open_video(backend: VideoBackend, path: &Path) -> Result<Box<dyn VideoSource>, VideoDecodeError> {
    let open_error = |e: anyhow::Error| VideoDecodeError::Open {
        path: path.display().to_string(),
        reason: format!("{:#}", e),
    };

    let source: Box<dyn VideoSource> = match backend {
        VideoBackend::Ffmpeg => Box::new(ffmpeg_reader::FfmpegReader::new(path).map_err(open_error)?),
        VideoBackend::Opencv => Box::new(opencv_reader::OpencvReader::new(path).map_err(open_error)?),
    };

    validate_info(path, &source.info())?;
    Ok(source)
}

fn validate_info(path: &Path, info: &VideoInfo) -> Result<(), VideoDecodeError> {
    if !info.duration_secs.is_finite() || info.duration_secs <= 0.0 {
        return Err(VideoDecodeError::Open {
            path: path.display().to_string(),
            reason: format!("unusable duration {}", info.duration_secs),
        });
    }
    if info.width == 0 || info.height == 0 {
        return Err(VideoDecodeError::Open {
            path: path.display().to_string(),
            reason: format!("unusable frame size {}x{}", info.width, info.height),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(duration_secs: f64, width: u32) -> VideoInfo {
        VideoInfo {
            duration_secs,
            width,
            height: 720,
            fps: 30.0,
        }
    }

    #[test]
    fn test_validate_info() {
        let path = Path::new("clip.mp4");
        assert!(validate_info(path, &info(2.0, 1280)).is_ok());
        assert!(validate_info(path, &info(0.0, 1280)).is_err());
        assert!(validate_info(path, &info(f64::NAN, 1280)).is_err());
        assert!(validate_info(path, &info(2.0, 0)).is_err());
    }

    #[test]
    fn test_open_missing_file_is_open_error() {
        let result = open_video(VideoBackend::Ffmpeg, Path::new("/nonexistent/clip.mp4"));
        assert!(matches!(result, Err(VideoDecodeError::Open { .. })));
    }
}
