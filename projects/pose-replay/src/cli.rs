use crate::pipeline::{AssemblerConfig, PipelineRequest};
use crate::pose::{DetectorConfig, DetectorKind};
use crate::session::PipelineSettings;
use crate::video::VideoBackend;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Above this, millisecond timestamps of consecutive samples could collide.
const MAX_SAMPLE_RATE: f64 = 1000.0;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the replay API
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,

        /// Port to bind to
        #[arg(long, default_value_t = 12206)]
        port: u16,

        /// Root directory for video files
        #[arg(long, env = "POSE_REPLAY_VIDEO_ROOT")]
        video_root: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Extract poses from one video and print a JSON summary
    Extract {
        video: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PipelineArgs {
    /// Video decoding backend
    #[arg(long, value_enum, default_value = "ffmpeg")]
    pub backend: VideoBackend,

    /// Samples drawn per second of video
    #[arg(long, default_value_t = 10.0, value_parser = parse_sample_rate)]
    pub sample_rate: f64,

    /// Pose detector variant
    #[arg(long, value_enum, default_value = "onnx")]
    pub detector: DetectorKind,

    /// Pose landmark model (.onnx)
    #[arg(long, env = "POSE_REPLAY_MODEL")]
    pub model_path: Option<PathBuf>,

    /// Base URL of a remote pose service
    #[arg(long, env = "POSE_REPLAY_REMOTE_URL")]
    pub remote_url: Option<String>,

    /// Minimum pose presence score for a detection
    #[arg(long, default_value_t = 0.5)]
    pub min_pose_confidence: f32,

    /// Width of the thumbnail kept per frame, 0 to keep none
    #[arg(long, default_value_t = 160)]
    pub thumbnail_width: u32,
}

fn parse_sample_rate(s: &str) -> Result<f64, String> {
    let rate: f64 = s.parse().map_err(|e| format!("invalid number: {}", e))?;
    if !rate.is_finite() || rate <= 0.0 {
        return Err("sample rate must be greater than 0".to_string());
    }
    if rate > MAX_SAMPLE_RATE {
        return Err(format!("sample rate must be at most {}", MAX_SAMPLE_RATE));
    }
    Ok(rate)
}

impl PipelineArgs {
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            backend: self.backend,
            detector: DetectorConfig {
                kind: self.detector,
                model_path: self.model_path.clone(),
                remote_url: self.remote_url.clone(),
                min_pose_confidence: self.min_pose_confidence,
            },
            assembler: AssemblerConfig {
                sample_rate: self.sample_rate,
                thumbnail_width: self.thumbnail_width,
            },
        }
    }

    pub fn request(&self, video_path: PathBuf) -> PipelineRequest {
        let settings = self.settings();
        PipelineRequest {
            video_path,
            backend: settings.backend,
            detector: settings.detector,
            assembler: settings.assembler,
        }
    }
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
