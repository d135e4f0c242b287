use super::{VideoInfo, VideoSource};
use crate::error::VideoDecodeError;
use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::Path;

// Re-export the raw FFI types we need
use ffmpeg_next::ffi;

/// Targets closer than this ahead of the last decoded frame are reached by
/// decoding forward instead of seeking.
const FORWARD_DECODE_WINDOW_SECS: f64 = 2.0;

/// Video reader backed by FFmpeg via ffmpeg-next.
/// Decodes on the CPU and converts every returned frame to RGB24.
pub struct FfmpegReader {
    input_ctx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::codec::decoder::Video,
    video_stream_index: usize,
    /// Lazily created on first frame (source format is only known then).
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    info: VideoInfo,
    /// Seconds per stream timestamp unit.
    time_base: f64,
    /// Presentation time of the last frame handed out, in seconds.
    last_decoded_secs: Option<f64>,
    /// Persistent packet object to avoid allocations.
    reuse_packet: ffmpeg_next::codec::packet::Packet,
    /// Whether we've sent EOF to the decoder.
    eof_sent: bool,
}

// SAFETY: FfmpegReader is only ever used from the single pipeline thread that
// owns it. The raw pointers inside ffmpeg-next types are not shared across threads.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new(source: &Path) -> Result<Self> {
        ffmpeg_next::init().context("Failed to initialize FFmpeg")?;

        if !source.exists() {
            return Err(anyhow!("Video file not found: {}", source.display()));
        }

        let input_ctx = ffmpeg_next::format::input(&source).context("Failed to open video file")?;

        let video_stream = input_ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| anyhow!("No video stream found in {}", source.display()))?;

        let video_stream_index = video_stream.index();

        let rational_fps = video_stream.avg_frame_rate();
        let fps = if rational_fps.denominator() > 0 && rational_fps.numerator() > 0 {
            rational_fps.numerator() as f64 / rational_fps.denominator() as f64
        } else {
            tracing::warn!("FfmpegReader: could not determine FPS, defaulting to 30.0");
            30.0
        };

        let tb = video_stream.time_base();
        let time_base = if tb.denominator() > 0 {
            tb.numerator() as f64 / tb.denominator() as f64
        } else {
            1.0 / ffi::AV_TIME_BASE as f64
        };

        let stream_duration = video_stream.duration();
        let duration_secs = if stream_duration > 0 {
            stream_duration as f64 * time_base
        } else {
            input_ctx.duration() as f64 / ffi::AV_TIME_BASE as f64
        };

        let decoder_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())
                .context("Failed to create decoder context")?;
        let decoder = decoder_ctx
            .decoder()
            .video()
            .context("Failed to open video decoder")?;

        let info = VideoInfo {
            duration_secs,
            width: decoder.width(),
            height: decoder.height(),
            fps,
        };

        tracing::info!(
            "FfmpegReader: opened {}, duration={:.2}s, fps={:.2}, size={}x{}",
            source.display(),
            info.duration_secs,
            info.fps,
            info.width,
            info.height
        );

        Ok(Self {
            input_ctx,
            decoder,
            video_stream_index,
            scaler: None,
            info,
            time_base,
            last_decoded_secs: None,
            reuse_packet: ffmpeg_next::codec::packet::Packet::empty(),
            eof_sent: false,
        })
    }

    /// Jump to the keyframe at or before `timestamp_secs` and reset the decoder.
    fn seek_to(&mut self, timestamp_secs: f64) -> Result<()> {
        let timestamp = (timestamp_secs * ffi::AV_TIME_BASE as f64) as i64;
        self.input_ctx
            .seek(timestamp, ..timestamp)
            .context("Failed to seek")?;
        self.decoder.flush();
        self.eof_sent = false;
        self.scaler = None; // reset scaler on seek (format might change)
        self.last_decoded_secs = None;
        Ok(())
    }

    /// Internal logic to retrieve the next decoded frame from the stream.
    fn decode_loop(&mut self, target_frame: &mut ffmpeg_next::util::frame::Video) -> Result<()> {
        loop {
            // 1. Try to receive a decoded frame
            match self.decoder.receive_frame(target_frame) {
                Ok(()) => return Ok(()),
                Err(ffmpeg_next::Error::Other { errno: ffi::EAGAIN }) => {
                    if self.eof_sent {
                        return Err(anyhow!("End of stream"));
                    }
                }
                Err(ffmpeg_next::Error::Eof) => {
                    return Err(anyhow!("End of stream"));
                }
                Err(e) => return Err(anyhow!("Decoder error: {}", e)),
            }

            // 2. Feed packets until we find a video packet OR reach EOF
            let mut found_packet = false;
            while self.reuse_packet.read(&mut self.input_ctx).is_ok() {
                if self.reuse_packet.stream() == self.video_stream_index {
                    self.decoder
                        .send_packet(&self.reuse_packet)
                        .context("Failed to send packet to decoder")?;
                    found_packet = true;
                    break;
                }
            }

            if !found_packet {
                // EOF reached in input file; flush the decoder
                self.decoder
                    .send_eof()
                    .context("Failed to send EOF to decoder")?;
                self.eof_sent = true;
            }
        }
    }

    fn frame_secs(&self, frame: &ffmpeg_next::util::frame::Video) -> Option<f64> {
        frame
            .timestamp()
            .or_else(|| frame.pts())
            .map(|pts| pts as f64 * self.time_base)
    }

    /// Decode forward until the first frame presented at or after the target.
    /// At end of stream the last decoded frame stands in as the nearest one.
    fn decode_at(&mut self, timestamp_secs: f64) -> Result<RgbImage> {
        let needs_seek = match self.last_decoded_secs {
            Some(last) => {
                timestamp_secs <= last || timestamp_secs - last > FORWARD_DECODE_WINDOW_SECS
            }
            None => true,
        };
        if needs_seek {
            self.seek_to(timestamp_secs)?;
        }

        let mut candidate: Option<ffmpeg_next::util::frame::Video> = None;
        loop {
            let mut frame = ffmpeg_next::util::frame::Video::empty();
            match self.decode_loop(&mut frame) {
                Ok(()) => {
                    let secs = self.frame_secs(&frame);
                    // half a source frame of slack for rounded timestamps
                    let slack = 0.5 / self.info.fps;
                    let reached = secs.map_or(true, |s| s + slack >= timestamp_secs);
                    if let Some(s) = secs {
                        self.last_decoded_secs = Some(s);
                    }
                    candidate = Some(frame);
                    if reached {
                        break;
                    }
                }
                Err(e) => {
                    if candidate.is_some() {
                        break;
                    }
                    return Err(e);
                }
            }
        }

        let frame = candidate.ok_or_else(|| anyhow!("No frame decoded"))?;
        self.frame_to_rgb(&frame)
    }

    fn get_or_create_scaler(
        &mut self,
        src_format: ffmpeg_next::format::Pixel,
        width: u32,
        height: u32,
    ) -> Result<&mut ffmpeg_next::software::scaling::Context> {
        if self.scaler.is_none() {
            let scaler = ffmpeg_next::software::scaling::Context::get(
                src_format,
                width,
                height,
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )
            .context("Failed to create scaler")?;
            self.scaler = Some(scaler);
        }
        self.scaler
            .as_mut()
            .ok_or_else(|| anyhow!("Scaler unavailable"))
    }

    fn frame_to_rgb(&mut self, frame: &ffmpeg_next::util::frame::Video) -> Result<RgbImage> {
        let (width, height) = (frame.width(), frame.height());
        let scaler = self.get_or_create_scaler(frame.format(), width, height)?;
        let mut rgb_frame = ffmpeg_next::util::frame::Video::empty();
        scaler
            .run(frame, &mut rgb_frame)
            .context("Scaler failed")?;
        rgb_frame_to_image(&rgb_frame)
    }
}

/// Copy an RGB24 ffmpeg frame into an owned image, dropping row padding.
fn rgb_frame_to_image(frame: &ffmpeg_next::util::frame::Video) -> Result<RgbImage> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let data = frame.data(0);
    let stride = frame.stride(0);
    let row_bytes = width * 3;

    let mut buffer = Vec::with_capacity(row_bytes * height);
    for y in 0..height {
        let start = y * stride;
        buffer.extend_from_slice(&data[start..start + row_bytes]);
    }

    RgbImage::from_raw(width as u32, height as u32, buffer)
        .ok_or_else(|| anyhow!("Failed to create image from RGB24 frame"))
}

impl VideoSource for FfmpegReader {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn decode_frame_near(&mut self, timestamp_secs: f64) -> Result<RgbImage, VideoDecodeError> {
        self.decode_at(timestamp_secs)
            .map_err(|e| VideoDecodeError::Frame {
                timestamp_secs,
                reason: format!("{:#}", e),
            })
    }
}
