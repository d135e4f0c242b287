use super::VideoSource;
use crate::error::VideoDecodeError;
use image::RgbImage;

pub const DEFAULT_SAMPLE_RATE: f64 = 10.0;

/// Consecutive per-sample decode failures after which the handle is
/// considered broken rather than merely containing bad frames.
pub const MAX_CONSECUTIVE_DECODE_FAILURES: usize = 10;

/// Number of sample instants `i / rate` taken from a video of `duration_secs`.
/// Never more than `floor(duration * rate)`; every instant is `< duration`.
pub fn sample_count(duration_secs: f64, sample_rate: f64) -> usize {
    if !(duration_secs > 0.0) || !(sample_rate > 0.0) {
        return 0;
    }
    let mut count = (duration_secs * sample_rate).floor().min(usize::MAX as f64) as usize;
    while count > 0 && sample_timestamp(count - 1, sample_rate) >= duration_secs {
        count -= 1;
    }
    count
}

pub fn sample_timestamp(index: usize, sample_rate: f64) -> f64 {
    index as f64 / sample_rate
}

pub fn timestamp_ms(index: usize, sample_rate: f64) -> u64 {
    (index as f64 * 1000.0 / sample_rate).round() as u64
}

/// One decoded sample.
#[derive(Debug, Clone)]
pub struct Sample {
    pub index: usize,
    pub timestamp_secs: f64,
    pub timestamp_ms: u64,
    pub image: RgbImage,
}

/// Lazy, single-pass walk over a video at a fixed sampling rate.
///
/// Each `next()` seeks and decodes one frame. A failure at one timestamp is
/// logged and that timestamp skipped; a failure of the handle itself (or too
/// many failures in a row) yields one error and ends the sequence.
pub struct FrameSampler<'a, S: VideoSource + ?Sized> {
    source: &'a mut S,
    sample_rate: f64,
    next_index: usize,
    total: usize,
    skipped: usize,
    consecutive_failures: usize,
    finished: bool,
}

impl<'a, S: VideoSource + ?Sized> FrameSampler<'a, S> {
    pub fn new(source: &'a mut S, sample_rate: f64) -> Self {
        let total = sample_count(source.info().duration_secs, sample_rate);
        Self {
            source,
            sample_rate,
            next_index: 0,
            total,
            skipped: 0,
            consecutive_failures: 0,
            finished: false,
        }
    }

    /// Planned number of sample timestamps.
    pub fn total_samples(&self) -> usize {
        self.total
    }

    /// Timestamps dropped so far because their frame could not be decoded.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn fail(&mut self, err: VideoDecodeError) -> Option<Result<Sample, VideoDecodeError>> {
        self.finished = true;
        Some(Err(err))
    }
}

impl<S: VideoSource + ?Sized> Iterator for FrameSampler<'_, S> {
    type Item = Result<Sample, VideoDecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished && self.next_index < self.total {
            let index = self.next_index;
            self.next_index += 1;
            let timestamp_secs = sample_timestamp(index, self.sample_rate);

            match self.source.decode_frame_near(timestamp_secs) {
                Ok(image) => {
                    self.consecutive_failures = 0;
                    return Some(Ok(Sample {
                        index,
                        timestamp_secs,
                        timestamp_ms: timestamp_ms(index, self.sample_rate),
                        image,
                    }));
                }
                Err(err) if err.is_fatal() => return self.fail(err),
                Err(err) => {
                    tracing::debug!("Skipping sample {} ({:.3}s): {}", index, timestamp_secs, err);
                    self.skipped += 1;
                    self.consecutive_failures += 1;
                    if self.consecutive_failures >= MAX_CONSECUTIVE_DECODE_FAILURES {
                        tracing::warn!(
                            "{} consecutive decode failures, giving up on video",
                            self.consecutive_failures
                        );
                        return self.fail(VideoDecodeError::Unusable {
                            reason: format!(
                                "{} consecutive frames failed to decode, last: {}",
                                self.consecutive_failures, err
                            ),
                        });
                    }
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            (0, Some(0))
        } else {
            (0, Some(self.total - self.next_index))
        }
    }
}
