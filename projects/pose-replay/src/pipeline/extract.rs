// Headless extraction: run one job in the foreground with a progress bar.

use super::assembler::Assembly;
use super::orchestrator::{spawn_pipeline, PipelineRequest, ProcessingState};
use super::types::STAGE_SAMPLE;
use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize)]
pub struct ExtractSummary {
    pub video: String,
    pub duration_secs: f64,
    pub sample_rate: f64,
    pub sampled: usize,
    pub skipped: usize,
    pub frames: usize,
    /// "ready" or "no_poses"
    pub outcome: &'static str,
    pub timestamps_ms: Vec<u64>,
    pub elapsed_secs: f64,
}

impl ExtractSummary {
    fn new(request: &PipelineRequest, assembly: &Assembly, elapsed: Duration) -> Self {
        Self {
            video: request.video_path.display().to_string(),
            duration_secs: assembly.video.duration_secs,
            sample_rate: request.assembler.sample_rate,
            sampled: assembly.sampled,
            skipped: assembly.skipped,
            frames: assembly.records.len(),
            outcome: if assembly.records.is_empty() {
                "no_poses"
            } else {
                "ready"
            },
            timestamps_ms: assembly.records.iter().map(|r| r.timestamp_ms).collect(),
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }
}

pub fn extract(request: PipelineRequest) -> Result<ExtractSummary> {
    let start_time = Instant::now();
    let state = Arc::new(ProcessingState::new(
        0,
        request.video_path.display().to_string(),
    ));

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow} samples/s, {eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let (tx, rx) = mpsc::channel();
    let worker = spawn_pipeline(request.clone(), state.clone(), move |result| {
        let _ = tx.send(result);
    });

    let result = loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(result) => break result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                pb.set_length(state.total_samples.load(Ordering::Relaxed) as u64);
                if let Ok(stages) = state.stages.read() {
                    if let Some(progress) = stages.get(STAGE_SAMPLE) {
                        pb.set_position(progress.current as u64);
                    }
                }
                pb.set_message(format!("{} poses", state.detected.load(Ordering::Relaxed)));
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                pb.abandon();
                return Err(anyhow!("Pipeline worker exited without a result"));
            }
        }
    };
    let _ = worker.join();

    match result {
        Ok(assembly) => {
            pb.set_length(assembly.sampled as u64 + assembly.skipped as u64);
            pb.set_position(assembly.sampled as u64 + assembly.skipped as u64);
            pb.finish_with_message("Done");
            Ok(ExtractSummary::new(&request, &assembly, start_time.elapsed()))
        }
        Err(e) => {
            pb.abandon_with_message(e.user_message());
            Err(anyhow::Error::new(e).context("Extraction failed"))
        }
    }
}
