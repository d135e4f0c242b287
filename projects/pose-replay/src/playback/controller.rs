use super::state::{transition, PlaybackEvent, PlaybackState};
use crate::error::PlaybackError;
use crate::pipeline::FrameRecord;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Fixed visual cadence, independent of the extraction sample rate.
pub const PLAYBACK_INTERVAL: Duration = Duration::from_millis(100);

struct Inner {
    state: PlaybackState,
    records: Arc<[FrameRecord]>,
    /// Bumped whenever the running timer is invalidated. A timer task only
    /// mutates state while its own generation is current.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// What a renderer needs for one frame of UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub current_index: Option<usize>,
    pub is_playing: bool,
    pub frame_count: usize,
    pub timestamp_secs: Option<f64>,
    /// "Frame i/N", 1-based
    pub label: Option<String>,
    /// (i + 1) / N, 0 when idle
    pub progress: f64,
}

/// Owns the playback state and its timer. Cloning yields another handle to
/// the same controller.
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<Mutex<Inner>>,
    runtime: Handle,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    // state stays consistent across a panic: every write is a single assignment
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

impl PlaybackController {
    pub fn new(runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: PlaybackState::Idle,
                records: Arc::from(Vec::new()),
                generation: 0,
                timer: None,
            })),
            runtime,
        }
    }

    /// Replaces the sequence wholesale and resets to the first frame, paused.
    pub fn load(&self, records: Vec<FrameRecord>) {
        let mut inner = lock(&self.inner);
        stop_timer(&mut inner);
        let len = records.len();
        inner.records = records.into();
        apply(&mut inner, PlaybackEvent::Load { len });
        tracing::info!("Playback loaded {} frames", len);
    }

    pub fn play(&self) {
        let mut inner = lock(&self.inner);
        if inner.state.is_playing() {
            return;
        }
        apply(&mut inner, PlaybackEvent::Play);
        if inner.state.is_playing() {
            self.start_timer(&mut inner);
        }
    }

    pub fn pause(&self) {
        let mut inner = lock(&self.inner);
        apply(&mut inner, PlaybackEvent::Pause);
        if !inner.state.is_playing() {
            stop_timer(&mut inner);
        }
    }

    /// Jumps to `index`, stopping playback if it was running.
    pub fn seek(&self, index: usize) -> Result<(), PlaybackError> {
        let mut inner = lock(&self.inner);
        let len = inner.records.len();
        let next = transition(inner.state, PlaybackEvent::Seek { index, len })?;
        stop_timer(&mut inner);
        tracing::debug!("Playback {:?} -> {:?} (seek)", inner.state, next);
        inner.state = next;
        Ok(())
    }

    /// Cancels the timer and drops the sequence. Safe to call repeatedly; no
    /// tick lands after this returns.
    pub fn teardown(&self) {
        let mut inner = lock(&self.inner);
        stop_timer(&mut inner);
        inner.records = Arc::from(Vec::new());
        apply(&mut inner, PlaybackEvent::Teardown);
    }

    pub fn state(&self) -> PlaybackState {
        lock(&self.inner).state
    }

    pub fn records(&self) -> Arc<[FrameRecord]> {
        lock(&self.inner).records.clone()
    }

    /// Current index and its record, read under one lock.
    pub fn current_frame(&self) -> Option<(usize, FrameRecord)> {
        let inner = lock(&self.inner);
        let index = inner.state.current_index()?;
        inner.records.get(index).cloned().map(|record| (index, record))
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let inner = lock(&self.inner);
        let frame_count = inner.records.len();
        let current_index = inner.state.current_index();
        let record = current_index.and_then(|i| inner.records.get(i));

        PlaybackSnapshot {
            state: inner.state,
            current_index,
            is_playing: inner.state.is_playing(),
            frame_count,
            timestamp_secs: record.map(FrameRecord::timestamp_secs),
            label: current_index.map(|i| format!("Frame {}/{}", i + 1, frame_count)),
            progress: match current_index {
                Some(i) if frame_count > 0 => (i + 1) as f64 / frame_count as f64,
                _ => 0.0,
            },
        }
    }

    fn start_timer(&self, inner: &mut Inner) {
        stop_timer(inner);
        let generation = inner.generation;
        let weak = Arc::downgrade(&self.inner);
        let first_tick = Instant::now() + PLAYBACK_INTERVAL;
        inner.timer = Some(self.runtime.spawn(run_timer(weak, generation, first_tick)));
    }
}

fn apply(inner: &mut Inner, event: PlaybackEvent) {
    match transition(inner.state, event) {
        Ok(next) => {
            if next != inner.state {
                tracing::debug!("Playback {:?} -> {:?} ({:?})", inner.state, next, event);
            }
            inner.state = next;
        }
        Err(e) => tracing::warn!("Ignoring playback event {:?}: {}", event, e),
    }
}

fn stop_timer(inner: &mut Inner) {
    inner.generation += 1;
    if let Some(timer) = inner.timer.take() {
        timer.abort();
    }
}

async fn run_timer(inner: Weak<Mutex<Inner>>, generation: u64, first_tick: Instant) {
    let mut ticker = interval_at(first_tick, PLAYBACK_INTERVAL);
    // one index per tick, never a burst after a stall
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(shared) = inner.upgrade() else {
            return;
        };
        let mut guard = lock(&shared);
        if guard.generation != generation {
            return;
        }
        let len = guard.records.len();
        apply(&mut guard, PlaybackEvent::Tick { len });
        if !guard.state.is_playing() {
            guard.timer = None;
            return;
        }
    }
}
