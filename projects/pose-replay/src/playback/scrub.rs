use super::controller::PlaybackController;
use crate::error::PlaybackError;
use crate::pipeline::FrameRecord;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrubEntry {
    pub index: usize,
    pub timestamp_ms: u64,
    /// Seconds with one decimal, e.g. "1.2s"
    pub label: String,
    pub has_image: bool,
    pub selected: bool,
}

/// Rounds half up to the nearest tenth of a second.
pub fn timestamp_label(timestamp_ms: u64) -> String {
    let tenths = (timestamp_ms + 50) / 100;
    format!("{}.{}s", tenths / 10, tenths % 10)
}

/// Random-access view over the loaded sequence. Holds no position of its
/// own: the selection is whatever the controller's current index is.
#[derive(Clone)]
pub struct ScrubIndex {
    controller: PlaybackController,
}

impl ScrubIndex {
    pub fn new(controller: PlaybackController) -> Self {
        Self { controller }
    }

    pub fn selected(&self) -> Option<usize> {
        self.controller.state().current_index()
    }

    pub fn entries(&self) -> Vec<ScrubEntry> {
        let records = self.controller.records();
        let selected = self.selected();
        records
            .iter()
            .enumerate()
            .map(|(index, record)| entry(index, record, selected))
            .collect()
    }

    /// Jumps playback to `index`; any running playback stops.
    pub fn select(&self, index: usize) -> Result<(), PlaybackError> {
        self.controller.seek(index)
    }
}

fn entry(index: usize, record: &FrameRecord, selected: Option<usize>) -> ScrubEntry {
    ScrubEntry {
        index,
        timestamp_ms: record.timestamp_ms,
        label: timestamp_label(record.timestamp_ms),
        has_image: record.has_image(),
        selected: selected == Some(index),
    }
}
