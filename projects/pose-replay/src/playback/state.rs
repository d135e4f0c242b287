use crate::error::PlaybackError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaybackState {
    /// No records loaded.
    Idle,
    Paused { index: usize },
    Playing { index: usize },
}

impl PlaybackState {
    pub fn current_index(&self) -> Option<usize> {
        match *self {
            PlaybackState::Idle => None,
            PlaybackState::Paused { index } | PlaybackState::Playing { index } => Some(index),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// A new sequence of `len` records replaces the current one.
    Load { len: usize },
    Play,
    Pause,
    /// Periodic timer fired; `len` is the loaded sequence length.
    Tick { len: usize },
    Seek { index: usize, len: usize },
    Teardown,
}

/// The whole playback state machine. Events that do not apply to the
/// current state leave it unchanged; only an invalid seek is an error.
pub fn transition(state: PlaybackState, event: PlaybackEvent) -> Result<PlaybackState, PlaybackError> {
    use PlaybackEvent as E;
    use PlaybackState as S;

    let next = match (state, event) {
        (_, E::Load { len: 0 }) => S::Idle,
        (_, E::Load { .. }) => S::Paused { index: 0 },
        (_, E::Teardown) => S::Idle,

        (S::Paused { index }, E::Play) => S::Playing { index },
        (S::Playing { index }, E::Pause) => S::Paused { index },

        (S::Playing { index }, E::Tick { len }) => {
            if index + 1 < len {
                S::Playing { index: index + 1 }
            } else {
                // ran off the end: stop and rewind
                S::Paused { index: 0 }
            }
        }

        (S::Idle, E::Seek { .. }) => return Err(PlaybackError::Empty),
        (_, E::Seek { index, len }) => {
            if index >= len {
                return Err(PlaybackError::IndexOutOfRange { index, len });
            }
            S::Paused { index }
        }

        (state, _) => state,
    };
    Ok(next)
}
