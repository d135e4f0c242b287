pub mod controller;
pub mod scrub;
pub mod state;

pub use controller::{PlaybackController, PlaybackSnapshot, PLAYBACK_INTERVAL};
pub use scrub::{ScrubEntry, ScrubIndex};
pub use state::{transition, PlaybackEvent, PlaybackState};
