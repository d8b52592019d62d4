//! Looping background track: decoding, normalization and the chunk cursor.

mod decode;
mod mixer;
mod track;

pub use decode::decode_mono;
pub use mixer::{BackgroundTrackMixer, MixerSnapshot, BACKGROUND_HEADROOM};
pub use track::BackgroundTrack;
