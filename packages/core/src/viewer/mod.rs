//! Video review: frame loading, playback, the parameter chart and the
//! summary cards.

pub mod chart;
pub mod frames;
pub mod playback;
pub mod summary;

pub use frames::{FrameBuffer, FrameKey, FrameSource, FrameStatus, FrameStore};
pub use playback::{frame_interval, Playback, PlaybackRegistry, PlaybackTimer};
