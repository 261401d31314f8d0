//! Song Playback
//!
//! Turns a parsed [`Song`](crate::formats::Song) into PCM by driving an
//! [`OplInstance`](crate::OplInstance).

pub mod frame_clock;
pub mod renderer;

pub use frame_clock::FrameClock;
pub use renderer::{PlaybackStats, SongRenderer};
