//! Audio export
//!
//! Writes rendered songs to audio files.

pub mod wav;

pub use wav::{export_to_wav, write_pcm_wav};
