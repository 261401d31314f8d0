//! Song File Loader
//!
//! Loads song files from disk with automatic format detection.

use super::{detect_format, DroParser, ImfParser, Song, SongFormat, SongParser};
use super::{IMF_TICK_RATE, WLF_TICK_RATE};
use crate::Result;
use std::fs;
use std::path::Path;

/// Loads song files from disk
pub struct SongLoader;

impl SongLoader {
    /// Load a song, detecting the format from magic bytes or file extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Song> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|e| format!("Failed to read file '{}': {}", path.display(), e))?;
        let song = Self::load_bytes(&data, Some(path))?;
        log::debug!(
            "loaded '{}': {} events, {:.1}s",
            path.display(),
            song.events.len(),
            song.duration_secs()
        );
        Ok(song)
    }

    /// Parse song data already in memory
    ///
    /// `path` is only consulted for format detection and the IMF tick rate.
    pub fn load_bytes(data: &[u8], path: Option<&Path>) -> Result<Song> {
        match detect_format(data, path) {
            Some(SongFormat::Dro) => DroParser.parse(data),
            Some(SongFormat::Imf) => ImfParser::new(imf_tick_rate(path)).parse(data),
            None => Err("Unsupported file format. Supported: IMF, WLF, DRO"
                .to_string()
                .into()),
        }
    }
}

/// IMF tick rate implied by the file extension
pub fn imf_tick_rate(path: Option<&Path>) -> u32 {
    let wlf = path
        .and_then(|p| p.extension())
        .is_some_and(|e| e.eq_ignore_ascii_case("wlf"));
    if wlf {
        WLF_TICK_RATE
    } else {
        IMF_TICK_RATE
    }
}
