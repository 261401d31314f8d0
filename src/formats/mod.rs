//! OPL Song Formats
//!
//! Parsers for register-dump song files. Every format decodes into the same
//! [`Song`]: a flat list of register writes separated by delays, measured in
//! the format's own tick rate.
//!
//! Supported formats:
//! - IMF (id Software Music Format), type 0 and type 1, 560 Hz or 700 Hz
//! - DRO v2 (DOSBox Raw OPL), millisecond delays, both OPL3 banks

pub mod dro;
pub mod imf;
pub mod loader;

pub use dro::DroParser;
pub use imf::ImfParser;
pub use loader::SongLoader;

use crate::Result;
use std::path::Path;

/// Tick rate of IMF files for most id Software titles
pub const IMF_TICK_RATE: u32 = 560;

/// Tick rate of `.wlf` (Wolfenstein 3-D) IMF files
pub const WLF_TICK_RATE: u32 = 700;

/// DRO delays are in milliseconds
pub const DRO_TICK_RATE: u32 = 1000;

/// Trait for song format parsers
pub trait SongParser {
    /// Parse file data into a song
    fn parse(&self, data: &[u8]) -> Result<Song>;

    /// Get parser name
    fn name(&self) -> &str;
}

/// One step of a song
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongEvent {
    /// Register write; bank 1 registers carry 0x100
    Write {
        /// Register address (0x000-0x1FF)
        reg: u16,
        /// Value
        val: u8,
    },
    /// Wait this many ticks before the next event
    Delay(u32),
}

/// Known song file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongFormat {
    /// id Software Music Format
    Imf,
    /// DOSBox Raw OPL v2
    Dro,
}

impl SongFormat {
    /// Short display name
    pub fn name(&self) -> &'static str {
        match self {
            SongFormat::Imf => "IMF",
            SongFormat::Dro => "DRO",
        }
    }
}

impl std::fmt::Display for SongFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded song
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    /// Register writes and delays in playback order
    pub events: Vec<SongEvent>,
    /// Delay ticks per second
    pub tick_rate: u32,
}

impl Song {
    /// Create a song from events
    pub fn new(events: Vec<SongEvent>, tick_rate: u32) -> Self {
        Song { events, tick_rate }
    }

    /// Sum of all delays in ticks
    pub fn total_ticks(&self) -> u64 {
        self.events
            .iter()
            .map(|e| match e {
                SongEvent::Delay(ticks) => *ticks as u64,
                SongEvent::Write { .. } => 0,
            })
            .sum()
    }

    /// Number of register writes
    pub fn write_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SongEvent::Write { .. }))
            .count()
    }

    /// Playing time in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.tick_rate == 0 {
            return 0.0;
        }
        self.total_ticks() as f64 / self.tick_rate as f64
    }

    /// Whether any write touches the second register bank
    pub fn uses_opl3(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, SongEvent::Write { reg, .. } if *reg >= 0x100))
    }
}

/// Detect a song format from its contents, falling back to the file name
///
/// DRO files carry a magic signature; IMF files have none and are
/// recognized by their `.imf` / `.wlf` extension only.
pub fn detect_format(data: &[u8], path: Option<&Path>) -> Option<SongFormat> {
    if data.starts_with(dro::MAGIC) {
        return Some(SongFormat::Dro);
    }
    let ext = path
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("imf") | Some("wlf") => Some(SongFormat::Imf),
        _ => None,
    }
}

/// Convenience function to load a song file from disk
pub fn load_song<P: AsRef<Path>>(path: P) -> Result<Song> {
    SongLoader::load(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(
            detect_format(b"DBRAWOPL\x02\x00\x00\x00", None),
            Some(SongFormat::Dro)
        );
        assert_eq!(
            detect_format(&[0, 0], Some(Path::new("song.IMF"))),
            Some(SongFormat::Imf)
        );
        assert_eq!(
            detect_format(&[0, 0], Some(Path::new("wolf.wlf"))),
            Some(SongFormat::Imf)
        );
        assert_eq!(detect_format(&[0, 0], Some(Path::new("x.ym"))), None);
        assert_eq!(detect_format(&[0, 0], None), None);
    }

    #[test]
    fn test_song_summary() {
        let song = Song::new(
            vec![
                SongEvent::Write { reg: 0xB0, val: 0x20 },
                SongEvent::Delay(280),
                SongEvent::Write { reg: 0x1B0, val: 0x20 },
                SongEvent::Delay(280),
            ],
            560,
        );
        assert_eq!(song.total_ticks(), 560);
        assert_eq!(song.write_count(), 2);
        assert!((song.duration_secs() - 1.0).abs() < 1e-9);
        assert!(song.uses_opl3());
    }
}
