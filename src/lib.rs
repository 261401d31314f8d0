//! OPL2/OPL3 render bridge
//!
//! Drives a register-mapped FM synthesis chip engine and converts its internal
//! 32-bit samples into packed 16-bit PCM written straight into a caller-owned
//! buffer. The caller writes registers, then asks for a block of audio.
//!
//! # Features
//! - Validated instance construction (sample rate, 16-bit output, mono/stereo)
//! - Register pass-through to the engine, including the OPL3 second bank
//! - Configurable render buffer policy (default 2..=512 frames per call)
//! - Amplification, saturation to 16 bits, mono-to-stereo duplication and
//!   explicit stereo-to-mono handling
//! - A reference OPL2/OPL3 FM engine (non-bit-accurate)
//! - IMF / DRO song parsing, song rendering and WAV export
//!
//! # Crate feature flags
//! - `formats` (default): IMF/DRO parsing and the song renderer (`formats`, `player`)
//! - `export-wav` (default): WAV export of rendered songs (`export`)
//! - `cli` (opt-in): the `opl-render` command line tool
//!
//! # Quick start
//! ```no_run
//! use opl_bridge::OplInstance;
//!
//! let mut opl = OplInstance::new(44_100, 2, 2)?;
//! opl.write_register(0xA0, 0x98); // F-number low
//! opl.write_register(0xB0, 0x31); // key on, block 4
//!
//! let mut buffer = vec![0u8; 512 * 4];
//! let written = opl.render(&mut buffer)?;
//! assert_eq!(written, 2048);
//! # Ok::<(), opl_bridge::OplError>(())
//! ```

#![warn(missing_docs)]

pub mod backend; // Engine trait abstraction
pub mod config; // Bridge configuration and validation
pub mod instance; // Instance manager
pub mod opl; // Reference OPL2/OPL3 engine
pub mod sink; // Sample sink and PCM conversion

#[cfg(feature = "export-wav")]
pub mod export; // WAV export
#[cfg(feature = "formats")]
pub mod formats; // IMF / DRO parsing
#[cfg(feature = "formats")]
pub mod player; // Song rendering

/// Error types for bridge operations
#[derive(thiserror::Error, Debug)]
pub enum OplError {
    /// Construction parameters rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Render buffer frame count outside the admissible range
    #[error("Buffer size error: {frames} frame(s) requested, accepted range is {min}..={max}")]
    BufferSizeError {
        /// Frame count derived from the buffer length
        frames: usize,
        /// Smallest accepted frame count
        min: usize,
        /// Largest accepted frame count
        max: usize,
    },

    /// Engine output layout cannot be written into this instance
    #[error("Unsupported conversion: {0}")]
    UnsupportedConversion(String),

    /// Error while parsing a song file
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Error writing audio file
    #[error("Audio file write error: {0}")]
    AudioFileError(String),

    /// IO error from filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for OplError {
    /// Converts a String into `OplError::Other`.
    ///
    /// Prefer the specific variants where the failure has a category; this
    /// conversion exists for ad-hoc messages.
    fn from(msg: String) -> Self {
        OplError::Other(msg)
    }
}

impl From<&str> for OplError {
    fn from(msg: &str) -> Self {
        OplError::Other(msg.to_string())
    }
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, OplError>;

// Public API exports
pub use backend::OplEngine;
pub use config::{BridgeConfig, BufferPolicy, ChannelLayout, Downmix, SAMPLE_SIZE, VOL_AMP};
pub use instance::OplInstance;
pub use opl::OplChip;
pub use sink::{BoundSink, PcmSink, SampleSink};

#[cfg(feature = "export-wav")]
pub use export::export_to_wav;
#[cfg(feature = "formats")]
pub use formats::{load_song, Song, SongEvent, SongFormat};
#[cfg(feature = "formats")]
pub use player::SongRenderer;
