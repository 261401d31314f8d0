//! Bridge Configuration
//!
//! Construction parameters for an [`OplInstance`](crate::OplInstance): output
//! sample rate, sample size, channel layout, the admissible render buffer range,
//! amplification and the stereo-to-mono policy. Everything is validated before
//! an engine is allocated.

use crate::{OplError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes per output sample component (signed 16-bit PCM)
pub const SAMPLE_SIZE: u8 = 2;

/// Default amplification shift applied before clipping (factor `2^VOL_AMP`)
pub const VOL_AMP: u32 = 1;

/// Largest accepted amplification shift
pub const MAX_VOLUME_SHIFT: u32 = 15;

/// Largest frame count the engine produces in one generation block
pub const MAX_RENDER_FRAMES: usize = 512;

/// Native OPL output rate (14.31818 MHz / 288), used as the default sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 49_716;

/// Output channel layout of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ChannelLayout {
    /// One sample per frame
    Mono = 1,
    /// Interleaved left/right samples per frame
    Stereo = 2,
}

impl ChannelLayout {
    /// Number of sample components per frame
    pub fn count(self) -> usize {
        self as usize
    }

    /// True for [`ChannelLayout::Stereo`]
    pub fn is_stereo(self) -> bool {
        self == ChannelLayout::Stereo
    }
}

impl TryFrom<u8> for ChannelLayout {
    type Error = OplError;

    fn try_from(count: u8) -> Result<Self> {
        match count {
            1 => Ok(ChannelLayout::Mono),
            2 => Ok(ChannelLayout::Stereo),
            other => Err(OplError::InvalidConfiguration(format!(
                "channel count {other} is not supported (expected 1 or 2)"
            ))),
        }
    }
}

impl From<ChannelLayout> for u8 {
    fn from(layout: ChannelLayout) -> Self {
        layout as u8
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelLayout::Mono => f.write_str("mono"),
            ChannelLayout::Stereo => f.write_str("stereo"),
        }
    }
}

/// Admissible frame-count range for a single render call
///
/// Three policies have been used by callers of this kind of bridge: exactly
/// 512 frames, 1..=512, and 2..=512. The default is 2..=512; the others are
/// available through [`BufferPolicy::exact`] and [`BufferPolicy::range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPolicy {
    /// Smallest accepted frame count
    pub min_frames: usize,
    /// Largest accepted frame count
    pub max_frames: usize,
}

impl BufferPolicy {
    /// 2..=512 frames
    pub const DEFAULT: BufferPolicy = BufferPolicy::range(2, MAX_RENDER_FRAMES);

    /// Accept any frame count in `min..=max`
    pub const fn range(min_frames: usize, max_frames: usize) -> Self {
        BufferPolicy {
            min_frames,
            max_frames,
        }
    }

    /// Accept exactly `frames` frames
    pub const fn exact(frames: usize) -> Self {
        BufferPolicy::range(frames, frames)
    }

    /// Check whether `frames` lies in the range
    pub fn contains(&self, frames: usize) -> bool {
        (self.min_frames..=self.max_frames).contains(&frames)
    }

    /// Reject `frames` with [`OplError::BufferSizeError`] when out of range
    pub fn check(&self, frames: usize) -> Result<()> {
        if self.contains(frames) {
            Ok(())
        } else {
            Err(OplError::BufferSizeError {
                frames,
                min: self.min_frames,
                max: self.max_frames,
            })
        }
    }

    /// Validate the range itself
    pub fn validate(&self) -> Result<()> {
        if self.min_frames == 0 {
            return Err(OplError::InvalidConfiguration(
                "buffer policy minimum must be at least 1 frame".into(),
            ));
        }
        if self.min_frames > self.max_frames {
            return Err(OplError::InvalidConfiguration(format!(
                "buffer policy minimum {} exceeds maximum {}",
                self.min_frames, self.max_frames
            )));
        }
        if self.max_frames > MAX_RENDER_FRAMES {
            return Err(OplError::InvalidConfiguration(format!(
                "buffer policy maximum {} exceeds the engine block size {}",
                self.max_frames, MAX_RENDER_FRAMES
            )));
        }
        Ok(())
    }
}

impl Default for BufferPolicy {
    fn default() -> Self {
        BufferPolicy::DEFAULT
    }
}

/// What to do when the engine produces stereo output for a mono instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Downmix {
    /// Write the average of left and right
    #[default]
    Average,
    /// Fail the render with [`OplError::UnsupportedConversion`]
    Reject,
}

/// Instance configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Bytes per sample component; only [`SAMPLE_SIZE`] is accepted
    pub sample_size: u8,
    /// Output channel layout
    pub channels: ChannelLayout,
    /// Admissible render buffer range
    pub buffer_policy: BufferPolicy,
    /// Left shift applied to engine samples before clipping
    pub volume_shift: u32,
    /// Stereo engine output into a mono instance
    pub downmix: Downmix,
}

impl BridgeConfig {
    /// Build and validate a configuration from the raw construction triple
    pub fn new(sample_rate: u32, sample_size: u8, channels: u8) -> Result<Self> {
        let config = BridgeConfig {
            sample_rate,
            sample_size,
            channels: ChannelLayout::try_from(channels)?,
            ..BridgeConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the output sample rate
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the channel layout
    pub fn with_channels(mut self, channels: ChannelLayout) -> Self {
        self.channels = channels;
        self
    }

    /// Set the render buffer policy
    pub fn with_buffer_policy(mut self, policy: BufferPolicy) -> Self {
        self.buffer_policy = policy;
        self
    }

    /// Set the amplification shift
    pub fn with_volume_shift(mut self, shift: u32) -> Self {
        self.volume_shift = shift;
        self
    }

    /// Set the stereo-to-mono policy
    pub fn with_downmix(mut self, downmix: Downmix) -> Self {
        self.downmix = downmix;
        self
    }

    /// Validate every field
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(OplError::InvalidConfiguration(
                "sample rate must be a positive number of Hz".into(),
            ));
        }
        if self.sample_size != SAMPLE_SIZE {
            return Err(OplError::InvalidConfiguration(format!(
                "sample size {} is not supported (expected {SAMPLE_SIZE})",
                self.sample_size
            )));
        }
        if self.volume_shift > MAX_VOLUME_SHIFT {
            return Err(OplError::InvalidConfiguration(format!(
                "volume shift {} exceeds {MAX_VOLUME_SHIFT}",
                self.volume_shift
            )));
        }
        self.buffer_policy.validate()
    }

    /// Bytes per output frame
    pub fn frame_size(&self) -> usize {
        self.sample_size as usize * self.channels.count()
    }

    /// Whole frames that fit in `len` bytes
    pub fn frames_for(&self, len: usize) -> usize {
        len / self.frame_size()
    }

    /// Parse and validate a JSON configuration; missing fields take defaults
    pub fn from_json(text: &str) -> Result<Self> {
        let config: BridgeConfig = serde_json::from_str(text)
            .map_err(|e| OplError::InvalidConfiguration(format!("bad config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| OplError::Other(e.to_string()))
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            sample_rate: DEFAULT_SAMPLE_RATE,
            sample_size: SAMPLE_SIZE,
            channels: ChannelLayout::Stereo,
            buffer_policy: BufferPolicy::DEFAULT,
            volume_shift: VOL_AMP,
            downmix: Downmix::Average,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_both_layouts() {
        for channels in [1u8, 2] {
            let config = BridgeConfig::new(44_100, 2, channels).unwrap();
            assert_eq!(config.channels.count(), channels as usize);
            assert_eq!(config.frame_size(), 2 * channels as usize);
        }
    }

    #[test]
    fn test_rejects_sample_sizes_other_than_two() {
        for size in [0u8, 1, 3, 4, 255] {
            let err = BridgeConfig::new(44_100, size, 2).unwrap_err();
            assert!(matches!(err, OplError::InvalidConfiguration(_)));
            assert!(err.to_string().contains("expected 2"));
        }
    }

    #[test]
    fn test_rejects_bad_channel_counts() {
        for channels in [0u8, 3, 6, 255] {
            let err = BridgeConfig::new(44_100, 2, channels).unwrap_err();
            assert!(err.to_string().contains("expected 1 or 2"));
        }
    }

    #[test]
    fn test_rejects_zero_sample_rate() {
        assert!(BridgeConfig::new(0, 2, 1).is_err());
    }

    #[test]
    fn test_buffer_policy_presets() {
        assert!(BufferPolicy::DEFAULT.contains(2));
        assert!(BufferPolicy::DEFAULT.contains(512));
        assert!(!BufferPolicy::DEFAULT.contains(1));
        assert!(!BufferPolicy::DEFAULT.contains(513));

        let exact = BufferPolicy::exact(512);
        assert!(exact.contains(512));
        assert!(!exact.contains(511));

        assert!(BufferPolicy::range(1, 512).contains(1));
    }

    #[test]
    fn test_buffer_policy_validation() {
        assert!(BufferPolicy::range(0, 10).validate().is_err());
        assert!(BufferPolicy::range(10, 5).validate().is_err());
        assert!(BufferPolicy::range(2, 513).validate().is_err());
        assert!(BufferPolicy::exact(512).validate().is_ok());
    }

    #[test]
    fn test_check_reports_range() {
        match BufferPolicy::DEFAULT.check(600) {
            Err(OplError::BufferSizeError { frames, min, max }) => {
                assert_eq!((frames, min, max), (600, 2, 512));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_frames_for_truncates() {
        let config = BridgeConfig::new(44_100, 2, 2).unwrap();
        assert_eq!(config.frames_for(2048), 512);
        assert_eq!(config.frames_for(2051), 512);
        assert_eq!(config.frames_for(3), 0);
    }

    #[test]
    fn test_json_round_trip_and_defaults() {
        let config = BridgeConfig::default()
            .with_channels(ChannelLayout::Mono)
            .with_downmix(Downmix::Reject);
        let json = config.to_json().unwrap();
        assert!(json.contains("\"channels\": 1"));
        assert_eq!(BridgeConfig::from_json(&json).unwrap(), config);

        let partial = BridgeConfig::from_json(r#"{ "sample_rate": 22050 }"#).unwrap();
        assert_eq!(partial.sample_rate, 22_050);
        assert_eq!(partial.channels, ChannelLayout::Stereo);
    }

    #[test]
    fn test_json_rejects_invalid_values() {
        assert!(BridgeConfig::from_json(r#"{ "channels": 3 }"#).is_err());
        assert!(BridgeConfig::from_json(r#"{ "sample_size": 1 }"#).is_err());
    }
}
