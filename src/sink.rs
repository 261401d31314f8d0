//! Sample Sink
//!
//! Receives the engine's 32-bit samples and writes them as packed 16-bit PCM
//! into a caller-owned byte buffer, with no intermediate copy.
//!
//! The [`PcmSink`] owned by an instance holds only the conversion settings.
//! A caller buffer is attached for the duration of one render call through
//! [`PcmSink::bind`], which returns a [`BoundSink`] borrowing the buffer. The
//! borrow ends with the guard, so no reference to caller memory outlives the
//! render call.
//!
//! Conversion of each engine value `v`:
//! 1. amplify: `v << shift` (64-bit, never wraps; shift at most
//!    [`MAX_VOLUME_SHIFT`])
//! 2. clip to `[-32768, 32767]`
//! 3. store little-endian into the next output slot

use crate::config::{ChannelLayout, Downmix, MAX_VOLUME_SHIFT};
use crate::{OplError, Result};

/// Engine output callback contract
pub trait SampleSink {
    /// Accept one sample per frame
    fn add_samples_mono(&mut self, samples: &[i32]);

    /// Accept interleaved left/right pairs, one pair per frame
    fn add_samples_stereo(&mut self, samples: &[i32]);
}

/// Apply the amplification shift in 64-bit arithmetic
///
/// Shifts above [`MAX_VOLUME_SHIFT`] are treated as the maximum. Any non-zero
/// value already saturates 16 bits there, so clipped output is unchanged.
#[inline]
pub fn amplify(value: i32, shift: u32) -> i64 {
    (value as i64) << shift.min(MAX_VOLUME_SHIFT)
}

/// Saturate into the signed 16-bit range
#[inline]
pub fn clip(value: i64) -> i16 {
    value.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

/// Amplify then clip one engine value
#[inline]
pub fn convert_sample(value: i32, shift: u32) -> i16 {
    clip(amplify(value, shift))
}

/// Conversion settings owned by an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmSink {
    channels: ChannelLayout,
    volume_shift: u32,
    downmix: Downmix,
}

impl PcmSink {
    /// Create a sink for the given output layout
    ///
    /// Fails with [`OplError::InvalidConfiguration`] when `volume_shift`
    /// exceeds [`MAX_VOLUME_SHIFT`].
    pub fn new(channels: ChannelLayout, volume_shift: u32, downmix: Downmix) -> Result<Self> {
        if volume_shift > MAX_VOLUME_SHIFT {
            return Err(OplError::InvalidConfiguration(format!(
                "volume shift {volume_shift} exceeds {MAX_VOLUME_SHIFT}"
            )));
        }
        Ok(PcmSink {
            channels,
            volume_shift,
            downmix,
        })
    }

    /// Output channel layout
    pub fn channels(&self) -> ChannelLayout {
        self.channels
    }

    /// Amplification shift
    pub fn volume_shift(&self) -> u32 {
        self.volume_shift
    }

    /// Stereo-to-mono policy
    pub fn downmix(&self) -> Downmix {
        self.downmix
    }

    /// Bytes per output frame
    pub fn frame_size(&self) -> usize {
        2 * self.channels.count()
    }

    /// Attach a caller buffer for one render call
    ///
    /// Whole frames in `out` are the render target; trailing bytes that do not
    /// form a full frame are never touched.
    pub fn bind<'a>(&'a self, out: &'a mut [u8]) -> BoundSink<'a> {
        let frames = out.len() / self.frame_size();
        BoundSink {
            sink: self,
            out,
            frames,
            written: 0,
            overflow: 0,
            rejected: false,
        }
    }
}

/// A [`PcmSink`] bound to a caller buffer for the span of one render call
#[derive(Debug)]
pub struct BoundSink<'a> {
    sink: &'a PcmSink,
    out: &'a mut [u8],
    frames: usize,
    written: usize,
    overflow: usize,
    rejected: bool,
}

impl<'a> BoundSink<'a> {
    /// Frames the bound buffer holds
    pub fn capacity(&self) -> usize {
        self.frames
    }

    /// Frames written so far
    pub fn frames_written(&self) -> usize {
        self.written
    }

    /// Frames still to be written
    pub fn remaining(&self) -> usize {
        self.frames - self.written
    }

    /// True when stereo input arrived under [`Downmix::Reject`]
    pub fn rejected(&self) -> bool {
        self.rejected
    }

    /// Finish the render call and release the buffer
    ///
    /// Any shortfall from the engine is zero-filled so every byte of the
    /// bound frame range is written exactly once. Returns bytes written.
    pub fn finish(self) -> usize {
        if self.overflow > 0 {
            log::warn!(
                "engine produced {} frame(s) past the {}-frame render buffer; dropped",
                self.overflow,
                self.frames
            );
        }
        if self.written < self.frames {
            log::warn!(
                "engine produced {} of {} frame(s); zero-filling the rest",
                self.written,
                self.frames
            );
            let frame_size = self.sink.frame_size();
            self.out[self.written * frame_size..self.frames * frame_size].fill(0);
        }
        self.frames * self.sink.frame_size()
    }

    /// Store one converted frame at the cursor
    #[inline]
    fn put_frame(&mut self, left: i16, right: i16) {
        match self.sink.channels {
            ChannelLayout::Mono => {
                let at = self.written * 2;
                self.out[at..at + 2].copy_from_slice(&left.to_le_bytes());
            }
            ChannelLayout::Stereo => {
                let at = self.written * 4;
                self.out[at..at + 2].copy_from_slice(&left.to_le_bytes());
                self.out[at + 2..at + 4].copy_from_slice(&right.to_le_bytes());
            }
        }
        self.written += 1;
    }

    /// Clamp an incoming batch to the frames still free
    fn accept(&mut self, frames: usize) -> usize {
        let take = frames.min(self.remaining());
        self.overflow += frames - take;
        take
    }
}

impl SampleSink for BoundSink<'_> {
    fn add_samples_mono(&mut self, samples: &[i32]) {
        let take = self.accept(samples.len());
        let shift = self.sink.volume_shift;
        for &value in &samples[..take] {
            let converted = convert_sample(value, shift);
            // Mono into stereo duplicates the value into both slots.
            self.put_frame(converted, converted);
        }
    }

    fn add_samples_stereo(&mut self, samples: &[i32]) {
        let take = self.accept(samples.len() / 2);
        let shift = self.sink.volume_shift;
        let pairs = samples[..take * 2].chunks_exact(2);

        match (self.sink.channels, self.sink.downmix) {
            (ChannelLayout::Stereo, _) => {
                for pair in pairs {
                    let left = convert_sample(pair[0], shift);
                    let right = convert_sample(pair[1], shift);
                    self.put_frame(left, right);
                }
            }
            (ChannelLayout::Mono, Downmix::Average) => {
                for pair in pairs {
                    // The mean of two i32 values always fits in i32.
                    let mid = ((pair[0] as i64 + pair[1] as i64) / 2) as i32;
                    let converted = convert_sample(mid, shift);
                    self.put_frame(converted, converted);
                }
            }
            (ChannelLayout::Mono, Downmix::Reject) => {
                self.rejected = true;
            }
        }
    }
}
