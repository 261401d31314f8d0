//! Engine trait abstraction
//!
//! This module defines the interface the bridge consumes from an FM chip
//! engine. The engine is opaque to the bridge: it owns its register file and
//! synthesis state, and hands generated samples to a [`SampleSink`].

use crate::sink::SampleSink;

/// Common interface for FM chip engines driven by the bridge
///
/// # Example
///
/// ```
/// use opl_bridge::{OplChip, OplEngine, SampleSink};
///
/// struct Peak(i32);
///
/// impl SampleSink for Peak {
///     fn add_samples_mono(&mut self, samples: &[i32]) {
///         self.0 = samples.iter().fold(self.0, |m, s| m.max(s.abs()));
///     }
///     fn add_samples_stereo(&mut self, samples: &[i32]) {
///         self.add_samples_mono(samples);
///     }
/// }
///
/// let mut chip = OplChip::new();
/// chip.init(44_100);
/// chip.write_reg(0xB0, 0x20); // key on channel 0
///
/// let mut peak = Peak(0);
/// chip.generate(&mut peak, 512);
/// assert!(peak.0 > 0);
/// ```
pub trait OplEngine: Send {
    /// Initialize the engine for the given output sample rate
    ///
    /// Called exactly once by the instance manager, after configuration has
    /// been validated. The rate is fixed for the lifetime of the engine.
    fn init(&mut self, sample_rate: u32);

    /// Write a register
    ///
    /// # Arguments
    ///
    /// * `reg` - Register address; engines ignore addresses they do not map
    /// * `val` - Register value
    fn write_reg(&mut self, reg: u16, val: u8);

    /// Read back the last value written to a register
    ///
    /// # Returns
    ///
    /// Register value, or 0x00 for unmapped addresses
    fn read_reg(&self, reg: u16) -> u8;

    /// Generate exactly `frames` frames into `sink`
    ///
    /// The engine calls [`SampleSink::add_samples_mono`] or
    /// [`SampleSink::add_samples_stereo`] zero or more times, in time order,
    /// covering `frames` frames in aggregate, before returning.
    fn generate(&mut self, sink: &mut dyn SampleSink, frames: usize);

    /// Whether the next [`generate`](OplEngine::generate) produces stereo pairs
    fn is_stereo(&self) -> bool {
        false
    }

    /// Clear every register to zero and silence all generators
    ///
    /// This is a hardware-style reset; any voice preloaded by `init` is gone
    /// afterwards.
    fn reset(&mut self);
}
