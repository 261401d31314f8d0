//! Instance Manager
//!
//! An [`OplInstance`] owns one engine and one [`PcmSink`]. Construction
//! validates the whole configuration before the engine is allocated, so a
//! failed construction leaves nothing behind. Dropping the instance (or
//! calling [`OplInstance::destroy`]) releases both.

use crate::backend::OplEngine;
use crate::config::{BridgeConfig, ChannelLayout, Downmix};
use crate::opl::OplChip;
use crate::sink::PcmSink;
use crate::{OplError, Result};

/// A live engine plus its sample sink
///
/// Not internally synchronized: share across threads only behind a lock.
pub struct OplInstance<E: OplEngine = OplChip> {
    config: BridgeConfig,
    engine: E,
    sink: PcmSink,
}

impl OplInstance<OplChip> {
    /// Create an instance with the reference engine
    ///
    /// # Arguments
    ///
    /// * `sample_rate` - Output rate in Hz (must be positive)
    /// * `sample_size` - Bytes per sample component (must be 2)
    /// * `channels` - 1 for mono, 2 for stereo
    pub fn new(sample_rate: u32, sample_size: u8, channels: u8) -> Result<Self> {
        let config = BridgeConfig::new(sample_rate, sample_size, channels)?;
        Self::with_config(config)
    }

    /// Create an instance with the reference engine from a full configuration
    pub fn with_config(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        Self::with_engine(config, OplChip::new())
    }
}

impl<E: OplEngine> OplInstance<E> {
    /// Create an instance around a caller-supplied engine
    ///
    /// The engine is initialized at the configured sample rate only after the
    /// configuration has been accepted.
    pub fn with_engine(config: BridgeConfig, mut engine: E) -> Result<Self> {
        config.validate()?;
        engine.init(config.sample_rate);
        let sink = PcmSink::new(config.channels, config.volume_shift, config.downmix)?;

        log::debug!(
            "created OPL instance: {} Hz, {} output, buffer {}..={} frames",
            config.sample_rate,
            config.channels,
            config.buffer_policy.min_frames,
            config.buffer_policy.max_frames
        );

        Ok(OplInstance {
            config,
            engine,
            sink,
        })
    }

    /// Write a chip register
    pub fn write_register(&mut self, reg: u16, val: u8) {
        log::trace!("write reg {reg:#05x} = {val:#04x}");
        self.engine.write_reg(reg, val);
    }

    /// Read back a chip register
    pub fn read_register(&self, reg: u16) -> u8 {
        self.engine.read_reg(reg)
    }

    /// Clear the engine register file to zeros
    pub fn reset(&mut self) {
        log::debug!("resetting OPL engine");
        self.engine.reset();
    }

    /// Render audio into a caller buffer
    ///
    /// The frame count is `out.len() / frame_size()`; trailing bytes that do
    /// not make a whole frame are left untouched. Returns the number of bytes
    /// written.
    ///
    /// # Errors
    ///
    /// * [`OplError::BufferSizeError`] when the frame count is outside the
    ///   configured buffer policy
    /// * [`OplError::UnsupportedConversion`] when the engine is producing
    ///   stereo and this mono instance uses [`Downmix::Reject`]
    ///
    /// Both are reported before anything is written.
    pub fn render(&mut self, out: &mut [u8]) -> Result<usize> {
        let frames = self.config.frames_for(out.len());
        self.config.buffer_policy.check(frames)?;
        self.check_conversion()?;

        let used = frames * self.config.frame_size();
        let mut bound = self.sink.bind(&mut out[..used]);
        self.engine.generate(&mut bound, frames);

        if bound.rejected() {
            return Err(OplError::UnsupportedConversion(
                "engine switched to stereo output during render into a mono instance".into(),
            ));
        }
        Ok(bound.finish())
    }

    /// Render `frames` frames into a newly allocated buffer
    pub fn render_frames(&mut self, frames: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; frames * self.config.frame_size()];
        self.render(&mut out)?;
        Ok(out)
    }

    fn check_conversion(&self) -> Result<()> {
        if self.engine.is_stereo()
            && self.config.channels == ChannelLayout::Mono
            && self.config.downmix == Downmix::Reject
        {
            return Err(OplError::UnsupportedConversion(
                "stereo engine output cannot be written to a mono instance (downmix is set to reject)"
                    .into(),
            ));
        }
        Ok(())
    }

    /// Release the engine and sink
    pub fn destroy(self) {
        drop(self);
    }

    /// Output sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Output channel layout
    pub fn channels(&self) -> ChannelLayout {
        self.config.channels
    }

    /// Bytes per output frame
    pub fn frame_size(&self) -> usize {
        self.config.frame_size()
    }

    /// Whole frames that fit in `len` bytes
    pub fn frames_for(&self, len: usize) -> usize {
        self.config.frames_for(len)
    }

    /// Active configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Borrow the engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Borrow the engine mutably
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}

impl<E: OplEngine> Drop for OplInstance<E> {
    fn drop(&mut self) {
        log::debug!("releasing OPL instance ({} Hz)", self.config.sample_rate);
    }
}

impl<E: OplEngine> std::fmt::Debug for OplInstance<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OplInstance")
            .field("config", &self.config)
            .field("sink", &self.sink)
            .finish()
    }
}
