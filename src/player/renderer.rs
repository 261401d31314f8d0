//! Song Renderer
//!
//! Plays a [`Song`] through an [`OplInstance`]: register writes go straight
//! to the engine, delays become rendered audio. Each render call stays inside
//! the instance's buffer policy; frames too few for one call are carried into
//! the next delay, and any final remainder is rendered with padding and
//! trimmed, so the output length is exact.

use super::frame_clock::FrameClock;
use crate::backend::OplEngine;
use crate::config::BridgeConfig;
use crate::formats::{Song, SongEvent};
use crate::instance::OplInstance;
use crate::opl::OplChip;
use crate::{OplError, Result};

/// Totals from one playback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Register writes performed
    pub writes: usize,
    /// Frames emitted
    pub frames: u64,
    /// Render calls made
    pub render_calls: usize,
}

/// Drives an instance through songs
#[derive(Debug)]
pub struct SongRenderer<E: OplEngine = OplChip> {
    instance: OplInstance<E>,
    buffer: Vec<u8>,
    wave_select: bool,
}

impl SongRenderer<OplChip> {
    /// Renderer around a new instance with the reference engine
    pub fn with_config(config: BridgeConfig) -> Result<Self> {
        Ok(Self::new(OplInstance::with_config(config)?))
    }
}

impl<E: OplEngine> SongRenderer<E> {
    /// Wrap an existing instance
    pub fn new(instance: OplInstance<E>) -> Self {
        let bytes = instance.config().buffer_policy.max_frames * instance.frame_size();
        SongRenderer {
            instance,
            buffer: vec![0; bytes],
            wave_select: true,
        }
    }

    /// Whether playback enables OPL2 waveform select (register 0x01 bit 5)
    /// right after the reset. On by default; songs that set it themselves
    /// are unaffected either way.
    pub fn set_wave_select(&mut self, enabled: bool) {
        self.wave_select = enabled;
    }

    /// Play a song from the start, handing each rendered chunk to `on_chunk`
    ///
    /// The engine is reset before the first event, then waveform select is
    /// enabled unless turned off with [`set_wave_select`](Self::set_wave_select).
    pub fn play<F>(&mut self, song: &Song, mut on_chunk: F) -> Result<PlaybackStats>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        if song.tick_rate == 0 {
            return Err(OplError::InvalidConfiguration(
                "song tick rate must be positive".into(),
            ));
        }

        self.instance.reset();
        if self.wave_select {
            self.instance.write_register(0x01, 0x20);
        }
        let mut clock = FrameClock::new(self.instance.sample_rate(), song.tick_rate);
        let mut stats = PlaybackStats::default();
        let mut pending: u64 = 0;

        for event in &song.events {
            match *event {
                SongEvent::Write { reg, val } => {
                    self.instance.write_register(reg, val);
                    stats.writes += 1;
                }
                SongEvent::Delay(ticks) => {
                    pending += clock.advance(ticks);
                    pending = self.flush(pending, &mut stats, &mut on_chunk)?;
                }
            }
        }

        if pending > 0 {
            self.flush_tail(pending as usize, &mut stats, &mut on_chunk)?;
        }

        log::debug!(
            "played {} writes, {} frames ({:.1}s) in {} render calls",
            stats.writes,
            stats.frames,
            clock.elapsed_secs(),
            stats.render_calls
        );
        Ok(stats)
    }

    /// Play a song and collect the whole output
    pub fn render_song(&mut self, song: &Song) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.play(song, |chunk| {
            out.extend_from_slice(chunk);
            Ok(())
        })?;
        Ok(out)
    }

    /// Render as much of `pending` as the policy allows, returning the carry
    fn flush<F>(
        &mut self,
        mut pending: u64,
        stats: &mut PlaybackStats,
        on_chunk: &mut F,
    ) -> Result<u64>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let policy = self.instance.config().buffer_policy;
        let (min, max) = (policy.min_frames as u64, policy.max_frames as u64);

        while pending >= min {
            let mut take = pending.min(max);
            let rest = pending - take;
            // Leave a renderable remainder rather than a stranded one.
            if rest > 0 && rest < min && pending - min >= min {
                take = pending - min;
            }
            self.render_chunk(take as usize, take as usize, stats, on_chunk)?;
            pending -= take;
        }
        Ok(pending)
    }

    /// Emit the final frames, padding the render up to the policy minimum
    fn flush_tail<F>(
        &mut self,
        pending: usize,
        stats: &mut PlaybackStats,
        on_chunk: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let min = self.instance.config().buffer_policy.min_frames;
        self.render_chunk(pending.max(min), pending, stats, on_chunk)
    }

    fn render_chunk<F>(
        &mut self,
        frames: usize,
        emit: usize,
        stats: &mut PlaybackStats,
        on_chunk: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let frame_size = self.instance.frame_size();
        let bytes = frames * frame_size;
        self.instance.render(&mut self.buffer[..bytes])?;
        on_chunk(&self.buffer[..emit * frame_size])?;
        stats.frames += emit as u64;
        stats.render_calls += 1;
        Ok(())
    }

    /// Borrow the instance
    pub fn instance(&self) -> &OplInstance<E> {
        &self.instance
    }

    /// Borrow the instance mutably
    pub fn instance_mut(&mut self) -> &mut OplInstance<E> {
        &mut self.instance
    }

    /// Give back the instance
    pub fn into_inner(self) -> OplInstance<E> {
        self.instance
    }
}
