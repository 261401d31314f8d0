//! Tick-to-Frame Clock
//!
//! Converts song delays, counted in ticks of the song's tick rate, into
//! output frames. The fractional part of each conversion is carried into the
//! next one, so a song always renders to `total_ticks * sample_rate /
//! tick_rate` frames (rounded down) no matter how its delays are split.

/// Tick-to-frame converter with exact remainder carry
#[derive(Debug, Clone)]
pub struct FrameClock {
    sample_rate: u64,
    tick_rate: u64,
    /// Leftover `ticks * sample_rate` not yet turned into a frame
    remainder: u64,
    ticks: u64,
    frames: u64,
}

impl FrameClock {
    /// Create a clock; `tick_rate` must be non-zero
    pub fn new(sample_rate: u32, tick_rate: u32) -> Self {
        FrameClock {
            sample_rate: sample_rate as u64,
            tick_rate: tick_rate.max(1) as u64,
            remainder: 0,
            ticks: 0,
            frames: 0,
        }
    }

    /// Advance by `ticks`, returning the frames that elapsed
    pub fn advance(&mut self, ticks: u32) -> u64 {
        let scaled = ticks as u64 * self.sample_rate + self.remainder;
        let frames = scaled / self.tick_rate;
        self.remainder = scaled % self.tick_rate;
        self.ticks += ticks as u64;
        self.frames += frames;
        frames
    }

    /// Ticks consumed so far
    pub fn elapsed_ticks(&self) -> u64 {
        self.ticks
    }

    /// Frames produced so far
    pub fn elapsed_frames(&self) -> u64 {
        self.frames
    }

    /// Elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.ticks as f64 / self.tick_rate as f64
    }

    /// Back to zero
    pub fn reset(&mut self) {
        self.remainder = 0;
        self.ticks = 0;
        self.frames = 0;
    }
}
