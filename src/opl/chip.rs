//! OPL2/OPL3 chip
//!
//! Register file, 18 two-operator channels and the shared LFOs. In OPL2 mode
//! (the power-on default) channels 0-8 are mixed to one mono stream. Setting
//! bit 0 of register 0x105 switches to OPL3 mode: all 18 channels run and
//! are routed to the left and right outputs by bits 4 and 5 of their 0xC0
//! register, and the chip produces interleaved stereo.
//!
//! Rhythm mode and 4-operator channels are accepted and stored but not
//! synthesized; channels configured that way keep playing as plain
//! 2-operator melodic voices.

use super::channel::Channel;
use super::constants::{
    tables, TREMOLO_DEPTH_DEEP, TREMOLO_DEPTH_SHALLOW, TREMOLO_HZ, VIBRATO_HZ, VIBRATO_STEPS,
};
use super::operator::SynthContext;
use super::registers::{
    ChannelControl, Register, RegisterBank, RhythmControl, TestControl, BANK_CHANNELS,
    CHANNEL_OPERATORS, NOTE_SELECT, OPL3_ENABLE,
};
use crate::backend::OplEngine;
use crate::config::{DEFAULT_SAMPLE_RATE, MAX_RENDER_FRAMES};
use crate::sink::SampleSink;

/// Total channel count across both banks
pub const CHANNEL_COUNT: usize = 2 * BANK_CHANNELS;

/// Frames generated per sink callback
pub const BLOCK_FRAMES: usize = MAX_RENDER_FRAMES;

/// Tremolo and vibrato oscillators
#[derive(Debug, Clone, Default)]
struct Lfo {
    tremolo_phase: u32,
    tremolo_step: u32,
    vibrato_phase: u32,
    vibrato_step: u32,
}

impl Lfo {
    fn new(sample_rate: u32) -> Self {
        let step = |hz: f64| (hz * 4_294_967_296.0 / sample_rate as f64) as u64 as u32;
        Lfo {
            tremolo_phase: 0,
            tremolo_step: step(TREMOLO_HZ),
            vibrato_phase: 0,
            vibrato_step: step(VIBRATO_HZ),
        }
    }

    /// Current (tremolo, vibrato, vibrato shift), then advance one sample
    fn tick(&mut self, depth: RhythmControl) -> (u32, i32, u32) {
        let position = self.tremolo_phase >> 24;
        let triangle = if position < 128 { position } else { 255 - position };
        let max = if depth.contains(RhythmControl::DEEP_TREMOLO) {
            TREMOLO_DEPTH_DEEP
        } else {
            TREMOLO_DEPTH_SHALLOW
        };
        let tremolo = triangle * max / 127;

        let vibrato = VIBRATO_STEPS[(self.vibrato_phase >> 29) as usize];
        let shift = if depth.contains(RhythmControl::DEEP_VIBRATO) { 7 } else { 8 };

        self.tremolo_phase = self.tremolo_phase.wrapping_add(self.tremolo_step);
        self.vibrato_phase = self.vibrato_phase.wrapping_add(self.vibrato_step);
        (tremolo, vibrato, shift)
    }
}

/// Reference OPL2/OPL3 FM engine
#[derive(Clone)]
pub struct OplChip {
    sample_rate: u32,
    registers: RegisterBank,
    channels: [Channel; CHANNEL_COUNT],
    lfo: Lfo,
    depth: RhythmControl,
    wave_select: bool,
    note_select: bool,
    opl3: bool,
    mix: Vec<i32>,
}

impl OplChip {
    /// Create a chip running at the native OPL output rate
    pub fn new() -> Self {
        Self::with_sample_rate(DEFAULT_SAMPLE_RATE)
    }

    /// Create a chip at the given output rate, with the power-on voice loaded
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        let mut chip = OplChip {
            sample_rate,
            registers: RegisterBank::new(),
            channels: Default::default(),
            lfo: Lfo::new(sample_rate.max(1)),
            depth: RhythmControl::empty(),
            wave_select: false,
            note_select: false,
            opl3: false,
            mix: vec![0; 2 * BLOCK_FRAMES],
        };
        chip.init(sample_rate);
        chip
    }

    /// Output sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Whether OPL3 mode is enabled
    pub fn is_opl3(&self) -> bool {
        self.opl3
    }

    /// Whether the key is held on a channel (0-17)
    pub fn is_key_on(&self, channel: usize) -> bool {
        self.channels.get(channel).is_some_and(Channel::is_key_on)
    }

    /// Pitch of a channel in Hz, before operator multipliers
    pub fn channel_frequency(&self, channel: usize) -> Option<f64> {
        self.channels
            .get(channel)
            .map(|ch| ch.frequency(self.note_select).hz())
    }

    /// Load a simple sustained sine voice on every channel
    ///
    /// The modulator is silent (attack rate 0) and the carrier attacks
    /// instantly, holds full level while keyed and releases at the fastest
    /// rate. F-number low bytes are set to 0xFF so a bare key-on write to the
    /// 0xB0 block is audible.
    fn load_power_on_voice(&mut self) {
        for bank in [0x000u16, 0x100] {
            for (ch, &(modulator, carrier)) in CHANNEL_OPERATORS.iter().enumerate() {
                let m = bank | modulator as u16;
                let c = bank | carrier as u16;
                for (reg, val) in [
                    (0x20 + m, 0x01),
                    (0x40 + m, 0x3F),
                    (0x60 + m, 0x00),
                    (0x80 + m, 0x0F),
                    (0x20 + c, 0x21),
                    (0x40 + c, 0x00),
                    (0x60 + c, 0xF0),
                    (0x80 + c, 0x0F),
                ] {
                    self.write_reg(reg, val);
                }
                let ch = bank | ch as u16;
                self.write_reg(0xA0 + ch, 0xFF);
                self.write_reg(0xC0 + ch, 0x30);
            }
        }
    }

    fn refresh_all(&mut self) {
        for ch in &mut self.channels {
            ch.refresh(self.note_select, self.sample_rate);
        }
    }

    fn wave_mask(&self) -> u8 {
        if self.opl3 {
            0x07
        } else if self.wave_select {
            0x03
        } else {
            0x00
        }
    }

    fn context(&mut self, wave_mask: u8) -> SynthContext {
        let (tremolo, vibrato, vibrato_shift) = self.lfo.tick(self.depth);
        SynthContext {
            tables: tables(),
            tremolo,
            vibrato,
            vibrato_shift,
            wave_mask,
        }
    }

    fn render_mono(&mut self, frames: usize) {
        let wave_mask = self.wave_mask();
        for i in 0..frames {
            let ctx = self.context(wave_mask);
            self.mix[i] = self.channels[..BANK_CHANNELS]
                .iter_mut()
                .map(|ch| ch.sample(&ctx))
                .sum::<i32>();
        }
    }

    fn render_stereo(&mut self, frames: usize) {
        let wave_mask = self.wave_mask();
        for i in 0..frames {
            let ctx = self.context(wave_mask);
            let (mut left, mut right) = (0, 0);
            for ch in &mut self.channels {
                let s = ch.sample(&ctx);
                let control = ch.control();
                if control.contains(ChannelControl::LEFT) {
                    left += s;
                }
                if control.contains(ChannelControl::RIGHT) {
                    right += s;
                }
            }
            self.mix[2 * i] = left;
            self.mix[2 * i + 1] = right;
        }
    }
}

impl Default for OplChip {
    fn default() -> Self {
        Self::new()
    }
}

impl OplEngine for OplChip {
    fn init(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.lfo = Lfo::new(sample_rate.max(1));
        self.reset();
        self.load_power_on_voice();
    }

    fn write_reg(&mut self, reg: u16, val: u8) {
        self.registers.write(reg, val);
        let rate = self.sample_rate;
        let nts = self.note_select;

        match Register::decode(reg) {
            Register::Test => {
                self.wave_select =
                    TestControl::from_bits_truncate(val).contains(TestControl::WAVE_SELECT);
            }
            Register::NoteSelect => {
                self.note_select = val & NOTE_SELECT != 0;
                self.refresh_all();
            }
            Register::Operator {
                param,
                channel,
                slot,
            } => self.channels[channel].write_operator(slot, param, val, nts, rate),
            Register::FrequencyLow(ch) => self.channels[ch].write_frequency_low(val, nts, rate),
            Register::FrequencyHigh(ch) => self.channels[ch].write_frequency_high(val, nts, rate),
            Register::Control(ch) => self.channels[ch].write_control(val),
            Register::Rhythm => {
                let depth = RhythmControl::from_bits_truncate(val);
                let entering = !self.depth.contains(RhythmControl::RHYTHM);
                if depth.contains(RhythmControl::RHYTHM) && entering {
                    log::warn!("rhythm mode is not synthesized; channels 6-8 stay melodic");
                }
                self.depth = depth;
            }
            Register::FourOp => {
                if val & 0x3F != 0 {
                    log::warn!(
                        "4-operator mode ({val:#04x}) is not synthesized; using 2-operator channels"
                    );
                }
            }
            Register::Opl3Mode => {
                let opl3 = val & OPL3_ENABLE != 0;
                if opl3 != self.opl3 {
                    log::debug!("OPL3 mode {}", if opl3 { "enabled" } else { "disabled" });
                }
                self.opl3 = opl3;
            }
            Register::Timer | Register::Unmapped => {}
        }
    }

    fn read_reg(&self, reg: u16) -> u8 {
        self.registers.read(reg)
    }

    fn generate(&mut self, sink: &mut dyn SampleSink, frames: usize) {
        let mut left = frames;
        while left > 0 {
            let n = left.min(BLOCK_FRAMES);
            if self.opl3 {
                self.render_stereo(n);
                sink.add_samples_stereo(&self.mix[..2 * n]);
            } else {
                self.render_mono(n);
                sink.add_samples_mono(&self.mix[..n]);
            }
            left -= n;
        }
    }

    fn is_stereo(&self) -> bool {
        self.opl3
    }

    fn reset(&mut self) {
        self.registers.clear();
        self.channels.iter_mut().for_each(Channel::reset);
        self.lfo = Lfo::new(self.sample_rate.max(1));
        self.depth = RhythmControl::empty();
        self.wave_select = false;
        self.note_select = false;
        self.opl3 = false;
    }
}

impl std::fmt::Debug for OplChip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keyed: Vec<usize> = (0..CHANNEL_COUNT).filter(|&c| self.is_key_on(c)).collect();
        f.debug_struct("OplChip")
            .field("sample_rate", &self.sample_rate)
            .field("opl3", &self.opl3)
            .field("keyed_channels", &keyed)
            .field("registers", &self.registers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Capture {
        mono: Vec<i32>,
        stereo: Vec<i32>,
        calls: usize,
    }

    impl SampleSink for Capture {
        fn add_samples_mono(&mut self, samples: &[i32]) {
            self.mono.extend_from_slice(samples);
            self.calls += 1;
        }

        fn add_samples_stereo(&mut self, samples: &[i32]) {
            self.stereo.extend_from_slice(samples);
            self.calls += 1;
        }
    }

    fn render(chip: &mut OplChip, frames: usize) -> Capture {
        let mut cap = Capture::default();
        chip.generate(&mut cap, frames);
        cap
    }

    #[test]
    fn test_silent_without_key_on() {
        let mut chip = OplChip::with_sample_rate(44_100);
        let cap = render(&mut chip, 1000);
        assert_eq!(cap.mono.len(), 1000);
        assert!(cap.mono.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_key_on_alone_is_audible() {
        let mut chip = OplChip::with_sample_rate(44_100);
        chip.write_reg(0xB0, 0x20);
        let cap = render(&mut chip, 512);
        assert!(cap.mono.iter().any(|&s| s != 0));
    }

    #[test]
    fn test_generate_splits_into_blocks() {
        let mut chip = OplChip::with_sample_rate(44_100);
        let cap = render(&mut chip, 1300);
        assert_eq!(cap.calls, 3);
        assert_eq!(cap.mono.len(), 1300);
        assert!(render(&mut chip, 0).calls == 0);
    }

    #[test]
    fn test_register_readback() {
        let mut chip = OplChip::new();
        chip.write_reg(0x40, 0x12);
        chip.write_reg(0x1C3, 0x31);
        assert_eq!(chip.read_reg(0x40), 0x12);
        assert_eq!(chip.read_reg(0x1C3), 0x31);
        assert_eq!(chip.read_reg(0x300), 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut chip = OplChip::with_sample_rate(44_100);
        chip.write_reg(0x105, 0x01);
        chip.write_reg(0xB0, 0x20);
        chip.reset();
        assert!(!chip.is_opl3());
        assert!(!chip.is_key_on(0));
        assert_eq!(chip.read_reg(0xA0), 0);

        // no voice after a reset, key-on alone stays silent
        chip.write_reg(0xB0, 0x20);
        let cap = render(&mut chip, 512);
        assert!(cap.mono.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_opl3_switches_to_stereo() {
        let mut chip = OplChip::with_sample_rate(44_100);
        assert!(!chip.is_stereo());
        chip.write_reg(0x105, 0x01);
        assert!(chip.is_stereo());

        chip.write_reg(0xC0, 0x10); // left only
        chip.write_reg(0xB0, 0x20);
        let cap = render(&mut chip, 256);
        assert!(cap.mono.is_empty());
        assert_eq!(cap.stereo.len(), 512);
        let (left, right): (Vec<i32>, Vec<i32>) =
            cap.stereo.chunks_exact(2).map(|p| (p[0], p[1])).unzip();
        assert!(left.iter().any(|&s| s != 0));
        assert!(right.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_second_bank_needs_opl3() {
        let mut chip = OplChip::with_sample_rate(44_100);
        chip.write_reg(0x1B0, 0x20);
        assert!(chip.is_key_on(9));
        let cap = render(&mut chip, 256);
        assert!(cap.mono.iter().all(|&s| s == 0));

        chip.write_reg(0x105, 0x01);
        let cap = render(&mut chip, 256);
        assert!(cap.stereo.iter().any(|&s| s != 0));
    }

    #[test]
    fn test_deterministic() {
        let run = || {
            let mut chip = OplChip::with_sample_rate(48_000);
            chip.write_reg(0xA0, 0x98);
            chip.write_reg(0xB0, 0x31);
            render(&mut chip, 2048).mono
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_channel_frequency() {
        let mut chip = OplChip::new();
        chip.write_reg(0xA3, 0x44);
        chip.write_reg(0xB3, 0x12);
        let hz = chip.channel_frequency(3).unwrap();
        assert!((hz - 440.0).abs() < 1.0, "{hz}");
        assert!(chip.channel_frequency(18).is_none());
    }
}
