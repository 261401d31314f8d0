//! FM Operator
//!
//! One phase generator plus one envelope generator. Register values are
//! stored raw; derived per-sample quantities (phase step, key scale
//! attenuation, envelope steps) are recomputed by [`Operator::refresh`]
//! whenever an operator register or the owning channel's frequency changes.

use super::constants::{WaveTables, ENV_MAX, KSL_ROM, KSL_SHIFT, MULTIPLIER_X2, OPL_RATE};
use super::envelope::{attack_step, linear_step, sustain_level, Envelope, EnvelopeState};
use super::registers::{OperatorFlags, OperatorParam, Waveform};

/// Channel pitch as seen by its operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelFrequency {
    /// 10-bit F-number
    pub fnum: u16,
    /// Octave block (0-7)
    pub block: u8,
    /// Note select (register 0x08 bit 6)
    pub note_select: bool,
}

impl ChannelFrequency {
    /// Pitch in Hz before the operator multiplier
    pub fn hz(&self) -> f64 {
        self.fnum as f64 * (1u32 << self.block) as f64 * OPL_RATE / (1u32 << 20) as f64
    }

    /// Closest F-number/block pair for a pitch, using the lowest block that fits
    ///
    /// Returns `None` for pitches outside the chip's range.
    pub fn from_hz(hz: f64) -> Option<Self> {
        if !hz.is_finite() || hz <= 0.0 {
            return None;
        }
        (0u8..8).find_map(|block| {
            let fnum = (hz * (1u32 << 20) as f64 / (OPL_RATE * (1u32 << block) as f64)).round();
            (fnum < 1024.0).then_some(ChannelFrequency {
                fnum: fnum as u16,
                block,
                note_select: false,
            })
        })
    }

    /// 4-bit key code used by key scale rate
    pub fn key_code(&self) -> u8 {
        let bit = if self.note_select {
            (self.fnum >> 8) & 1
        } else {
            (self.fnum >> 9) & 1
        };
        (self.block << 1) | bit as u8
    }

    /// Key scale level attenuation before the KSL shift
    fn ksl_base(&self) -> u32 {
        let rom = (KSL_ROM[(self.fnum >> 6) as usize & 0x0F] as i32) << 2;
        let v = rom - ((8 - self.block as i32) << 5);
        v.max(0) as u32
    }
}

/// Per-sample modulation state shared by every operator
#[derive(Debug, Clone, Copy)]
pub struct SynthContext {
    /// Lookup tables
    pub tables: &'static WaveTables,
    /// Tremolo attenuation in envelope steps
    pub tremolo: u32,
    /// Current vibrato sequence value (-2..=2)
    pub vibrato: i32,
    /// Right shift turning the phase step into one vibrato unit
    pub vibrato_shift: u32,
    /// Waveform bits the chip currently honours
    pub wave_mask: u8,
}

/// One operator slot
#[derive(Debug, Clone, Default)]
pub struct Operator {
    flags: OperatorFlags,
    multiplier: u8,
    ksl: u8,
    total_level: u8,
    attack: u8,
    decay: u8,
    sustain: u8,
    release: u8,
    waveform: u8,

    phase: u32,
    phase_step: u32,
    ksl_attenuation: u32,
    envelope: Envelope,
}

impl Operator {
    /// Store a register value for this operator
    pub fn write(&mut self, param: OperatorParam, val: u8) {
        match param {
            OperatorParam::Flags => {
                self.flags = OperatorFlags::from_bits_truncate(val);
                self.multiplier = val & 0x0F;
            }
            OperatorParam::Level => {
                self.ksl = val >> 6;
                self.total_level = val & 0x3F;
            }
            OperatorParam::AttackDecay => {
                self.attack = val >> 4;
                self.decay = val & 0x0F;
            }
            OperatorParam::SustainRelease => {
                self.sustain = val >> 4;
                self.release = val & 0x0F;
            }
            OperatorParam::Waveform => self.waveform = val,
        }
    }

    /// Recompute derived state for the channel pitch and output rate
    pub fn refresh(&mut self, freq: ChannelFrequency, sample_rate: u32) {
        let hz = freq.hz() * MULTIPLIER_X2[self.multiplier as usize] as f64 / 2.0;
        let step = hz * 4_294_967_296.0 / sample_rate as f64;
        self.phase_step = step as u64 as u32;

        self.ksl_attenuation = match self.ksl {
            0 => 0,
            k => freq.ksl_base() >> KSL_SHIFT[k as usize],
        };

        let key_code = freq.key_code();
        let ksr_offset = if self.flags.contains(OperatorFlags::KSR) {
            key_code
        } else {
            key_code >> 2
        };
        self.envelope.configure(
            attack_step(self.attack, ksr_offset, sample_rate),
            linear_step(self.decay, ksr_offset, sample_rate),
            linear_step(self.release, ksr_offset, sample_rate),
            sustain_level(self.sustain),
            self.flags.contains(OperatorFlags::SUSTAIN),
        );
    }

    /// Key on: restart the phase and begin the attack
    pub fn key_on(&mut self) {
        self.phase = 0;
        self.envelope.key_on();
    }

    /// Key off: begin the release
    pub fn key_off(&mut self) {
        self.envelope.key_off();
    }

    /// Envelope phase
    pub fn envelope_state(&self) -> EnvelopeState {
        self.envelope.state()
    }

    /// Phase increment per output sample (32-bit accumulator)
    pub fn phase_step(&self) -> u32 {
        self.phase_step
    }

    /// Produce one sample
    ///
    /// # Arguments
    ///
    /// * `modulation` - Phase offset in 10-bit phase units
    /// * `ctx` - Shared LFO and table state
    pub fn sample(&mut self, modulation: i32, ctx: &SynthContext) -> i32 {
        let level = self.envelope.step();

        let mut step = self.phase_step;
        if self.flags.contains(OperatorFlags::VIBRATO) && ctx.vibrato != 0 {
            let unit = (self.phase_step >> ctx.vibrato_shift) as i32;
            step = step.wrapping_add_signed(unit * ctx.vibrato / 2);
        }
        let index = ((self.phase >> 22) as i32).wrapping_add(modulation) as u32;
        self.phase = self.phase.wrapping_add(step);

        if self.envelope.is_off() {
            return 0;
        }

        let mut attenuation = level + ((self.total_level as u32) << 2) + self.ksl_attenuation;
        if self.flags.contains(OperatorFlags::TREMOLO) {
            attenuation += ctx.tremolo;
        }
        let waveform = Waveform::from_register(self.waveform, ctx.wave_mask);
        ctx.tables.wave(waveform, index, attenuation.min(ENV_MAX))
    }
}
