//! OPL Register Map
//!
//! The chip exposes two banks of 256 registers. Bank 0 (0x000-0x0FF) is the
//! OPL2-compatible set; bank 1 (0x100-0x1FF) mirrors the operator and channel
//! registers for channels 9-17 and carries the OPL3 control registers.
//!
//! | Address     | Meaning                                             |
//! |-------------|-----------------------------------------------------|
//! | 0x01        | Test; bit 5 enables waveform select (OPL2)          |
//! | 0x02-0x04   | Timers (stored, not emulated)                       |
//! | 0x08        | CSM / note select (bit 6)                           |
//! | 0x20-0x35   | AM / VIB / EG type / KSR / MULT per operator        |
//! | 0x40-0x55   | KSL / total level per operator                      |
//! | 0x60-0x75   | Attack / decay rate per operator                    |
//! | 0x80-0x95   | Sustain level / release rate per operator           |
//! | 0xA0-0xA8   | F-number low byte per channel                       |
//! | 0xB0-0xB8   | Key on / block / F-number high bits per channel     |
//! | 0xBD        | Tremolo depth / vibrato depth / rhythm mode         |
//! | 0xC0-0xC8   | Output enable / feedback / connection per channel   |
//! | 0xE0-0xF5   | Waveform select per operator                        |
//! | 0x104       | 4-operator connection select (OPL3)                 |
//! | 0x105       | OPL3 mode enable (bit 0)                            |

use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Size of the register file (both banks)
pub const REGISTER_COUNT: usize = 0x200;

/// Key-on bit in the 0xB0 block
pub const KEY_ON: u8 = 0x20;

/// Note select bit in register 0x08
pub const NOTE_SELECT: u8 = 0x40;

/// OPL3 mode bit in register 0x105
pub const OPL3_ENABLE: u8 = 0x01;

/// Channels per register bank
pub const BANK_CHANNELS: usize = 9;

bitflags! {
    /// Operator flags in the 0x20 block (low nibble is the multiplier)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OperatorFlags: u8 {
        /// Tremolo (amplitude modulation)
        const TREMOLO = 0x80;
        /// Vibrato (frequency modulation)
        const VIBRATO = 0x40;
        /// Envelope type; set holds the sustain level while the key is down
        const SUSTAIN = 0x20;
        /// Key scale rate
        const KSR = 0x10;
    }
}

bitflags! {
    /// Channel control in the 0xC0 block (bits 1-3 are the feedback level)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChannelControl: u8 {
        /// Output D (OPL3)
        const OUT_D = 0x80;
        /// Output C (OPL3)
        const OUT_C = 0x40;
        /// Right output (OPL3)
        const RIGHT = 0x20;
        /// Left output (OPL3)
        const LEFT = 0x10;
        /// Additive synthesis instead of FM
        const ADDITIVE = 0x01;
    }
}

bitflags! {
    /// Register 0xBD
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RhythmControl: u8 {
        /// 4.8 dB tremolo instead of 1 dB
        const DEEP_TREMOLO = 0x80;
        /// 14 cent vibrato instead of 7 cent
        const DEEP_VIBRATO = 0x40;
        /// Percussion mode
        const RHYTHM = 0x20;
        /// Bass drum key-on
        const BASS_DRUM = 0x10;
        /// Snare drum key-on
        const SNARE_DRUM = 0x08;
        /// Tom-tom key-on
        const TOM_TOM = 0x04;
        /// Top cymbal key-on
        const CYMBAL = 0x02;
        /// Hi-hat key-on
        const HI_HAT = 0x01;
    }
}

bitflags! {
    /// Register 0x01
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TestControl: u8 {
        /// Allow waveforms other than sine (OPL2)
        const WAVE_SELECT = 0x20;
    }
}

/// Operator waveform (0xE0 block)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive)]
pub enum Waveform {
    /// Full sine
    #[default]
    Sine = 0,
    /// Positive half of the sine
    HalfSine = 1,
    /// Rectified sine
    AbsSine = 2,
    /// Rising quarter of each half period
    QuarterPulse = 3,
    /// Double-speed sine in the first half period (OPL3)
    AlternatingSine = 4,
    /// Double-speed rectified sine in the first half period (OPL3)
    CamelSine = 5,
    /// Square (OPL3)
    Square = 6,
    /// Logarithmic sawtooth (OPL3)
    LogSaw = 7,
}

impl Waveform {
    /// Decode a waveform register, keeping only the bits the chip honours
    ///
    /// # Arguments
    ///
    /// * `value` - Raw 0xE0 register value
    /// * `mask` - 0x07 in OPL3 mode, 0x03 with OPL2 waveform select, else 0
    pub fn from_register(value: u8, mask: u8) -> Self {
        Waveform::from_u8(value & mask & 0x07).unwrap_or_default()
    }
}

/// Per-operator register group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorParam {
    /// 0x20: flags and multiplier
    Flags,
    /// 0x40: key scale level and total level
    Level,
    /// 0x60: attack and decay rates
    AttackDecay,
    /// 0x80: sustain level and release rate
    SustainRelease,
    /// 0xE0: waveform
    Waveform,
}

/// What a register address controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// 0x01
    Test,
    /// 0x02-0x04
    Timer,
    /// 0x08
    NoteSelect,
    /// Operator register
    Operator {
        /// Register group
        param: OperatorParam,
        /// Channel 0-17
        channel: usize,
        /// 0 = modulator, 1 = carrier
        slot: usize,
    },
    /// 0xA0 block
    FrequencyLow(usize),
    /// 0xB0 block
    FrequencyHigh(usize),
    /// 0xC0 block
    Control(usize),
    /// 0xBD
    Rhythm,
    /// 0x104
    FourOp,
    /// 0x105
    Opl3Mode,
    /// Nothing behind this address
    Unmapped,
}

impl Register {
    /// Decode a register address
    pub fn decode(reg: u16) -> Register {
        if reg as usize >= REGISTER_COUNT {
            return Register::Unmapped;
        }
        let bank = (reg >> 8) as usize;
        let low = (reg & 0xFF) as u8;

        match low {
            0x01 if bank == 0 => Register::Test,
            0x02..=0x04 if bank == 0 => Register::Timer,
            0x04 => Register::FourOp,
            0x05 if bank == 1 => Register::Opl3Mode,
            0x08 if bank == 0 => Register::NoteSelect,
            0xBD if bank == 0 => Register::Rhythm,
            0x20..=0x35 | 0x40..=0x55 | 0x60..=0x75 | 0x80..=0x95 | 0xE0..=0xF5 => {
                let param = match low & 0xE0 {
                    0x20 => OperatorParam::Flags,
                    0x40 => OperatorParam::Level,
                    0x60 => OperatorParam::AttackDecay,
                    0x80 => OperatorParam::SustainRelease,
                    _ => OperatorParam::Waveform,
                };
                match operator_slot(low & 0x1F) {
                    Some((channel, slot)) => Register::Operator {
                        param,
                        channel: bank * BANK_CHANNELS + channel,
                        slot,
                    },
                    None => Register::Unmapped,
                }
            }
            0xA0..=0xA8 => Register::FrequencyLow(bank * BANK_CHANNELS + (low & 0x0F) as usize),
            0xB0..=0xB8 => Register::FrequencyHigh(bank * BANK_CHANNELS + (low & 0x0F) as usize),
            0xC0..=0xC8 => Register::Control(bank * BANK_CHANNELS + (low & 0x0F) as usize),
            _ => Register::Unmapped,
        }
    }
}

/// Map an operator offset (0x00-0x15) to (channel within bank, slot)
///
/// Offsets 0x06, 0x07, 0x0E and 0x0F have no operator behind them.
pub fn operator_slot(offset: u8) -> Option<(usize, usize)> {
    if offset > 0x15 || offset & 0x07 >= 6 {
        return None;
    }
    let group = (offset >> 3) as usize;
    let index = (offset & 0x07) as usize;
    Some((group * 3 + index % 3, index / 3))
}

/// Operator offsets (modulator, carrier) for each channel within a bank
pub const CHANNEL_OPERATORS: [(u8, u8); BANK_CHANNELS] = [
    (0x00, 0x03),
    (0x01, 0x04),
    (0x02, 0x05),
    (0x08, 0x0B),
    (0x09, 0x0C),
    (0x0A, 0x0D),
    (0x10, 0x13),
    (0x11, 0x14),
    (0x12, 0x15),
];

/// Raw register file
#[derive(Clone)]
pub struct RegisterBank {
    regs: [u8; REGISTER_COUNT],
}

impl RegisterBank {
    /// All registers zero
    pub fn new() -> Self {
        RegisterBank {
            regs: [0; REGISTER_COUNT],
        }
    }

    /// Store a value; out-of-range addresses are ignored
    pub fn write(&mut self, reg: u16, val: u8) {
        if let Some(slot) = self.regs.get_mut(reg as usize) {
            *slot = val;
        }
    }

    /// Last stored value, 0 for out-of-range addresses
    pub fn read(&self, reg: u16) -> u8 {
        self.regs.get(reg as usize).copied().unwrap_or(0)
    }

    /// Zero every register
    pub fn clear(&mut self) {
        self.regs.fill(0);
    }
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RegisterBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self.regs.iter().filter(|&&r| r != 0).count();
        f.debug_struct("RegisterBank")
            .field("nonzero", &used)
            .finish()
    }
}
