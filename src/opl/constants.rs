//! OPL Hardware Constants
//!
//! Shared constants and lookup tables used across the FM engine components.
//!
//! Amplitudes are handled in the log domain the way the chip does it: a
//! quarter-wave log-sine table gives the attenuation of the waveform, the
//! envelope and level attenuations are added to it, and an exponential table
//! turns the sum back into a linear amplitude.

use std::f64::consts::PI;
use std::sync::OnceLock;

use super::registers::Waveform;

/// Native chip output rate (14.31818 MHz / 288)
pub const OPL_RATE: f64 = 14_318_180.0 / 288.0;

/// Envelope attenuation at silence (9 bits, 0.1875 dB per step)
pub const ENV_MAX: u32 = 511;

/// Frequency multiplier table, doubled so the 0.5 entry stays integral
pub const MULTIPLIER_X2: [u32; 16] = [1, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 20, 24, 24, 30, 30];

/// Key scale level attenuation per F-number high nibble
pub const KSL_ROM: [u8; 16] = [0, 32, 40, 45, 48, 51, 53, 55, 56, 58, 59, 60, 61, 62, 63, 64];

/// Right shift applied to the KSL attenuation for each KSL register setting
///
/// Index 0 (no scaling) is never used; 1 = 3 dB/oct, 2 = 1.5 dB/oct, 3 = 6 dB/oct.
pub const KSL_SHIFT: [u32; 4] = [0, 1, 2, 0];

/// Vibrato offset sequence, eight steps per LFO period
pub const VIBRATO_STEPS: [i32; 8] = [0, 1, 2, 1, 0, -1, -2, -1];

/// Tremolo LFO frequency in Hz
pub const TREMOLO_HZ: f64 = 3.7;

/// Vibrato LFO frequency in Hz
pub const VIBRATO_HZ: f64 = 6.07;

/// Tremolo depth in envelope steps (4.8 dB)
pub const TREMOLO_DEPTH_DEEP: u32 = 26;

/// Tremolo depth in envelope steps (1 dB)
pub const TREMOLO_DEPTH_SHALLOW: u32 = 5;

/// Attack time from silence to full level at effective rate 4, in ms
pub const ATTACK_FULL_MS: f64 = 2826.24;

/// Decay/release time across the full 96 dB range at effective rate 4, in ms
pub const DECAY_FULL_MS: f64 = 39280.64;

/// Attack ticks needed to go from silence to full level
pub const ATTACK_STEPS: f64 = 35.0;

/// Largest linear output of a single operator
pub const OPERATOR_PEAK: i32 = 4096;

/// Log-domain waveform lookup tables
#[derive(Debug)]
pub struct WaveTables {
    /// Quarter sine, as attenuation in 1/256 octave steps
    pub log_sin: [u16; 256],
    /// `2^(-i/256)` scaled to [`OPERATOR_PEAK`]
    pub exp: [u16; 256],
}

static TABLES: OnceLock<WaveTables> = OnceLock::new();

/// Shared lookup tables, built on first use
pub fn tables() -> &'static WaveTables {
    TABLES.get_or_init(WaveTables::build)
}

impl WaveTables {
    fn build() -> Self {
        let mut log_sin = [0u16; 256];
        let mut exp = [0u16; 256];
        for i in 0..256 {
            let s = ((i as f64 + 0.5) * (PI / 512.0)).sin();
            log_sin[i] = (-s.log2() * 256.0).round() as u16;
            exp[i] = (2.0_f64.powf(-(i as f64) / 256.0) * OPERATOR_PEAK as f64).round() as u16;
        }
        WaveTables { log_sin, exp }
    }

    /// Log-sine attenuation for a 10-bit phase (sign handled by the caller)
    #[inline]
    fn log_sin(&self, index: u32) -> u32 {
        let quarter = if index & 0x100 != 0 {
            !index & 0xFF
        } else {
            index & 0xFF
        };
        self.log_sin[quarter as usize] as u32
    }

    /// Linear amplitude for a total attenuation in 1/256 octave steps
    #[inline]
    fn amplitude(&self, attenuation: u32) -> i32 {
        let shift = attenuation >> 8;
        if shift > 12 {
            0
        } else {
            (self.exp[(attenuation & 0xFF) as usize] >> shift) as i32
        }
    }

    /// One waveform sample
    ///
    /// # Arguments
    ///
    /// * `waveform` - Waveform select
    /// * `index` - Phase; only the low 10 bits are used
    /// * `envelope` - Envelope attenuation in 0.1875 dB steps (0-511)
    pub fn wave(&self, waveform: Waveform, index: u32, envelope: u32) -> i32 {
        let index = index & 0x3FF;
        let (log, negative) = match waveform {
            Waveform::Sine => (self.log_sin(index), index & 0x200 != 0),
            Waveform::HalfSine => {
                if index & 0x200 != 0 {
                    return 0;
                }
                (self.log_sin(index), false)
            }
            Waveform::AbsSine => (self.log_sin(index), false),
            Waveform::QuarterPulse => {
                if index & 0x100 != 0 {
                    return 0;
                }
                (self.log_sin(index), false)
            }
            Waveform::AlternatingSine => {
                if index & 0x200 != 0 {
                    return 0;
                }
                (self.log_sin(index << 1), index & 0x100 != 0)
            }
            Waveform::CamelSine => {
                if index & 0x200 != 0 {
                    return 0;
                }
                (self.log_sin(index << 1), false)
            }
            Waveform::Square => (0, index & 0x200 != 0),
            Waveform::LogSaw => {
                if index & 0x200 != 0 {
                    ((!index & 0x1FF) << 3, true)
                } else {
                    ((index & 0x1FF) << 3, false)
                }
            }
        };

        let magnitude = self.amplitude(log + (envelope << 3));
        if negative {
            -magnitude
        } else {
            magnitude
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_edges() {
        let t = tables();
        assert_eq!(t.exp[0], OPERATOR_PEAK as u16);
        assert!(t.exp[255] > 2000 && t.exp[255] < 2100);
        // the quarter-sine peak sits at the end of the table
        assert!(t.log_sin[255] < 2);
        assert!(t.log_sin[0] > 2000);
    }

    #[test]
    fn test_sine_is_antisymmetric() {
        let t = tables();
        for index in [10u32, 100, 255, 300, 511] {
            assert_eq!(t.wave(Waveform::Sine, index, 0), -t.wave(Waveform::Sine, index + 512, 0));
        }
    }

    #[test]
    fn test_sine_peak_at_quarter() {
        let t = tables();
        let peak = t.wave(Waveform::Sine, 256, 0);
        assert!(peak > 4000, "peak was {peak}");
        assert!(t.wave(Waveform::Sine, 768, 0) < -4000);
    }

    #[test]
    fn test_half_sine_silences_negative_half() {
        let t = tables();
        assert!(t.wave(Waveform::HalfSine, 256, 0) > 0);
        assert_eq!(t.wave(Waveform::HalfSine, 768, 0), 0);
    }

    #[test]
    fn test_envelope_attenuates() {
        let t = tables();
        let full = t.wave(Waveform::Sine, 256, 0);
        // 32 steps = 6 dB, half amplitude
        let half = t.wave(Waveform::Sine, 256, 32);
        assert!((half - full / 2).abs() <= 2, "{half} vs {full}");
        assert_eq!(t.wave(Waveform::Sine, 256, ENV_MAX), 0);
    }

    #[test]
    fn test_square_is_full_scale() {
        let t = tables();
        assert_eq!(t.wave(Waveform::Square, 0, 0), OPERATOR_PEAK);
        assert_eq!(t.wave(Waveform::Square, 600, 0), -OPERATOR_PEAK);
    }
}
