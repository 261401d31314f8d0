//! Envelope Generator
//!
//! ADSR state machine working in attenuation units (0 = full level,
//! [`ENV_MAX`] = silence). Attack is exponential, decay and release are
//! linear in the log domain. Rates are converted to per-sample steps in
//! 16.16 fixed point once, when the rate registers or the key scale change.

use super::constants::{ATTACK_FULL_MS, ATTACK_STEPS, DECAY_FULL_MS, ENV_MAX};

const FRACTION_BITS: u32 = 16;
const ONE: u64 = 1 << FRACTION_BITS;

/// Attack step value meaning "reach full level immediately"
pub const INSTANT: u64 = u64::MAX;

/// Envelope phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeState {
    /// Silent, generator idle
    #[default]
    Off,
    /// Rising towards full level
    Attack,
    /// Falling towards the sustain level
    Decay,
    /// Holding at the sustain level
    Sustain,
    /// Falling towards silence
    Release,
}

/// Effective rate (0-63) after key scaling, `None` for a zero rate register
pub fn effective_rate(rate: u8, ksr_offset: u8) -> Option<u32> {
    if rate == 0 {
        None
    } else {
        Some((4 * rate as u32 + ksr_offset as u32).min(63))
    }
}

/// Attack ticks per output sample in 16.16, or [`INSTANT`]
pub fn attack_step(rate: u8, ksr_offset: u8, sample_rate: u32) -> u64 {
    match effective_rate(rate, ksr_offset) {
        None => 0,
        Some(eff) if eff >= 60 => INSTANT,
        Some(eff) => {
            let ms = ATTACK_FULL_MS * 2.0_f64.powf(-((eff as f64 - 4.0) / 4.0));
            let per_sample = ATTACK_STEPS / (ms / 1000.0 * sample_rate as f64);
            to_fixed(per_sample)
        }
    }
}

/// Decay/release attenuation units per output sample in 16.16
pub fn linear_step(rate: u8, ksr_offset: u8, sample_rate: u32) -> u64 {
    match effective_rate(rate, ksr_offset) {
        None => 0,
        Some(eff) => {
            let eff = eff.min(60) as f64;
            let ms = DECAY_FULL_MS * 2.0_f64.powf(-((eff - 4.0) / 4.0));
            let per_sample = (ENV_MAX + 1) as f64 / (ms / 1000.0 * sample_rate as f64);
            to_fixed(per_sample)
        }
    }
}

fn to_fixed(per_sample: f64) -> u64 {
    ((per_sample * ONE as f64).round() as u64).max(1)
}

/// Sustain level register nibble to attenuation units
pub fn sustain_level(sl: u8) -> u32 {
    let sl = if sl == 15 { 31 } else { sl as u32 };
    (sl << 4).min(ENV_MAX)
}

/// One operator's envelope
#[derive(Debug, Clone)]
pub struct Envelope {
    state: EnvelopeState,
    level: u32,
    counter: u64,
    attack: u64,
    decay: u64,
    release: u64,
    sustain: u32,
    hold: bool,
}

impl Envelope {
    /// Silent envelope with zero rates
    pub fn new() -> Self {
        Envelope {
            state: EnvelopeState::Off,
            level: ENV_MAX,
            counter: 0,
            attack: 0,
            decay: 0,
            release: 0,
            sustain: 0,
            hold: false,
        }
    }

    /// Replace the per-sample steps and sustain behaviour
    pub fn configure(&mut self, attack: u64, decay: u64, release: u64, sustain: u32, hold: bool) {
        self.attack = attack;
        self.decay = decay;
        self.release = release;
        self.sustain = sustain;
        self.hold = hold;
    }

    /// Start the attack phase from the current level
    pub fn key_on(&mut self) {
        self.state = EnvelopeState::Attack;
        self.counter = 0;
    }

    /// Enter release unless already silent
    pub fn key_off(&mut self) {
        if self.state != EnvelopeState::Off {
            self.state = EnvelopeState::Release;
            self.counter = 0;
        }
    }

    /// Current phase
    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    /// Current attenuation
    pub fn level(&self) -> u32 {
        self.level
    }

    /// True once release has reached silence
    pub fn is_off(&self) -> bool {
        self.state == EnvelopeState::Off
    }

    /// Advance one output sample and return the attenuation
    pub fn step(&mut self) -> u32 {
        match self.state {
            EnvelopeState::Off | EnvelopeState::Sustain => {}
            EnvelopeState::Attack => {
                if self.attack == INSTANT {
                    self.level = 0;
                } else {
                    self.counter += self.attack;
                    while self.counter >= ONE && self.level > 0 {
                        self.counter -= ONE;
                        self.level -= (self.level >> 3) + 1;
                    }
                }
                if self.level == 0 {
                    self.state = EnvelopeState::Decay;
                    self.counter = 0;
                }
            }
            EnvelopeState::Decay => {
                if self.level < self.sustain {
                    self.fall(self.decay);
                }
                if self.level >= self.sustain {
                    self.level = self.sustain;
                    self.counter = 0;
                    // Without EG type set, the sustain phase keeps falling at the release rate.
                    self.state = if self.hold {
                        EnvelopeState::Sustain
                    } else {
                        EnvelopeState::Release
                    };
                }
            }
            EnvelopeState::Release => {
                self.fall(self.release);
                if self.level >= ENV_MAX {
                    self.level = ENV_MAX;
                    self.state = EnvelopeState::Off;
                }
            }
        }
        self.level
    }

    fn fall(&mut self, step: u64) {
        self.counter += step;
        let whole = self.counter >> FRACTION_BITS;
        self.counter &= ONE - 1;
        self.level = (self.level as u64 + whole).min(ENV_MAX as u64) as u32;
    }

    /// Back to silence
    pub fn reset(&mut self) {
        *self = Envelope::new();
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps_until(env: &mut Envelope, state: EnvelopeState, limit: usize) -> Option<usize> {
        (1..=limit).find(|_| {
            env.step();
            env.state() == state
        })
    }

    #[test]
    fn test_effective_rate() {
        assert_eq!(effective_rate(0, 15), None);
        assert_eq!(effective_rate(1, 0), Some(4));
        assert_eq!(effective_rate(15, 15), Some(63));
    }

    #[test]
    fn test_fast_attack_is_instant() {
        assert_eq!(attack_step(15, 0, 44_100), INSTANT);
        let mut env = Envelope::new();
        env.configure(INSTANT, 0, 0, 0, true);
        env.key_on();
        assert_eq!(env.step(), 0);
    }

    #[test]
    fn test_zero_attack_never_rises() {
        let mut env = Envelope::new();
        env.configure(attack_step(0, 0, 44_100), 0, 0, 0, true);
        env.key_on();
        for _ in 0..1000 {
            assert_eq!(env.step(), ENV_MAX);
        }
    }

    #[test]
    fn test_attack_duration_tracks_rate() {
        // rate 10 -> effective 40 -> 2826.24 * 2^-9 = 5.52 ms
        let rate = 44_100;
        let mut env = Envelope::new();
        env.configure(attack_step(10, 0, rate), 0, 0, 0, true);
        env.key_on();
        let samples = steps_until(&mut env, EnvelopeState::Sustain, 10_000).unwrap();
        let expected = 5.52e-3 * rate as f64;
        assert!(
            (samples as f64 - expected).abs() < expected * 0.1,
            "{samples} samples vs {expected}"
        );
    }

    #[test]
    fn test_decay_stops_at_sustain_level() {
        let mut env = Envelope::new();
        env.configure(INSTANT, linear_step(12, 0, 44_100), 0, sustain_level(4), true);
        env.key_on();
        steps_until(&mut env, EnvelopeState::Sustain, 100_000).unwrap();
        assert_eq!(env.level(), 64);
        for _ in 0..100 {
            assert_eq!(env.step(), 64);
        }
    }

    #[test]
    fn test_no_hold_releases_after_decay() {
        let mut env = Envelope::new();
        env.configure(INSTANT, linear_step(15, 0, 44_100), linear_step(15, 0, 44_100), 0, false);
        env.key_on();
        assert!(steps_until(&mut env, EnvelopeState::Off, 100_000).is_some());
    }

    #[test]
    fn test_release_reaches_silence() {
        let rate = 44_100;
        let mut env = Envelope::new();
        env.configure(INSTANT, 0, linear_step(8, 0, rate), 0, true);
        env.key_on();
        env.step();
        env.key_off();
        // rate 8 -> effective 32 -> 39280.64 * 2^-7 = 306.9 ms
        let samples = steps_until(&mut env, EnvelopeState::Off, 100_000).unwrap();
        let expected = 0.3069 * rate as f64;
        assert!((samples as f64 - expected).abs() < expected * 0.05);
        assert_eq!(env.level(), ENV_MAX);
    }

    #[test]
    fn test_key_off_when_silent_stays_off() {
        let mut env = Envelope::new();
        env.key_off();
        assert!(env.is_off());
    }

    #[test]
    fn test_sustain_level_table() {
        assert_eq!(sustain_level(0), 0);
        assert_eq!(sustain_level(1), 16);
        assert_eq!(sustain_level(15), 496);
    }
}
