//! Two-operator FM channel

use super::operator::{ChannelFrequency, Operator, SynthContext};
use super::registers::{ChannelControl, OperatorParam, KEY_ON};

/// A modulator/carrier pair with its frequency, feedback and output routing
#[derive(Debug, Clone, Default)]
pub struct Channel {
    operators: [Operator; 2],
    fnum: u16,
    block: u8,
    key_on: bool,
    feedback: u8,
    control: ChannelControl,
    history: [i32; 2],
}

impl Channel {
    /// Write an operator register (`slot` 0 = modulator, 1 = carrier)
    pub fn write_operator(
        &mut self,
        slot: usize,
        param: OperatorParam,
        val: u8,
        note_select: bool,
        sample_rate: u32,
    ) {
        let freq = self.frequency(note_select);
        let op = &mut self.operators[slot];
        op.write(param, val);
        op.refresh(freq, sample_rate);
    }

    /// 0xA0: F-number low byte
    pub fn write_frequency_low(&mut self, val: u8, note_select: bool, sample_rate: u32) {
        self.fnum = (self.fnum & 0x300) | val as u16;
        self.refresh(note_select, sample_rate);
    }

    /// 0xB0: key on, block and F-number high bits
    pub fn write_frequency_high(&mut self, val: u8, note_select: bool, sample_rate: u32) {
        self.fnum = (self.fnum & 0x0FF) | (((val & 0x03) as u16) << 8);
        self.block = (val >> 2) & 0x07;
        self.refresh(note_select, sample_rate);

        let key = val & KEY_ON != 0;
        if key && !self.key_on {
            self.operators.iter_mut().for_each(Operator::key_on);
        } else if !key && self.key_on {
            self.operators.iter_mut().for_each(Operator::key_off);
        }
        self.key_on = key;
    }

    /// 0xC0: output routing, feedback and connection
    pub fn write_control(&mut self, val: u8) {
        self.control = ChannelControl::from_bits_truncate(val);
        self.feedback = (val >> 1) & 0x07;
    }

    /// Recompute both operators after a pitch or rate change
    pub fn refresh(&mut self, note_select: bool, sample_rate: u32) {
        let freq = self.frequency(note_select);
        for op in &mut self.operators {
            op.refresh(freq, sample_rate);
        }
    }

    /// Current pitch
    pub fn frequency(&self, note_select: bool) -> ChannelFrequency {
        ChannelFrequency {
            fnum: self.fnum,
            block: self.block,
            note_select,
        }
    }

    /// Whether the key is held
    pub fn is_key_on(&self) -> bool {
        self.key_on
    }

    /// Output routing bits
    pub fn control(&self) -> ChannelControl {
        self.control
    }

    /// Borrow an operator
    pub fn operator(&self, slot: usize) -> &Operator {
        &self.operators[slot]
    }

    /// Produce one sample
    pub fn sample(&mut self, ctx: &SynthContext) -> i32 {
        let feedback = match self.feedback {
            0 => 0,
            fb => (self.history[0] + self.history[1]) >> (9 - fb),
        };
        let modulator = self.operators[0].sample(feedback, ctx);
        self.history = [self.history[1], modulator];

        if self.control.contains(ChannelControl::ADDITIVE) {
            modulator + self.operators[1].sample(0, ctx)
        } else {
            self.operators[1].sample(modulator, ctx)
        }
    }

    /// Back to power-on state
    pub fn reset(&mut self) {
        *self = Channel::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opl::constants::tables;
    use crate::opl::envelope::EnvelopeState;

    fn ctx() -> SynthContext {
        SynthContext {
            tables: tables(),
            tremolo: 0,
            vibrato: 0,
            vibrato_shift: 8,
            wave_mask: 0,
        }
    }

    fn voiced() -> Channel {
        let mut ch = Channel::default();
        ch.write_operator(1, OperatorParam::Flags, 0x21, false, 44_100);
        ch.write_operator(1, OperatorParam::AttackDecay, 0xF0, false, 44_100);
        ch.write_operator(1, OperatorParam::SustainRelease, 0x0F, false, 44_100);
        ch.write_frequency_low(0x44, false, 44_100);
        ch
    }

    #[test]
    fn test_key_on_edge() {
        let mut ch = voiced();
        ch.write_frequency_high(0x32, false, 44_100);
        assert!(ch.is_key_on());
        assert_eq!(ch.frequency(false).fnum, 0x244);
        assert_eq!(ch.frequency(false).block, 4);
        assert_eq!(ch.operator(1).envelope_state(), EnvelopeState::Attack);

        ch.write_frequency_high(0x12, false, 44_100);
        assert!(!ch.is_key_on());
        assert_eq!(ch.operator(1).envelope_state(), EnvelopeState::Release);
    }

    #[test]
    fn test_carrier_sounds_after_key_on() {
        let mut ch = voiced();
        let ctx = ctx();
        assert!((0..100).all(|_| ch.sample(&ctx) == 0));
        ch.write_frequency_high(0x32, false, 44_100);
        assert!((0..200).any(|_| ch.sample(&ctx) != 0));
    }

    #[test]
    fn test_control_decode() {
        let mut ch = Channel::default();
        ch.write_control(0x3B);
        assert!(ch.control().contains(ChannelControl::LEFT | ChannelControl::RIGHT));
        assert!(ch.control().contains(ChannelControl::ADDITIVE));
        assert_eq!(ch.feedback, 5);
    }

    #[test]
    fn test_reset_silences() {
        let mut ch = voiced();
        ch.write_frequency_high(0x32, false, 44_100);
        ch.reset();
        assert!(!ch.is_key_on());
        let ctx = ctx();
        assert!((0..100).all(|_| ch.sample(&ctx) == 0));
    }
}
