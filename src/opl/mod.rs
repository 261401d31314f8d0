//! Reference OPL2/OPL3 FM engine
//!
//! A compact, deterministic model of the Yamaha YMF262 (OPL3) and its OPL2
//! subset. It follows the chip's register map, log-sine/exponent amplitude
//! path, envelope rates and FM routing closely enough for music playback,
//! but it is not cycle- or bit-exact.
//!
//! Components:
//! - [`registers`] - register map, decode and bit definitions
//! - [`constants`] - rate constants and lookup tables
//! - [`envelope`] - ADSR generator
//! - [`operator`] - phase generator plus envelope
//! - [`channel`] - two-operator FM/additive channel
//! - [`chip`] - the [`OplChip`] engine

pub mod channel;
pub mod chip;
pub mod constants;
pub mod envelope;
pub mod operator;
pub mod registers;

pub use chip::{OplChip, BLOCK_FRAMES, CHANNEL_COUNT};
pub use registers::Waveform;
