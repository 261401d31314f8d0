//! DRO v2 Format Parser
//!
//! DOSBox Raw OPL captures. Layout (all integers little-endian):
//!
//! ```text
//! "DBRAWOPL"  8 bytes
//! major       u16   (2)
//! minor       u16   (0)
//! pairs       u32   number of register/value pairs
//! length_ms   u32
//! hardware    u8    0 = OPL2, 1 = dual OPL2, 2 = OPL3
//! format      u8    0 = interleaved (only one defined)
//! compression u8    0 = none (only one defined)
//! short_delay u8    code meaning "delay val + 1 ms"
//! long_delay  u8    code meaning "delay (val + 1) * 256 ms"
//! codemap_len u8
//! codemap     codemap_len bytes, index -> register
//! data        pairs * 2 bytes
//! ```
//!
//! In the data, bit 7 of a register code selects the second register bank.

use super::{Song, SongEvent, SongParser, DRO_TICK_RATE};
use crate::{OplError, Result};
use nom::bytes::complete::{tag, take};
use nom::number::complete::{le_u16, le_u32, le_u8};
use nom::IResult;

/// File signature
pub const MAGIC: &[u8] = b"DBRAWOPL";

/// Hardware the capture was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroHardware {
    /// Single OPL2
    Opl2,
    /// Two OPL2 chips
    DualOpl2,
    /// OPL3
    Opl3,
    /// Unknown hardware code
    Other(u8),
}

impl From<u8> for DroHardware {
    fn from(code: u8) -> Self {
        match code {
            0 => DroHardware::Opl2,
            1 => DroHardware::DualOpl2,
            2 => DroHardware::Opl3,
            other => DroHardware::Other(other),
        }
    }
}

/// Parsed DRO v2 header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroHeader {
    /// Register/value pairs in the data block
    pub pairs: u32,
    /// Song length in milliseconds
    pub length_ms: u32,
    /// Capture hardware
    pub hardware: DroHardware,
    /// Data format code
    pub format: u8,
    /// Compression code
    pub compression: u8,
    /// Short delay code
    pub short_delay: u8,
    /// Long delay code
    pub long_delay: u8,
    /// Register code table
    pub codemap: Vec<u8>,
}

fn version(input: &[u8]) -> IResult<&[u8], (u16, u16)> {
    let (input, _) = tag(MAGIC)(input)?;
    let (input, major) = le_u16(input)?;
    let (input, minor) = le_u16(input)?;
    Ok((input, (major, minor)))
}

fn header_v2(input: &[u8]) -> IResult<&[u8], DroHeader> {
    let (input, pairs) = le_u32(input)?;
    let (input, length_ms) = le_u32(input)?;
    let (input, hardware) = le_u8(input)?;
    let (input, format) = le_u8(input)?;
    let (input, compression) = le_u8(input)?;
    let (input, short_delay) = le_u8(input)?;
    let (input, long_delay) = le_u8(input)?;
    let (input, codemap_len) = le_u8(input)?;
    let (input, codemap) = take(codemap_len)(input)?;
    Ok((
        input,
        DroHeader {
            pairs,
            length_ms,
            hardware: hardware.into(),
            format,
            compression,
            short_delay,
            long_delay,
            codemap: codemap.to_vec(),
        },
    ))
}

/// Parse the header, returning it and the data block
pub fn parse_header(data: &[u8]) -> Result<(DroHeader, &[u8])> {
    let (rest, (major, minor)) =
        version(data).map_err(|_| OplError::ParseError("not a DRO file".into()))?;
    if major != 2 {
        return Err(OplError::ParseError(format!(
            "DRO version {major}.{minor} is not supported (expected 2.0)"
        )));
    }
    let (rest, header) = header_v2(rest)
        .map_err(|_| OplError::ParseError("DRO header is truncated".into()))?;
    if header.format != 0 || header.compression != 0 {
        return Err(OplError::ParseError(format!(
            "DRO format {} / compression {} is not supported",
            header.format, header.compression
        )));
    }
    Ok((header, rest))
}

/// DRO v2 parser
#[derive(Debug, Clone, Copy, Default)]
pub struct DroParser;

impl SongParser for DroParser {
    fn parse(&self, data: &[u8]) -> Result<Song> {
        let (header, body) = parse_header(data)?;

        let wanted = header.pairs as usize * 2;
        let body = if body.len() < wanted {
            log::warn!(
                "DRO: header lists {} pairs but only {} are present",
                header.pairs,
                body.len() / 2
            );
            &body[..body.len() & !1]
        } else {
            &body[..wanted]
        };

        let mut events = Vec::with_capacity(body.len() / 2);
        for pair in body.chunks_exact(2) {
            let (code, val) = (pair[0], pair[1]);
            if code == header.short_delay {
                events.push(SongEvent::Delay(val as u32 + 1));
            } else if code == header.long_delay {
                events.push(SongEvent::Delay((val as u32 + 1) << 8));
            } else {
                let bank = ((code & 0x80) as u16) << 1;
                let index = (code & 0x7F) as usize;
                let reg = header.codemap.get(index).copied().ok_or_else(|| {
                    OplError::ParseError(format!(
                        "DRO register code {index} is outside the {}-entry codemap",
                        header.codemap.len()
                    ))
                })?;
                events.push(SongEvent::Write {
                    reg: bank | reg as u16,
                    val,
                });
            }
        }

        log::debug!(
            "DRO: {:?}, {} ms, {} events",
            header.hardware,
            header.length_ms,
            events.len()
        );
        Ok(Song::new(events, DRO_TICK_RATE))
    }

    fn name(&self) -> &str {
        "DRO"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(codemap: &[u8], pairs: &[(u8, u8)], version: (u16, u16)) -> Vec<u8> {
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&version.0.to_le_bytes());
        data.extend_from_slice(&version.1.to_le_bytes());
        data.extend_from_slice(&(pairs.len() as u32).to_le_bytes());
        data.extend_from_slice(&1000u32.to_le_bytes());
        data.extend_from_slice(&[2, 0, 0, 0xFE, 0xFF, codemap.len() as u8]);
        data.extend_from_slice(codemap);
        for &(r, v) in pairs {
            data.extend_from_slice(&[r, v]);
        }
        data
    }

    #[test]
    fn test_parse_events() {
        let data = build(
            &[0xA0, 0xB0, 0x05],
            &[(0x00, 0x44), (0x01, 0x32), (0xFE, 9), (0xFF, 1), (0x82, 0x01), (0x81, 0x20)],
            (2, 0),
        );
        let song = DroParser.parse(&data).unwrap();
        assert_eq!(song.tick_rate, 1000);
        assert_eq!(
            song.events,
            vec![
                SongEvent::Write { reg: 0xA0, val: 0x44 },
                SongEvent::Write { reg: 0xB0, val: 0x32 },
                SongEvent::Delay(10),
                SongEvent::Delay(512),
                SongEvent::Write { reg: 0x105, val: 0x01 },
                SongEvent::Write { reg: 0x1B0, val: 0x20 },
            ]
        );
        assert!(song.uses_opl3());
    }

    #[test]
    fn test_header_fields() {
        let data = build(&[0xB0], &[(0, 0x20)], (2, 0));
        let (header, body) = parse_header(&data).unwrap();
        assert_eq!(header.hardware, DroHardware::Opl3);
        assert_eq!(header.pairs, 1);
        assert_eq!(header.short_delay, 0xFE);
        assert_eq!(body, &[0, 0x20]);
    }

    #[test]
    fn test_rejects_v1() {
        let data = build(&[], &[], (0, 1));
        assert!(matches!(DroParser.parse(&data), Err(OplError::ParseError(_))));
    }

    #[test]
    fn test_rejects_compression() {
        let mut data = build(&[0xB0], &[], (2, 0));
        data[22] = 1;
        assert!(DroParser.parse(&data).is_err());
    }

    #[test]
    fn test_codemap_overflow() {
        let data = build(&[0xB0], &[(0x05, 0x20)], (2, 0));
        assert!(DroParser.parse(&data).is_err());
    }

    #[test]
    fn test_short_body_is_truncated() {
        let mut data = build(&[0xB0], &[(0, 0x20), (0, 0x00)], (2, 0));
        data.truncate(data.len() - 1);
        let song = DroParser.parse(&data).unwrap();
        assert_eq!(song.write_count(), 1);
    }

    #[test]
    fn test_not_dro() {
        assert!(DroParser.parse(b"RIFF....").is_err());
    }
}
