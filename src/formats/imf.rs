//! IMF Format Parser
//!
//! Records are 4 bytes: register, value, and a little-endian delay in ticks
//! to wait after the write.
//!
//! Type-0 files are nothing but records. Type-1 files start with a
//! little-endian word giving the length of the record block in bytes and may
//! carry a trailer (title, composer) after it, which is ignored. A file
//! whose first word is zero is type 0.

use super::{Song, SongEvent, SongParser, IMF_TICK_RATE};
use crate::{OplError, Result};
use nom::multi::many0;
use nom::number::complete::{le_u16, le_u8};
use nom::sequence::tuple;
use nom::IResult;

/// IMF parser
#[derive(Debug, Clone, Copy)]
pub struct ImfParser {
    tick_rate: u32,
}

impl ImfParser {
    /// Parser for files played at `tick_rate` Hz
    pub fn new(tick_rate: u32) -> Self {
        ImfParser { tick_rate }
    }

    /// Tick rate applied to parsed songs
    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }
}

impl Default for ImfParser {
    fn default() -> Self {
        Self::new(IMF_TICK_RATE)
    }
}

fn record(input: &[u8]) -> IResult<&[u8], (u8, u8, u16)> {
    tuple((le_u8, le_u8, le_u16))(input)
}

/// Slice out the record block
fn record_block(data: &[u8]) -> Result<&[u8]> {
    if data.len() < 2 {
        return Err(OplError::ParseError(
            "IMF file is too short to hold a record".into(),
        ));
    }
    let length = u16::from_le_bytes([data[0], data[1]]) as usize;
    if length == 0 {
        return Ok(data);
    }
    if length > data.len() - 2 {
        return Err(OplError::ParseError(format!(
            "IMF type-1 header claims {} bytes of records but only {} follow",
            length,
            data.len() - 2
        )));
    }
    Ok(&data[2..2 + length])
}

impl SongParser for ImfParser {
    fn parse(&self, data: &[u8]) -> Result<Song> {
        let block = record_block(data)?;
        let (rest, records) = many0(record)(block)
            .map_err(|e| OplError::ParseError(format!("IMF record parse failed: {e}")))?;
        if !rest.is_empty() {
            log::warn!("IMF: ignoring {} trailing byte(s) after the last record", rest.len());
        }

        let mut events = Vec::with_capacity(records.len() * 2);
        for (reg, val, delay) in records {
            events.push(SongEvent::Write {
                reg: reg as u16,
                val,
            });
            if delay > 0 {
                events.push(SongEvent::Delay(delay as u32));
            }
        }
        Ok(Song::new(events, self.tick_rate))
    }

    fn name(&self) -> &str {
        "IMF"
    }
}
