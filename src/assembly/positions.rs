//! Position table codec.
//!
//! The table maps byte offsets of the unit stream to source positions. It starts at the
//! first position of the code unit and stores one `(byte delta, position delta)` byte pair
//! per change:
//!
//! * byte deltas larger than 255 are split into `(255, 0)` pairs,
//! * position deltas outside `-128..=127` are split into zero-advance pairs carrying `127`
//!   (or `-128`), the byte delta travels with the first pair,
//! * decreasing positions use the two's-complement byte.
//!
//! Decoding applies a position delta after its byte delta, so a position becomes active at
//! the offset reached once every pair in front of it has been consumed.

use crate::Result;

/// A position change at a byte offset of the unit stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionEntry {
    /// Byte offset of the first instruction at this position
    pub offset: u32,
    /// Source position
    pub line: u32,
}

impl PositionEntry {
    /// Creates a new entry.
    #[must_use]
    pub fn new(offset: u32, line: u32) -> Self {
        PositionEntry { offset, line }
    }
}

/// Encodes `entries`, which must be sorted by offset, into `(first position, table)`.
///
/// Without entries the table is empty and `default_first_line` is reported.
#[must_use]
pub fn encode_positions(entries: &[PositionEntry], default_first_line: u32) -> (u32, Vec<u8>) {
    let Some(first) = entries.first() else {
        return (default_first_line, Vec::new());
    };

    let mut table = Vec::new();
    let mut previous = PositionEntry::new(0, first.line);

    for entry in entries {
        let mut byte_delta = entry.offset.saturating_sub(previous.offset);
        let mut line_delta = i64::from(entry.line) - i64::from(previous.line);

        while byte_delta > 255 {
            table.extend_from_slice(&[255, 0]);
            byte_delta -= 255;
        }
        while line_delta > 127 {
            table.extend_from_slice(&[byte_delta as u8, 127]);
            line_delta -= 127;
            byte_delta = 0;
        }
        while line_delta < -128 {
            table.extend_from_slice(&[byte_delta as u8, 0x80]);
            line_delta += 128;
            byte_delta = 0;
        }
        if byte_delta != 0 || line_delta != 0 {
            table.extend_from_slice(&[byte_delta as u8, (line_delta as i8) as u8]);
        }

        previous = *entry;
    }

    (first.line, table)
}

/// Decodes a table produced by [`encode_positions`] into the offsets at which the position
/// changes. The first entry is always at offset 0.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the table has an odd length or drives the position
/// below zero.
pub fn decode_positions(first_line: u32, table: &[u8]) -> Result<Vec<PositionEntry>> {
    if table.len() % 2 != 0 {
        return Err(malformed_error!(
            "Position table has an odd length of {}",
            table.len()
        ));
    }

    let mut entries = Vec::new();
    let mut line = i64::from(first_line);
    let mut last_line = None;
    let mut offset: u32 = 0;

    let emit = |offset: u32, line: i64, entries: &mut Vec<PositionEntry>| -> Result<()> {
        let line = u32::try_from(line)
            .map_err(|_| malformed_error!("Position table moves to line {}", line))?;
        entries.push(PositionEntry::new(offset, line));
        Ok(())
    };

    for pair in table.chunks_exact(2) {
        let byte_delta = pair[0];
        let line_delta = i64::from(pair[1] as i8);

        if byte_delta != 0 {
            if last_line != Some(line) {
                emit(offset, line, &mut entries)?;
                last_line = Some(line);
            }
            offset += u32::from(byte_delta);
        }
        line += line_delta;
    }

    if last_line != Some(line) {
        emit(offset, line, &mut entries)?;
    }

    Ok(entries)
}
