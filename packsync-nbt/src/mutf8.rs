//! Java "modified UTF-8" as used by `DataOutput::writeUTF`.
//!
//! NUL is written as `C0 80` and characters outside the BMP as a surrogate
//! pair of three-byte sequences. Decoding also accepts regular four-byte
//! UTF-8 sequences, which some third-party writers emit.

use crate::NbtError;

pub fn encode(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

pub fn decode(bytes: &[u8]) -> Result<String, NbtError> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            units.push(u16::from(b0));
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = continuation(bytes, i + 1)?;
            units.push((u16::from(b0 & 0x1F) << 6) | u16::from(b1));
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = continuation(bytes, i + 1)?;
            let b2 = continuation(bytes, i + 2)?;
            units.push((u16::from(b0 & 0x0F) << 12) | (u16::from(b1) << 6) | u16::from(b2));
            i += 3;
        } else if b0 & 0xF8 == 0xF0 {
            let b1 = continuation(bytes, i + 1)?;
            let b2 = continuation(bytes, i + 2)?;
            let b3 = continuation(bytes, i + 3)?;
            let code = (u32::from(b0 & 0x07) << 18)
                | (u32::from(b1) << 12)
                | (u32::from(b2) << 6)
                | u32::from(b3);
            let ch = char::from_u32(code).ok_or(NbtError::InvalidString)?;
            let mut pair = [0u16; 2];
            units.extend_from_slice(ch.encode_utf16(&mut pair));
            i += 4;
        } else {
            return Err(NbtError::InvalidString);
        }
    }
    String::from_utf16(&units).map_err(|_| NbtError::InvalidString)
}

fn continuation(bytes: &[u8], index: usize) -> Result<u8, NbtError> {
    match bytes.get(index) {
        Some(b) if b & 0xC0 == 0x80 => Ok(b & 0x3F),
        _ => Err(NbtError::InvalidString),
    }
}
