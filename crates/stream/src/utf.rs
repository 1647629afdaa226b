//! Modified UTF-8
//!
//! Strings are encoded as UTF-16 code units, each written as 1-3 bytes:
//!
//! ```text
//! U+0001..U+007F   0xxxxxxx
//! U+0000, U+0080.. 110xxxxx 10xxxxxx           (U+0000 is C0 80)
//! U+0800..U+FFFF   1110xxxx 10xxxxxx 10xxxxxx
//! ```
//!
//! Supplementary characters are written as a surrogate pair, 3 bytes per
//! surrogate, so the encoding never contains a 4-byte sequence or a NUL.

use objstream_core::{Error, Result};

/// Encoded length of a string in bytes
pub fn encoded_len(s: &str) -> usize {
    s.encode_utf16().map(unit_len).sum()
}

fn unit_len(unit: u16) -> usize {
    match unit {
        0x0001..=0x007F => 1,
        0x0000 | 0x0080..=0x07FF => 2,
        _ => 3,
    }
}

/// Encode a string
pub fn encode(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    encode_into(s, &mut out);
    out
}

/// Append the encoding of a string to `out`
pub fn encode_into(s: &str, out: &mut Vec<u8>) {
    for unit in s.encode_utf16() {
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
}

/// Decode bytes into a string
///
/// Fails on malformed sequences and on unpaired surrogates.
pub fn decode(bytes: &[u8]) -> Result<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b >> 4 {
            0x0..=0x7 => {
                units.push(u16::from(b));
                i += 1;
            }
            0xC | 0xD => {
                let b2 = continuation(bytes, i + 1)?;
                units.push((u16::from(b & 0x1F) << 6) | u16::from(b2 & 0x3F));
                i += 2;
            }
            0xE => {
                let b2 = continuation(bytes, i + 1)?;
                let b3 = continuation(bytes, i + 2)?;
                units.push(
                    (u16::from(b & 0x0F) << 12)
                        | (u16::from(b2 & 0x3F) << 6)
                        | u16::from(b3 & 0x3F),
                );
                i += 3;
            }
            _ => {
                return Err(Error::malformed(format!(
                    "malformed input around byte {}",
                    i
                )))
            }
        }
    }
    String::from_utf16(&units)
        .map_err(|_| Error::malformed("string contains an unpaired surrogate"))
}

fn continuation(bytes: &[u8], index: usize) -> Result<u8> {
    match bytes.get(index) {
        Some(b) if b & 0xC0 == 0x80 => Ok(*b),
        Some(_) => Err(Error::malformed(format!(
            "malformed input around byte {}",
            index
        ))),
        None => Err(Error::malformed("partial character at end of string")),
    }
}
