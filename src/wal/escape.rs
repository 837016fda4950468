//! Field escaping for the line-oriented log format
//!
//! Bytes that would break a record (`\t`, `\n`, `\r`, other ASCII control
//! characters) and the escape byte `%` itself are written as `%XX`.
//! Everything else, including multi-byte UTF-8, passes through untouched.

use std::borrow::Cow;

use crate::error::{KvError, Result};

const HEX: &[u8; 16] = b"0123456789ABCDEF";

fn needs_escape(byte: u8) -> bool {
    byte == b'%' || byte < 0x20 || byte == 0x7f
}

/// Escape a field so it contains no delimiter or line break
pub fn escape(raw: &str) -> Cow<'_, str> {
    if !raw.bytes().any(needs_escape) {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        // Multi-byte chars never contain bytes below 0x80
        if ch.is_ascii() && needs_escape(ch as u8) {
            let byte = ch as u8;
            out.push('%');
            out.push(HEX[(byte >> 4) as usize] as char);
            out.push(HEX[(byte & 0x0f) as usize] as char);
        } else {
            out.push(ch);
        }
    }
    Cow::Owned(out)
}

/// Reverse [`escape`]
///
/// Fails with `KvError::Decode` on a truncated or non-hex `%` sequence, or
/// when the decoded bytes are not valid UTF-8.
pub fn unescape(encoded: &str) -> Result<Cow<'_, str>> {
    if !encoded.contains('%') {
        return Ok(Cow::Borrowed(encoded));
    }

    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = bytes.get(i + 1).and_then(|b| hex_value(*b));
            let lo = bytes.get(i + 2).and_then(|b| hex_value(*b));
            match (hi, lo) {
                (Some(hi), Some(lo)) => out.push((hi << 4) | lo),
                _ => {
                    return Err(KvError::Decode(format!(
                        "invalid escape at byte {} in '{}'",
                        i, encoded
                    )))
                }
            }
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out)
        .map(Cow::Owned)
        .map_err(|e| KvError::Decode(format!("escaped field is not UTF-8: {}", e)))
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
