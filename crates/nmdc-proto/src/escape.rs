//! DCN escaping for out-of-band bytes.
//!
//! Bytes that would break NMDC framing inside a lock/key payload are written
//! as `/%DCN000%/`-style sequences holding the decimal byte value.

use std::borrow::Cow;

/// Bytes that must be escaped inside a key.
pub const DCN_ESCAPED: [u8; 6] = [0, 5, 36, 96, 124, 126];

#[inline]
fn needs_escape(byte: u8) -> bool {
    DCN_ESCAPED.contains(&byte)
}

/// Escape every reserved byte as `/%DCNnnn%/`.
pub fn escape_dcn(input: &[u8]) -> Cow<'_, [u8]> {
    if !input.iter().copied().any(needs_escape) {
        return Cow::Borrowed(input);
    }
    let mut out = Vec::with_capacity(input.len() + 16);
    for &byte in input {
        if needs_escape(byte) {
            out.extend_from_slice(b"/%DCN");
            out.push(b'0' + byte / 100);
            out.push(b'0' + (byte / 10) % 10);
            out.push(b'0' + byte % 10);
            out.extend_from_slice(b"%/");
        } else {
            out.push(byte);
        }
    }
    Cow::Owned(out)
}

/// Reverse [`escape_dcn`]. Sequences that are not well-formed are kept as-is.
pub fn unescape_dcn(input: &[u8]) -> Cow<'_, [u8]> {
    const PREFIX: &[u8] = b"/%DCN";
    if !input.windows(PREFIX.len()).any(|w| w == PREFIX) {
        return Cow::Borrowed(input);
    }
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if let Some(byte) = decode_sequence(&input[i..]) {
            out.push(byte);
            i += 10;
        } else {
            out.push(input[i]);
            i += 1;
        }
    }
    Cow::Owned(out)
}

fn decode_sequence(s: &[u8]) -> Option<u8> {
    if s.len() < 10 || &s[..5] != b"/%DCN" || &s[8..10] != b"%/" {
        return None;
    }
    let digits = &s[5..8];
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let value = digits
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
    u8::try_from(value).ok()
}
