//! `$MyINFO` parsing, tag parsing and sanitised reconstruction.
//!
//! Grammar:
//!
//! ```text
//! $MyINFO $ALL <nick> <description><tag>$ $<speed><flag>$<email>$<share>$
//! ```
//!
//! where the optional tag looks like `<client V:1.0,M:A,H:1/0/2,S:3,O:1>`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::TokenError;

const PREFIX: &[u8] = b"$MyINFO $ALL ";

/// Connection mode announced in the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `M:A`
    Active,
    /// `M:P`
    Passive,
    /// `M:5`
    Socks5,
}

/// A parsed client tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag<'a> {
    /// Client name (text before the first space).
    pub client: &'a [u8],
    /// `V:` value.
    pub version: &'a [u8],
    /// `M:` value.
    pub mode: Mode,
    /// `H:` normal/registered/operator hub counts.
    pub hubs: [u32; 3],
    /// `S:` slot count.
    pub slots: u32,
    /// `O:` auto-open-slot threshold, if present.
    pub open_slots: Option<u32>,
}

impl<'a> Tag<'a> {
    /// Parse a tag including its angle brackets.
    pub fn parse(raw: &'a [u8]) -> Result<Tag<'a>, TokenError> {
        let inner = raw
            .strip_prefix(b"<")
            .and_then(|r| r.strip_suffix(b">"))
            .ok_or(TokenError::Malformed("tag"))?;
        let space = inner
            .iter()
            .position(|&b| b == b' ')
            .ok_or(TokenError::Malformed("tag"))?;
        let client = &inner[..space];
        if client.is_empty() {
            return Err(TokenError::EmptyField("client"));
        }

        let mut version = None;
        let mut mode = None;
        let mut hubs = None;
        let mut slots = None;
        let mut open_slots = None;
        for field in inner[space + 1..].split(|&b| b == b',') {
            let Some((key, value)) = split_once(field, b':') else {
                continue;
            };
            match key {
                b"V" => version = Some(value),
                b"M" => {
                    mode = Some(match value {
                        b"A" => Mode::Active,
                        b"5" => Mode::Socks5,
                        _ => Mode::Passive,
                    })
                }
                b"H" => hubs = Some(parse_hubs(value)?),
                b"S" => slots = Some(parse_u32(value, "slots")?),
                b"O" => open_slots = Some(parse_u32(value, "open_slots")?),
                _ => {}
            }
        }

        Ok(Tag {
            client,
            version: version.ok_or(TokenError::MissingField("version"))?,
            mode: mode.ok_or(TokenError::MissingField("mode"))?,
            hubs: hubs.ok_or(TokenError::MissingField("hubs"))?,
            slots: slots.ok_or(TokenError::MissingField("slots"))?,
            open_slots,
        })
    }

    /// Total hubs the client claims to be connected to.
    pub fn hub_total(&self) -> u32 {
        self.hubs.iter().fold(0u32, |acc, h| acc.saturating_add(*h))
    }
}

fn parse_hubs(value: &[u8]) -> Result<[u32; 3], TokenError> {
    let mut hubs = [0u32; 3];
    let mut parts = value.split(|&b| b == b'/');
    for slot in hubs.iter_mut() {
        match parts.next() {
            Some(part) => *slot = parse_u32(part, "hubs")?,
            None => break,
        }
    }
    if parts.next().is_some() {
        return Err(TokenError::Malformed("hubs"));
    }
    Ok(hubs)
}

pub(crate) fn parse_u32(value: &[u8], field: &'static str) -> Result<u32, TokenError> {
    if value.is_empty() || value.len() > 10 || !value.iter().all(u8::is_ascii_digit) {
        return Err(TokenError::Malformed(field));
    }
    value
        .iter()
        .try_fold(0u32, |acc, d| {
            acc.checked_mul(10)?.checked_add(u32::from(d - b'0'))
        })
        .ok_or(TokenError::Malformed(field))
}

pub(crate) fn split_once(s: &[u8], delim: u8) -> Option<(&[u8], &[u8])> {
    let pos = s.iter().position(|&b| b == delim)?;
    Some((&s[..pos], &s[pos + 1..]))
}

/// Maximum field lengths applied when a MyINFO is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLimits {
    /// Description, excluding the tag.
    pub description: usize,
    /// Whole tag including brackets.
    pub tag: usize,
    /// Speed/connection string, excluding the flag byte.
    pub speed: usize,
    /// E-mail.
    pub email: usize,
    /// Decimal digits of the share size.
    pub share: usize,
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self {
            description: 128,
            tag: 128,
            speed: 32,
            email: 64,
            share: 20,
        }
    }
}

/// A borrowed `$MyINFO` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MyInfo<'a> {
    /// Nickname.
    pub nick: &'a [u8],
    /// Description with the tag removed.
    pub description: &'a [u8],
    /// Raw tag, brackets included, if the description ends with one.
    pub tag: Option<&'a [u8]>,
    /// Speed/connection string without the flag byte.
    pub speed: &'a [u8],
    /// Status flag byte (last byte of the speed field), 0 when absent.
    pub flag: u8,
    /// E-mail.
    pub email: &'a [u8],
    /// Share size as sent (decimal digits, possibly empty).
    pub share: &'a [u8],
}

impl<'a> MyInfo<'a> {
    /// Parse a complete `$MyINFO $ALL ...` token.
    pub fn parse(token: &'a [u8]) -> Result<MyInfo<'a>, TokenError> {
        let rest = token
            .strip_prefix(PREFIX)
            .ok_or(TokenError::WrongKind { expected: "MyINFO" })?;

        let nick_end = rest
            .iter()
            .position(|&b| b == b' ' || b == b'$')
            .ok_or(TokenError::MissingField("description"))?;
        let nick = &rest[..nick_end];
        if nick.is_empty() {
            return Err(TokenError::EmptyField("nick"));
        }
        let body = match rest[nick_end] {
            b' ' => &rest[nick_end + 1..],
            _ => &rest[nick_end..],
        };

        let mut fields = body.split(|&b| b == b'$');
        let described = fields.next().ok_or(TokenError::MissingField("description"))?;
        let _legacy = fields.next().ok_or(TokenError::MissingField("speed"))?;
        let speed_field = fields.next().ok_or(TokenError::MissingField("speed"))?;
        let email = fields.next().ok_or(TokenError::MissingField("email"))?;
        let share = fields.next().ok_or(TokenError::MissingField("share"))?;
        match (fields.next(), fields.next()) {
            (Some(b""), None) => {}
            _ => return Err(TokenError::Malformed("share")),
        }

        let (description, tag) = split_tag(described);
        let (speed, flag) = match speed_field.split_last() {
            Some((&flag, speed)) => (speed, flag),
            None => (speed_field, 0),
        };

        Ok(MyInfo {
            nick,
            description,
            tag,
            speed,
            flag,
            email,
            share,
        })
    }

    /// Parse the tag, if any.
    pub fn parsed_tag(&self) -> Option<Result<Tag<'a>, TokenError>> {
        self.tag.map(Tag::parse)
    }

    /// Share size in bytes. An empty share field counts as zero.
    pub fn share_size(&self) -> Result<u64, TokenError> {
        if self.share.is_empty() {
            return Ok(0);
        }
        if !self.share.iter().all(u8::is_ascii_digit) {
            return Err(TokenError::Malformed("share"));
        }
        self.share
            .iter()
            .try_fold(0u64, |acc, d| {
                acc.checked_mul(10)?.checked_add(u64::from(d - b'0'))
            })
            .ok_or(TokenError::Malformed("share"))
    }

    /// Rebuild the token with every field truncated to `limits`.
    ///
    /// The share must be decimal and within the digit limit; a tag longer
    /// than its limit is rejected rather than cut. With `hide_share` the
    /// share is rewritten to zero. The result carries the trailing `|`.
    pub fn rebuild(&self, limits: &FieldLimits, hide_share: bool) -> Result<Bytes, TokenError> {
        if self.share.len() > limits.share {
            return Err(TokenError::Malformed("share"));
        }
        self.share_size()?;
        if let Some(tag) = self.tag {
            if tag.len() > limits.tag {
                return Err(TokenError::Malformed("tag"));
            }
        }

        let description = truncate(self.description, limits.description);
        let tag = self.tag.unwrap_or(b"");
        let speed = truncate(self.speed, limits.speed);
        let email = truncate(self.email, limits.email);
        let share: &[u8] = match (hide_share, self.share.is_empty()) {
            (true, _) | (false, true) => b"0",
            (false, false) => self.share,
        };

        let mut out = BytesMut::with_capacity(
            PREFIX.len()
                + self.nick.len()
                + description.len()
                + tag.len()
                + speed.len()
                + email.len()
                + share.len()
                + 10,
        );
        out.put_slice(PREFIX);
        out.put_slice(self.nick);
        out.put_u8(b' ');
        out.put_slice(description);
        out.put_slice(tag);
        out.put_slice(b"$ $");
        out.put_slice(speed);
        if self.flag != 0 {
            out.put_u8(self.flag);
        }
        out.put_u8(b'$');
        out.put_slice(email);
        out.put_u8(b'$');
        out.put_slice(share);
        out.put_slice(b"$|");
        Ok(out.freeze())
    }
}

fn split_tag(described: &[u8]) -> (&[u8], Option<&[u8]>) {
    if described.last() != Some(&b'>') {
        return (described, None);
    }
    match described.iter().rposition(|&b| b == b'<') {
        Some(start) => (&described[..start], Some(&described[start..])),
        None => (described, None),
    }
}

fn truncate(field: &[u8], max: usize) -> &[u8] {
    &field[..field.len().min(max)]
}
