//! Capability bits granted to users, accounts and groups.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unknown right name in a rights list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown right: {0}")]
pub struct UnknownRight(pub String);

/// Set of capabilities.
///
/// Parsed from and printed as a comma-separated list of names
/// (`chat,pm,search`). `all` expands to every bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rights(u64);

impl Rights {
    pub const NONE: Rights = Rights(0);
    pub const CHAT: Rights = Rights(1 << 0);
    pub const PM: Rights = Rights(1 << 1);
    pub const SEARCH: Rights = Rights(1 << 2);
    pub const DL: Rights = Rights(1 << 3);
    pub const SHARE_HIDE: Rights = Rights(1 << 4);
    pub const TAG: Rights = Rights(1 << 5);
    pub const KICK: Rights = Rights(1 << 6);
    pub const BAN: Rights = Rights(1 << 7);
    pub const REDIRECT: Rights = Rights(1 << 8);
    pub const OP: Rights = Rights(1 << 9);
    pub const HIDDEN: Rights = Rights(1 << 10);
    pub const USERIP: Rights = Rights(1 << 11);
    pub const CONFIG: Rights = Rights(1 << 12);
    pub const USER: Rights = Rights(1 << 13);
    pub const GROUP: Rights = Rights(1 << 14);
    pub const OWNER: Rights = Rights(1 << 15);
    /// Searches skip the search bucket.
    pub const NO_SEARCH_LIMIT: Rights = Rights(1 << 16);
    /// Exempt from the address check on active `$Search` and `$ConnectToMe`.
    pub const SOURCE_VERIFY: Rights = Rights(1 << 17);

    pub const ALL: Rights = Rights((1 << 18) - 1);

    const NAMES: &'static [(&'static str, Rights)] = &[
        ("chat", Rights::CHAT),
        ("pm", Rights::PM),
        ("search", Rights::SEARCH),
        ("dl", Rights::DL),
        ("share_hide", Rights::SHARE_HIDE),
        ("tag", Rights::TAG),
        ("kick", Rights::KICK),
        ("ban", Rights::BAN),
        ("redirect", Rights::REDIRECT),
        ("op", Rights::OP),
        ("hidden", Rights::HIDDEN),
        ("userip", Rights::USERIP),
        ("config", Rights::CONFIG),
        ("user", Rights::USER),
        ("group", Rights::GROUP),
        ("owner", Rights::OWNER),
        ("nosrchlimit", Rights::NO_SEARCH_LIMIT),
        ("sourceverify", Rights::SOURCE_VERIFY),
    ];

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u64) -> Rights {
        Rights(bits & Rights::ALL.0)
    }

    pub const fn contains(self, other: Rights) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Rights) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Rights) {
        self.0 &= !other.0;
    }

    /// Rights every operator holds implicitly.
    pub fn is_operator(self) -> bool {
        self.contains(Rights::OP)
    }

    /// Parse `chat,pm search` style lists. Empty input yields no rights.
    pub fn parse(input: &str) -> Result<Rights, UnknownRight> {
        let mut rights = Rights::NONE;
        for name in input
            .split(|c: char| c == ',' || c.is_ascii_whitespace())
            .filter(|s| !s.is_empty())
        {
            let name = name.to_ascii_lowercase();
            if name == "all" {
                rights.insert(Rights::ALL);
                continue;
            }
            let (_, bit) = Rights::NAMES
                .iter()
                .find(|(n, _)| *n == name)
                .ok_or_else(|| UnknownRight(name.clone()))?;
            rights.insert(*bit);
        }
        Ok(rights)
    }

    /// Names of the set bits, in table order.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Rights::NAMES
            .iter()
            .filter(move |(_, bit)| self.contains(*bit))
            .map(|(name, _)| *name)
    }
}

impl BitOr for Rights {
    type Output = Rights;

    fn bitor(self, rhs: Rights) -> Rights {
        Rights(self.0 | rhs.0)
    }
}

impl BitOrAssign for Rights {
    fn bitor_assign(&mut self, rhs: Rights) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Rights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, name) in self.names().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(name)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Rights {
    type Error = UnknownRight;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rights::parse(&value)
    }
}

impl From<Rights> for String {
    fn from(value: Rights) -> Self {
        value.to_string()
    }
}
