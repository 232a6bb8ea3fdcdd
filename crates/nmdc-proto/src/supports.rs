//! `$Supports` feature flags.

use std::fmt;

/// Set of extension flags announced by a client in `$Supports`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Supports(u32);

impl Supports {
    /// No flags.
    pub const EMPTY: Supports = Supports(0);
    /// `NoGetINFO`: client does not need `$GetINFO` round trips.
    pub const NO_GET_INFO: Supports = Supports(1 << 0);
    /// `NoHello`: client takes MyINFO instead of `$Hello` for joins.
    pub const NO_HELLO: Supports = Supports(1 << 1);
    /// `UserIP2`
    pub const USER_IP2: Supports = Supports(1 << 2);
    /// `UserCommand`
    pub const USER_COMMAND: Supports = Supports(1 << 3);
    /// `TTHSearch`
    pub const TTH_SEARCH: Supports = Supports(1 << 4);
    /// `ZPipe0` / `ZPipe`
    pub const ZPIPE: Supports = Supports(1 << 5);
    /// `ZLine`
    pub const ZLINE: Supports = Supports(1 << 6);
    /// `QuickList`
    pub const QUICK_LIST: Supports = Supports(1 << 7);
    /// `BotINFO`
    pub const BOT_INFO: Supports = Supports(1 << 8);
    /// `HubINFO`
    pub const HUB_INFO: Supports = Supports(1 << 9);
    /// `TLS`
    pub const TLS: Supports = Supports(1 << 10);
    /// `OpPlus`
    pub const OP_PLUS: Supports = Supports(1 << 11);
    /// `BotList`
    pub const BOT_LIST: Supports = Supports(1 << 12);
    /// `MiniSlots`
    pub const MINI_SLOTS: Supports = Supports(1 << 13);
    /// `Feed`
    pub const FEED: Supports = Supports(1 << 14);
    /// `ClientID`
    pub const CLIENT_ID: Supports = Supports(1 << 15);
    /// `ADCGet`
    pub const ADC_GET: Supports = Supports(1 << 16);
    /// `TTHL`
    pub const TTHL: Supports = Supports(1 << 17);
    /// `TTHF`
    pub const TTHF: Supports = Supports(1 << 18);
    /// `GetZBlock`
    pub const GET_ZBLOCK: Supports = Supports(1 << 19);
    /// `XmlBZList`
    pub const XML_BZLIST: Supports = Supports(1 << 20);
    /// `MCTo`
    pub const MCTO: Supports = Supports(1 << 21);

    /// Raw bit representation.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when every flag of `other` is set.
    pub const fn contains(self, other: Supports) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the flags of `other`.
    pub fn insert(&mut self, other: Supports) {
        self.0 |= other.0;
    }

    /// Flag for a single `$Supports` name, if known.
    pub fn from_name(name: &[u8]) -> Option<Supports> {
        FLAG_NAMES
            .iter()
            .find(|(n, _)| n.as_bytes() == name)
            .map(|&(_, flag)| flag)
    }

    /// Parse the argument list of a `$Supports` token. Unknown names are
    /// ignored.
    pub fn parse(args: &[u8]) -> Supports {
        let mut set = Supports::EMPTY;
        for name in args.split(|&b| b == b' ').filter(|n| !n.is_empty()) {
            if let Some(flag) = Supports::from_name(name) {
                set.insert(flag);
            }
        }
        set
    }
}

impl std::ops::BitOr for Supports {
    type Output = Supports;

    fn bitor(self, rhs: Supports) -> Supports {
        Supports(self.0 | rhs.0)
    }
}

const FLAG_NAMES: &[(&str, Supports)] = &[
    ("NoGetINFO", Supports::NO_GET_INFO),
    ("NoHello", Supports::NO_HELLO),
    ("UserIP2", Supports::USER_IP2),
    ("UserCommand", Supports::USER_COMMAND),
    ("TTHSearch", Supports::TTH_SEARCH),
    ("ZPipe0", Supports::ZPIPE),
    ("ZPipe", Supports::ZPIPE),
    ("ZLine", Supports::ZLINE),
    ("QuickList", Supports::QUICK_LIST),
    ("BotINFO", Supports::BOT_INFO),
    ("HubINFO", Supports::HUB_INFO),
    ("TLS", Supports::TLS),
    ("OpPlus", Supports::OP_PLUS),
    ("BotList", Supports::BOT_LIST),
    ("MiniSlots", Supports::MINI_SLOTS),
    ("Feed", Supports::FEED),
    ("ClientID", Supports::CLIENT_ID),
    ("ADCGet", Supports::ADC_GET),
    ("TTHL", Supports::TTHL),
    ("TTHF", Supports::TTHF),
    ("GetZBlock", Supports::GET_ZBLOCK),
    ("XmlBZList", Supports::XML_BZLIST),
    ("MCTo", Supports::MCTO),
];

impl fmt::Display for Supports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut seen = Supports::EMPTY;
        for &(name, flag) in FLAG_NAMES {
            if self.contains(flag) && !seen.contains(flag) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                seen.insert(flag);
                first = false;
            }
        }
        Ok(())
    }
}

/// The flags the hub itself announces. Compression is never offered.
pub const HUB_SUPPORTS: Supports = Supports(
    Supports::NO_GET_INFO.0
        | Supports::NO_HELLO.0
        | Supports::USER_IP2.0
        | Supports::BOT_INFO.0
        | Supports::HUB_INFO.0,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_and_unknown() {
        let s = Supports::parse(b"NoHello  UserIP2 Frobnicate TTHSearch ZPipe0");
        assert!(s.contains(Supports::NO_HELLO));
        assert!(s.contains(Supports::USER_IP2));
        assert!(s.contains(Supports::TTH_SEARCH));
        assert!(s.contains(Supports::ZPIPE));
        assert!(!s.contains(Supports::NO_GET_INFO));
    }

    #[test]
    fn test_flags_independent() {
        for &(name, flag) in FLAG_NAMES {
            let s = Supports::parse(name.as_bytes());
            assert_eq!(s, flag, "{name}");
        }
    }

    #[test]
    fn test_hub_supports_display() {
        assert_eq!(
            HUB_SUPPORTS.to_string(),
            "NoGetINFO NoHello UserIP2 BotINFO HubINFO"
        );
    }

    #[test]
    fn test_zpipe_printed_once() {
        assert_eq!(Supports::ZPIPE.to_string(), "ZPipe0");
    }
}
