//! Hub-to-client token builders.
//!
//! Every builder returns a frozen buffer that already carries its trailing
//! `|`, so queued messages can be concatenated without further framing.

use std::fmt::Write as _;
use std::net::Ipv4Addr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::supports::Supports;

fn join(parts: &[&[u8]]) -> Bytes {
    let len = parts.iter().map(|p| p.len()).sum::<usize>() + 1;
    let mut out = BytesMut::with_capacity(len);
    for part in parts {
        out.put_slice(part);
    }
    out.put_u8(b'|');
    out.freeze()
}

/// `$Lock <lock> Pk=<pk>|`
pub fn lock(lock: &str, pk: &str) -> Bytes {
    join(&[b"$Lock ", lock.as_bytes(), b" Pk=", pk.as_bytes()])
}

/// `$HubName <name>|`
pub fn hub_name(name: &str) -> Bytes {
    join(&[b"$HubName ", name.as_bytes()])
}

/// `$Supports <flags>|`
pub fn supports(flags: Supports) -> Bytes {
    join(&[b"$Supports ", flags.to_string().as_bytes()])
}

/// `$Hello <nick>|`
pub fn hello(nick: &str) -> Bytes {
    join(&[b"$Hello ", nick.as_bytes()])
}

/// `$LogedIn <nick>|`
pub fn logged_in(nick: &str) -> Bytes {
    join(&[b"$LogedIn ", nick.as_bytes()])
}

/// `$GetPass|`
pub fn get_pass() -> Bytes {
    Bytes::from_static(b"$GetPass|")
}

/// `$BadPass|`
pub fn bad_pass() -> Bytes {
    Bytes::from_static(b"$BadPass|")
}

/// `$HubIsFull|`
pub fn hub_is_full() -> Bytes {
    Bytes::from_static(b"$HubIsFull|")
}

/// `$ValidateDenide <nick>|`
pub fn validate_denide(nick: &[u8]) -> Bytes {
    join(&[b"$ValidateDenide ", nick])
}

/// `$ForceMove <address>|`
pub fn force_move(address: &[u8]) -> Bytes {
    join(&[b"$ForceMove ", address])
}

/// `$Quit <nick>|`
pub fn quit(nick: &str) -> Bytes {
    join(&[b"$Quit ", nick.as_bytes()])
}

/// `<nick> text|`
pub fn chat(nick: &str, text: &[u8]) -> Bytes {
    join(&[b"<", nick.as_bytes(), b"> ", text])
}

/// `$To: <target> From: <from> $<<from>> text|`
pub fn private_message(target: &str, from: &str, text: &[u8]) -> Bytes {
    join(&[
        b"$To: ",
        target.as_bytes(),
        b" From: ",
        from.as_bytes(),
        b" $<",
        from.as_bytes(),
        b"> ",
        text,
    ])
}

/// `$ConnectToMe <target> <ip>:<port><flags>|`
pub fn connect_to_me(target: &str, ip: Ipv4Addr, port: u16, flags: &[u8]) -> Bytes {
    let address = format!("{ip}:{port}");
    join(&[
        b"$ConnectToMe ",
        target.as_bytes(),
        b" ",
        address.as_bytes(),
        flags,
    ])
}

/// `$RevConnectToMe <nick> <target>|`
pub fn rev_connect_to_me(nick: &str, target: &str) -> Bytes {
    join(&[
        b"$RevConnectToMe ",
        nick.as_bytes(),
        b" ",
        target.as_bytes(),
    ])
}

/// `$UserIP nick ip$$nick ip$$|`
pub fn user_ip<'a, I>(entries: I) -> Bytes
where
    I: IntoIterator<Item = (&'a str, Ipv4Addr)>,
{
    let mut body = String::from("$UserIP ");
    for (nick, ip) in entries {
        let _ = write!(body, "{nick} {ip}$$");
    }
    join(&[body.as_bytes()])
}

/// Start of a `$NickList`/`$OpList`/`$BotList` list.
pub const NICKLIST_PREFIX: &[u8] = b"$NickList ";
/// See [`NICKLIST_PREFIX`].
pub const OPLIST_PREFIX: &[u8] = b"$OpList ";
/// See [`NICKLIST_PREFIX`].
pub const BOTLIST_PREFIX: &[u8] = b"$BotList ";

/// Build a `$NickList`-style token from a list prefix and nicks.
pub fn nick_list<'a, I>(prefix: &[u8], nicks: I) -> Bytes
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = BytesMut::with_capacity(256);
    out.put_slice(prefix);
    for nick in nicks {
        out.put_slice(nick.as_bytes());
        out.put_slice(b"$$");
    }
    out.put_u8(b'|');
    out.freeze()
}

/// Hub description returned for `$BotINFO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubInfo<'a> {
    /// Hub name.
    pub name: &'a str,
    /// Advertised `host:port`.
    pub address: &'a str,
    /// Description.
    pub description: &'a str,
    /// User limit.
    pub max_users: u32,
    /// Minimum share in bytes.
    pub share_min: u64,
    /// Minimum slots.
    pub slots_min: u32,
    /// Maximum hubs.
    pub hubs_max: u32,
    /// Hub software name.
    pub software: &'a str,
    /// Owner contact.
    pub owner: &'a str,
}

/// `$HubINFO name$host:port$description$max_users$share_min$slots_min$hubs_max$software$owner|`
pub fn hub_info(info: &HubInfo<'_>) -> Bytes {
    let body = format!(
        "$HubINFO {}${}${}${}${}${}${}${}${}",
        info.name,
        info.address,
        info.description,
        info.max_users,
        info.share_min,
        info.slots_min,
        info.hubs_max,
        info.software,
        info.owner
    );
    join(&[body.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supports::HUB_SUPPORTS;

    #[test]
    fn test_simple_builders() {
        assert_eq!(lock("EXTENDEDPROTOCOLab", "hub0.4"), "$Lock EXTENDEDPROTOCOLab Pk=hub0.4|");
        assert_eq!(hub_name("Test Hub"), "$HubName Test Hub|");
        assert_eq!(hello("alice"), "$Hello alice|");
        assert_eq!(logged_in("alice"), "$LogedIn alice|");
        assert_eq!(validate_denide(b"bob"), "$ValidateDenide bob|");
        assert_eq!(force_move(b"other:411"), "$ForceMove other:411|");
        assert_eq!(quit("bob"), "$Quit bob|");
        assert_eq!(get_pass(), "$GetPass|");
        assert_eq!(
            supports(HUB_SUPPORTS),
            "$Supports NoGetINFO NoHello UserIP2 BotINFO HubINFO|"
        );
    }

    #[test]
    fn test_chat_builders() {
        assert_eq!(chat("hub", b"welcome"), "<hub> welcome|");
        assert_eq!(
            private_message("bob", "alice", b"hi"),
            "$To: bob From: alice $<alice> hi|"
        );
    }

    #[test]
    fn test_transfer_builders() {
        assert_eq!(
            connect_to_me("bob", Ipv4Addr::new(1, 2, 3, 4), 412, b"S"),
            "$ConnectToMe bob 1.2.3.4:412S|"
        );
        assert_eq!(
            rev_connect_to_me("alice", "bob"),
            "$RevConnectToMe alice bob|"
        );
    }

    #[test]
    fn test_lists() {
        assert_eq!(nick_list(NICKLIST_PREFIX, ["a", "b"]), "$NickList a$$b$$|");
        assert_eq!(nick_list(OPLIST_PREFIX, []), "$OpList |");
        assert_eq!(
            user_ip([("a", Ipv4Addr::new(10, 0, 0, 1))]),
            "$UserIP a 10.0.0.1$$|"
        );
    }

    #[test]
    fn test_hub_info() {
        let info = HubInfo {
            name: "Hub",
            address: "hub.example:411",
            description: "desc",
            max_users: 100,
            share_min: 0,
            slots_min: 1,
            hubs_max: 10,
            software: "nmdc-hubd",
            owner: "root",
        };
        assert_eq!(
            hub_info(&info),
            "$HubINFO Hub$hub.example:411$desc$100$0$1$10$nmdc-hubd$root|"
        );
    }
}
