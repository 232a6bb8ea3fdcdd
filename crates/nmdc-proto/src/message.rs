//! Borrowed parsers for the client-to-hub token grammars.
//!
//! Every parser takes the complete token (prefix included, trailing `|`
//! excluded) and returns a view borrowing from it. Field extraction is
//! bounds-checked; malformed input yields a [`TokenError`].

use std::net::Ipv4Addr;

use crate::error::TokenError;
use crate::myinfo::split_once;

fn strip<'a>(token: &'a [u8], prefix: &[u8], expected: &'static str) -> Result<&'a [u8], TokenError> {
    token
        .strip_prefix(prefix)
        .ok_or(TokenError::WrongKind { expected })
}

fn non_empty<'a>(field: &'a [u8], name: &'static str) -> Result<&'a [u8], TokenError> {
    if field.is_empty() {
        Err(TokenError::EmptyField(name))
    } else {
        Ok(field)
    }
}

fn split_space<'a>(s: &'a [u8], name: &'static str) -> Result<(&'a [u8], &'a [u8]), TokenError> {
    split_once(s, b' ').ok_or(TokenError::MissingField(name))
}

fn parse_ipv4(raw: &[u8]) -> Result<Ipv4Addr, TokenError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(TokenError::Malformed("ip"))
}

fn parse_port(raw: &[u8]) -> Result<u16, TokenError> {
    if raw.is_empty() || raw.len() > 5 || !raw.iter().all(u8::is_ascii_digit) {
        return Err(TokenError::Malformed("port"));
    }
    let value = raw
        .iter()
        .fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'));
    u16::try_from(value).map_err(|_| TokenError::Malformed("port"))
}

/// Parse `<ip>:<port>` where the port may be followed by non-digit flags
/// (`S`, `N`, ...). Returns the address, the port and the flag suffix.
pub fn parse_address(raw: &[u8]) -> Result<(Ipv4Addr, u16, &[u8]), TokenError> {
    let (ip, rest) = split_once(raw, b':').ok_or(TokenError::MissingField("port"))?;
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    Ok((parse_ipv4(ip)?, parse_port(&rest[..digits])?, &rest[digits..]))
}

/// Argument of a single-field token (`$ValidateNick`, `$Kick`, `$Key`, ...).
pub fn single_argument<'a>(
    token: &'a [u8],
    prefix: &[u8],
    name: &'static str,
) -> Result<&'a [u8], TokenError> {
    non_empty(strip(token, prefix, name)?, name)
}

/// `<nick> text`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine<'a> {
    /// Nick inside the angle brackets.
    pub nick: &'a [u8],
    /// Message text, possibly empty.
    pub text: &'a [u8],
}

impl<'a> ChatLine<'a> {
    /// Parse a main-chat token.
    pub fn parse(token: &'a [u8]) -> Result<ChatLine<'a>, TokenError> {
        let rest = strip(token, b"<", "chat")?;
        let close = rest
            .iter()
            .position(|&b| b == b'>')
            .ok_or(TokenError::Malformed("nick"))?;
        let nick = non_empty(&rest[..close], "nick")?;
        let text = match rest.get(close + 1) {
            None => &[][..],
            Some(b' ') => &rest[close + 2..],
            Some(_) => return Err(TokenError::Malformed("chat")),
        };
        Ok(ChatLine { nick, text })
    }
}

/// Origin of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSource<'a> {
    /// `<ip>:<port>`: results go straight to the searcher over UDP.
    Active {
        /// Searcher's address.
        ip: Ipv4Addr,
        /// UDP port.
        port: u16,
    },
    /// `Hub:<nick>`: results are routed back through the hub.
    Passive {
        /// Searcher's nick.
        nick: &'a [u8],
    },
}

/// `$Search <source> <query>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Search<'a> {
    /// Where results must be sent.
    pub source: SearchSource<'a>,
    /// Raw query (`F?T?0?9?TTH:...`).
    pub query: &'a [u8],
    /// Tiger-tree hash when this is a TTH search.
    pub tth: Option<&'a [u8]>,
}

impl<'a> Search<'a> {
    /// Parse a `$Search` token.
    pub fn parse(token: &'a [u8]) -> Result<Search<'a>, TokenError> {
        let args = strip(token, b"$Search ", "Search")?;
        let (source, query) = split_space(args, "query")?;
        let source = match source.strip_prefix(b"Hub:") {
            Some(nick) => SearchSource::Passive {
                nick: non_empty(nick, "nick")?,
            },
            None => {
                let (ip, port, _) = parse_address(source)?;
                SearchSource::Active { ip, port }
            }
        };

        let mut parts = query.splitn(5, |&b| b == b'?');
        let restricted = parts.next().ok_or(TokenError::MissingField("query"))?;
        let _is_max = parts.next().ok_or(TokenError::MissingField("query"))?;
        let _size = parts.next().ok_or(TokenError::MissingField("query"))?;
        let kind = parts.next().ok_or(TokenError::MissingField("query"))?;
        let pattern = parts.next().ok_or(TokenError::MissingField("pattern"))?;
        if !matches!(restricted, b"T" | b"F") {
            return Err(TokenError::Malformed("query"));
        }
        let tth = match kind {
            b"9" => pattern.strip_prefix(b"TTH:").filter(|h| !h.is_empty()),
            _ => None,
        };
        Ok(Search { source, query, tth })
    }

    /// True when results route back through the hub.
    pub fn is_passive(&self) -> bool {
        matches!(self.source, SearchSource::Passive { .. })
    }
}

/// `$SR <nick> <result>\x05<target>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult<'a> {
    /// Nick of the user who has the file.
    pub nick: &'a [u8],
    /// Nick of the passive searcher the result is for.
    pub target: &'a [u8],
    /// Token with the `\x05<target>` suffix removed.
    pub forward: &'a [u8],
}

impl<'a> SearchResult<'a> {
    /// Parse a `$SR` token.
    pub fn parse(token: &'a [u8]) -> Result<SearchResult<'a>, TokenError> {
        let args = strip(token, b"$SR ", "SR")?;
        let (nick, _) = split_space(args, "result")?;
        let nick = non_empty(nick, "nick")?;
        let sep = token
            .iter()
            .rposition(|&b| b == 0x05)
            .ok_or(TokenError::MissingField("target"))?;
        if sep < 4 + nick.len() {
            return Err(TokenError::Malformed("target"));
        }
        let target = non_empty(&token[sep + 1..], "target")?;
        Ok(SearchResult {
            nick,
            target,
            forward: &token[..sep],
        })
    }
}

/// `$ConnectToMe <target> <ip>:<port>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectToMe<'a> {
    /// User asked to connect.
    pub target: &'a [u8],
    /// Address to connect to.
    pub ip: Ipv4Addr,
    /// Port to connect to.
    pub port: u16,
    /// Flags after the port (`S` for TLS, `N`/`R` for NAT traversal).
    pub flags: &'a [u8],
}

impl<'a> ConnectToMe<'a> {
    /// Parse a `$ConnectToMe` token.
    pub fn parse(token: &'a [u8]) -> Result<ConnectToMe<'a>, TokenError> {
        let args = strip(token, b"$ConnectToMe ", "ConnectToMe")?;
        let (target, rest) = split_space(args, "address")?;
        let target = non_empty(target, "target")?;
        let address = rest.split(|&b| b == b' ').next().unwrap_or(rest);
        let (ip, port, flags) = parse_address(address)?;
        Ok(ConnectToMe {
            target,
            ip,
            port,
            flags,
        })
    }
}

/// `$RevConnectToMe <nick> <target>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevConnectToMe<'a> {
    /// Requesting (passive) user.
    pub nick: &'a [u8],
    /// User asked to send a `$ConnectToMe`.
    pub target: &'a [u8],
}

impl<'a> RevConnectToMe<'a> {
    /// Parse a `$RevConnectToMe` token.
    pub fn parse(token: &'a [u8]) -> Result<RevConnectToMe<'a>, TokenError> {
        let args = strip(token, b"$RevConnectToMe ", "RevConnectToMe")?;
        let (nick, target) = split_space(args, "target")?;
        Ok(RevConnectToMe {
            nick: non_empty(nick, "nick")?,
            target: non_empty(target, "target")?,
        })
    }
}

/// `$To: <target> From: <from> $<<nick>> <text>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateMessage<'a> {
    /// Recipient.
    pub target: &'a [u8],
    /// Sender in the `From:` field.
    pub from: &'a [u8],
    /// Sender in the embedded chat line.
    pub nick: &'a [u8],
    /// Message text.
    pub text: &'a [u8],
}

impl<'a> PrivateMessage<'a> {
    /// Parse a `$To:` token.
    pub fn parse(token: &'a [u8]) -> Result<PrivateMessage<'a>, TokenError> {
        let args = strip(token, b"$To: ", "To")?;
        let (target, rest) = split_space(args, "From")?;
        let rest = rest
            .strip_prefix(b"From: ")
            .ok_or(TokenError::MissingField("From"))?;
        let (from, rest) = split_space(rest, "message")?;
        let line = rest
            .strip_prefix(b"$")
            .ok_or(TokenError::Malformed("message"))?;
        let chat = ChatLine::parse(line)?;
        Ok(PrivateMessage {
            target: non_empty(target, "target")?,
            from: non_empty(from, "from")?,
            nick: chat.nick,
            text: chat.text,
        })
    }
}

/// `$MCTo: <target> $<from> <text>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McTo<'a> {
    /// Recipient.
    pub target: &'a [u8],
    /// Sender.
    pub from: &'a [u8],
    /// Message text.
    pub text: &'a [u8],
}

impl<'a> McTo<'a> {
    /// Parse a `$MCTo:` token.
    pub fn parse(token: &'a [u8]) -> Result<McTo<'a>, TokenError> {
        let args = strip(token, b"$MCTo: ", "MCTo")?;
        let (target, rest) = split_space(args, "from")?;
        let rest = rest
            .strip_prefix(b"$")
            .ok_or(TokenError::Malformed("from"))?;
        let (from, text) = match split_once(rest, b' ') {
            Some(parts) => parts,
            None => (rest, &[][..]),
        };
        Ok(McTo {
            target: non_empty(target, "target")?,
            from: non_empty(from, "from")?,
            text,
        })
    }
}

/// `$OpForceMove $Who:<nick>$Where:<address>$Msg:<message>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpForceMove<'a> {
    /// User to redirect.
    pub who: &'a [u8],
    /// Destination hub address.
    pub destination: &'a [u8],
    /// Reason shown to the user.
    pub message: &'a [u8],
}

impl<'a> OpForceMove<'a> {
    /// Parse a `$OpForceMove` token.
    pub fn parse(token: &'a [u8]) -> Result<OpForceMove<'a>, TokenError> {
        let args = strip(token, b"$OpForceMove ", "OpForceMove")?;
        let rest = args
            .strip_prefix(b"$Who:")
            .ok_or(TokenError::MissingField("Who"))?;
        let (who, rest) = split_once(rest, b'$').ok_or(TokenError::MissingField("Where"))?;
        let rest = rest
            .strip_prefix(b"Where:")
            .ok_or(TokenError::MissingField("Where"))?;
        let (destination, rest) = split_once(rest, b'$').ok_or(TokenError::MissingField("Msg"))?;
        let message = rest
            .strip_prefix(b"Msg:")
            .ok_or(TokenError::MissingField("Msg"))?;
        Ok(OpForceMove {
            who: non_empty(who, "who")?,
            destination: non_empty(destination, "where")?,
            message,
        })
    }
}

/// `$GetINFO <target> <nick>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetInfo<'a> {
    /// User whose MyINFO is requested.
    pub target: &'a [u8],
    /// Requesting user.
    pub nick: &'a [u8],
}

impl<'a> GetInfo<'a> {
    /// Parse a `$GetINFO` token.
    pub fn parse(token: &'a [u8]) -> Result<GetInfo<'a>, TokenError> {
        let args = strip(token, b"$GetINFO ", "GetINFO")?;
        let (target, nick) = split_space(args, "nick")?;
        Ok(GetInfo {
            target: non_empty(target, "target")?,
            nick: non_empty(nick, "nick")?,
        })
    }
}

/// Nicks listed in `$UserIP nick1$$nick2...`.
pub fn user_ip_nicks(token: &[u8]) -> Result<Vec<&[u8]>, TokenError> {
    let args = strip(token, b"$UserIP ", "UserIP")?;
    let nicks: Vec<&[u8]> = SplitDouble { rest: Some(args) }
        .filter(|n| !n.is_empty())
        .collect();
    if nicks.is_empty() {
        return Err(TokenError::EmptyField("nick"));
    }
    Ok(nicks)
}

struct SplitDouble<'a> {
    rest: Option<&'a [u8]>,
}

impl<'a> Iterator for SplitDouble<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let rest = self.rest?;
        match rest.windows(2).position(|w| w == b"$$") {
            Some(pos) => {
                self.rest = Some(&rest[pos + 2..]);
                Some(&rest[..pos])
            }
            None => {
                self.rest = None;
                Some(rest)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_line() {
        let chat = ChatLine::parse(b"<alice> hello there").unwrap();
        assert_eq!(chat.nick, b"alice");
        assert_eq!(chat.text, b"hello there");
        assert_eq!(ChatLine::parse(b"<alice>").unwrap().text, b"");
        assert!(ChatLine::parse(b"<alice>x").is_err());
        assert!(ChatLine::parse(b"<> hi").is_err());
        assert!(ChatLine::parse(b"<alice hi").is_err());
    }

    #[test]
    fn test_search_active_tth() {
        let search =
            Search::parse(b"$Search 10.0.0.1:412 F?T?0?9?TTH:ABCDEFGHIJKLMNOPQRSTUVWXYZ234567ABCDEFG")
                .unwrap();
        assert_eq!(
            search.source,
            SearchSource::Active {
                ip: Ipv4Addr::new(10, 0, 0, 1),
                port: 412
            }
        );
        assert_eq!(search.tth, Some(&b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567ABCDEFG"[..]));
        assert!(!search.is_passive());
    }

    #[test]
    fn test_search_passive_text() {
        let search = Search::parse(b"$Search Hub:bob T?F?1000?1?some$file").unwrap();
        assert_eq!(search.source, SearchSource::Passive { nick: b"bob" });
        assert_eq!(search.query, b"T?F?1000?1?some$file");
        assert!(search.tth.is_none());
        assert!(search.is_passive());
    }

    #[test]
    fn test_search_errors() {
        assert!(Search::parse(b"$Search 10.0.0.1:99999 F?T?0?1?x").is_err());
        assert!(Search::parse(b"$Search 10.0.0:1 F?T?0?1?x").is_err());
        assert!(Search::parse(b"$Search Hub: F?T?0?1?x").is_err());
        assert!(Search::parse(b"$Search Hub:bob F?T?0").is_err());
        assert!(Search::parse(b"$Search Hub:bob X?T?0?1?x").is_err());
        assert!(Search::parse(b"$Search Hub:bob").is_err());
    }

    #[test]
    fn test_search_result() {
        let token = b"$SR bob dir\\file.txt\x05100 2/3\x05TTH:ABC (10.0.0.1:411)\x05alice";
        let sr = SearchResult::parse(token).unwrap();
        assert_eq!(sr.nick, b"bob");
        assert_eq!(sr.target, b"alice");
        assert_eq!(sr.forward, &token[..token.len() - 6]);
        assert!(SearchResult::parse(b"$SR bob file").is_err());
        assert!(SearchResult::parse(b"$SR bob file\x05").is_err());
    }

    #[test]
    fn test_connect_to_me() {
        let ctm = ConnectToMe::parse(b"$ConnectToMe bob 192.168.1.2:4000S").unwrap();
        assert_eq!(ctm.target, b"bob");
        assert_eq!(ctm.ip, Ipv4Addr::new(192, 168, 1, 2));
        assert_eq!(ctm.port, 4000);
        assert_eq!(ctm.flags, b"S");
        let nat = ConnectToMe::parse(b"$ConnectToMe bob 1.2.3.4:5N alice").unwrap();
        assert_eq!(nat.flags, b"N");
        assert!(ConnectToMe::parse(b"$ConnectToMe bob").is_err());
        assert!(ConnectToMe::parse(b"$ConnectToMe bob host:1").is_err());
    }

    #[test]
    fn test_rev_connect_to_me() {
        let rctm = RevConnectToMe::parse(b"$RevConnectToMe alice bob").unwrap();
        assert_eq!(rctm.nick, b"alice");
        assert_eq!(rctm.target, b"bob");
        assert!(RevConnectToMe::parse(b"$RevConnectToMe alice").is_err());
    }

    #[test]
    fn test_private_message() {
        let pm = PrivateMessage::parse(b"$To: bob From: alice $<alice> hi bob").unwrap();
        assert_eq!(pm.target, b"bob");
        assert_eq!(pm.from, b"alice");
        assert_eq!(pm.nick, b"alice");
        assert_eq!(pm.text, b"hi bob");
        assert!(PrivateMessage::parse(b"$To: bob alice $<alice> hi").is_err());
        assert!(PrivateMessage::parse(b"$To: bob From: alice <alice> hi").is_err());
    }

    #[test]
    fn test_mcto() {
        let m = McTo::parse(b"$MCTo: bob $alice psst").unwrap();
        assert_eq!(m.target, b"bob");
        assert_eq!(m.from, b"alice");
        assert_eq!(m.text, b"psst");
        assert!(McTo::parse(b"$MCTo: bob alice psst").is_err());
    }

    #[test]
    fn test_op_force_move() {
        let m = OpForceMove::parse(b"$OpForceMove $Who:bob$Where:other.hub:411$Msg:bye now").unwrap();
        assert_eq!(m.who, b"bob");
        assert_eq!(m.destination, b"other.hub:411");
        assert_eq!(m.message, b"bye now");
        assert!(OpForceMove::parse(b"$OpForceMove $Who:bob$Msg:x").is_err());
    }

    #[test]
    fn test_get_info_and_user_ip() {
        let g = GetInfo::parse(b"$GetINFO bob alice").unwrap();
        assert_eq!(g.target, b"bob");
        assert_eq!(g.nick, b"alice");
        assert_eq!(
            user_ip_nicks(b"$UserIP bob$$carol$$").unwrap(),
            vec![&b"bob"[..], &b"carol"[..]]
        );
        assert!(user_ip_nicks(b"$UserIP $$").is_err());
    }

    #[test]
    fn test_single_argument() {
        assert_eq!(
            single_argument(b"$Kick bob", b"$Kick ", "Kick").unwrap(),
            b"bob"
        );
        assert!(single_argument(b"$Kick ", b"$Kick ", "Kick").is_err());
    }

    #[test]
    fn test_parse_address() {
        let (ip, port, flags) = parse_address(b"1.2.3.4:411").unwrap();
        assert_eq!(ip, Ipv4Addr::new(1, 2, 3, 4));
        assert_eq!(port, 411);
        assert!(flags.is_empty());
        assert!(parse_address(b"1.2.3.4:").is_err());
    }
}
