//! Token identification.
//!
//! Every `|`-delimited token is classified by a fixed prefix (`$MyINFO `,
//! `$Key `, ...) or by the bare leading `<` of a chat line. Lookup uses a
//! small table bucketed on a two-byte hash of the token head so that the
//! common case compares against one or two candidate prefixes.

use std::fmt;
use std::sync::OnceLock;

use smallvec::SmallVec;

/// Kinds of client-to-hub token the hub understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TokenKind {
    /// Empty token (keepalive `|`).
    Empty,
    /// `<nick> text` main chat line.
    Chat,
    /// `$Lock`
    Lock,
    /// `$Supports`
    Supports,
    /// `$Key`
    Key,
    /// `$ValidateNick`
    ValidateNick,
    /// `$MyPass`
    MyPass,
    /// `$Version`
    Version,
    /// `$GetNickList`
    GetNickList,
    /// `$MyINFO`
    MyInfo,
    /// `$GetINFO`
    GetInfo,
    /// `$Search`
    Search,
    /// `$SR`
    SearchResult,
    /// `$ConnectToMe`
    ConnectToMe,
    /// `$RevConnectToMe`
    RevConnectToMe,
    /// `$To:`
    To,
    /// `$MCTo:`
    McTo,
    /// `$Quit`
    Quit,
    /// `$OpForceMove`
    OpForceMove,
    /// `$Kick`
    Kick,
    /// `$Close`
    Close,
    /// `$BotINFO`
    BotInfo,
    /// `$UserIP`
    UserIp,
    /// `$MyNick`: client-to-client only; seen at a hub it is an exploit signature.
    MyNick,
    /// Anything else.
    Unknown,
}

impl TokenKind {
    /// Number of variants, for per-kind tables.
    pub const COUNT: usize = 25;

    /// Every variant, in declaration order.
    pub const ALL: [TokenKind; Self::COUNT] = [
        TokenKind::Empty,
        TokenKind::Chat,
        TokenKind::Lock,
        TokenKind::Supports,
        TokenKind::Key,
        TokenKind::ValidateNick,
        TokenKind::MyPass,
        TokenKind::Version,
        TokenKind::GetNickList,
        TokenKind::MyInfo,
        TokenKind::GetInfo,
        TokenKind::Search,
        TokenKind::SearchResult,
        TokenKind::ConnectToMe,
        TokenKind::RevConnectToMe,
        TokenKind::To,
        TokenKind::McTo,
        TokenKind::Quit,
        TokenKind::OpForceMove,
        TokenKind::Kick,
        TokenKind::Close,
        TokenKind::BotInfo,
        TokenKind::UserIp,
        TokenKind::MyNick,
        TokenKind::Unknown,
    ];

    /// Dense index of this kind, `0..COUNT`.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short name used in logs and metric labels.
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Empty => "empty",
            TokenKind::Chat => "chat",
            TokenKind::Lock => "Lock",
            TokenKind::Supports => "Supports",
            TokenKind::Key => "Key",
            TokenKind::ValidateNick => "ValidateNick",
            TokenKind::MyPass => "MyPass",
            TokenKind::Version => "Version",
            TokenKind::GetNickList => "GetNickList",
            TokenKind::MyInfo => "MyINFO",
            TokenKind::GetInfo => "GetINFO",
            TokenKind::Search => "Search",
            TokenKind::SearchResult => "SR",
            TokenKind::ConnectToMe => "ConnectToMe",
            TokenKind::RevConnectToMe => "RevConnectToMe",
            TokenKind::To => "To",
            TokenKind::McTo => "MCTo",
            TokenKind::Quit => "Quit",
            TokenKind::OpForceMove => "OpForceMove",
            TokenKind::Kick => "Kick",
            TokenKind::Close => "Close",
            TokenKind::BotInfo => "BotINFO",
            TokenKind::UserIp => "UserIP",
            TokenKind::MyNick => "MyNick",
            TokenKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Prefix table. Prefixes that take arguments include the trailing space;
/// argument-less tokens are matched exactly.
const PREFIXES: &[(&[u8], TokenKind, bool)] = &[
    (b"$Lock ", TokenKind::Lock, false),
    (b"$Supports ", TokenKind::Supports, false),
    (b"$Key ", TokenKind::Key, false),
    (b"$ValidateNick ", TokenKind::ValidateNick, false),
    (b"$MyPass ", TokenKind::MyPass, false),
    (b"$Version ", TokenKind::Version, false),
    (b"$GetNickList", TokenKind::GetNickList, true),
    (b"$MyINFO ", TokenKind::MyInfo, false),
    (b"$GetINFO ", TokenKind::GetInfo, false),
    (b"$Search ", TokenKind::Search, false),
    (b"$SR ", TokenKind::SearchResult, false),
    (b"$ConnectToMe ", TokenKind::ConnectToMe, false),
    (b"$RevConnectToMe ", TokenKind::RevConnectToMe, false),
    (b"$To: ", TokenKind::To, false),
    (b"$MCTo: ", TokenKind::McTo, false),
    (b"$Quit ", TokenKind::Quit, false),
    (b"$OpForceMove ", TokenKind::OpForceMove, false),
    (b"$Kick ", TokenKind::Kick, false),
    (b"$Close ", TokenKind::Close, false),
    (b"$BotINFO ", TokenKind::BotInfo, false),
    (b"$UserIP ", TokenKind::UserIp, false),
    (b"$MyNick ", TokenKind::MyNick, false),
];

const BUCKETS: usize = 64;

type Bucket = SmallVec<[(&'static [u8], TokenKind, bool); 2]>;

fn bucket_of(head: &[u8]) -> usize {
    let a = usize::from(head[1]);
    let b = usize::from(head[2]);
    (a.wrapping_mul(31) ^ b) & (BUCKETS - 1)
}

fn table() -> &'static [Bucket; BUCKETS] {
    static TABLE: OnceLock<[Bucket; BUCKETS]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table: [Bucket; BUCKETS] = std::array::from_fn(|_| SmallVec::new());
        for &(prefix, kind, exact) in PREFIXES {
            table[bucket_of(prefix)].push((prefix, kind, exact));
        }
        table
    })
}

/// Classify a token (without its trailing `|`).
pub fn identify(token: &[u8]) -> TokenKind {
    match token.first() {
        None => return TokenKind::Empty,
        Some(b'<') => return TokenKind::Chat,
        Some(b'$') if token.len() >= 3 => {}
        _ => return TokenKind::Unknown,
    }
    for &(prefix, kind, exact) in &table()[bucket_of(token)] {
        let hit = if exact {
            token == prefix || token.starts_with(prefix) && token[prefix.len()] == b' '
        } else {
            token.starts_with(prefix)
        };
        if hit {
            return kind;
        }
    }
    TokenKind::Unknown
}

/// Strip the token prefix, returning the argument bytes.
pub fn arguments(token: &[u8], kind: TokenKind) -> &[u8] {
    PREFIXES
        .iter()
        .find(|(_, k, _)| *k == kind)
        .and_then(|(prefix, _, _)| token.get(prefix.len()..))
        .unwrap_or(&[])
}
