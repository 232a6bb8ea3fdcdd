//! Per-connection protocol identity.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Instant;

use bytes::Bytes;
use nmdc_proto::{Mode, Supports, Tag};

use super::rights::Rights;
use super::uid::ConnId;
use crate::cache::CacheClass;
use crate::config::RatesConfig;
use crate::security::{RateLimitTable, TthRing};

/// Handshake and session states, in strict forward order.
///
/// `Virtual` is used by hub-side bots that never traverse the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolState {
    Init,
    /// Lock sent, waiting for `$Supports` or `$Key`.
    SendLock,
    /// `$Supports` received, waiting for `$Key`.
    WaitKey,
    WaitNick,
    WaitPass,
    /// `$Hello` sent, waiting for the first `$MyINFO`.
    Hello,
    Online,
    Disconnected,
    Virtual,
}

impl ProtocolState {
    pub fn name(self) -> &'static str {
        match self {
            ProtocolState::Init => "init",
            ProtocolState::SendLock => "sendlock",
            ProtocolState::WaitKey => "waitkey",
            ProtocolState::WaitNick => "waitnick",
            ProtocolState::WaitPass => "waitpass",
            ProtocolState::Hello => "hello",
            ProtocolState::Online => "online",
            ProtocolState::Disconnected => "disconnected",
            ProtocolState::Virtual => "virtual",
        }
    }

    /// True before `$Key` has been verified.
    pub fn before_key(self) -> bool {
        matches!(
            self,
            ProtocolState::Init | ProtocolState::SendLock | ProtocolState::WaitKey
        )
    }

    /// True while the login handshake is still running.
    pub fn in_handshake(self) -> bool {
        self < ProtocolState::Online
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A connection's protocol identity.
#[derive(Debug)]
pub struct User {
    pub id: ConnId,
    /// Empty until `$ValidateNick` is accepted.
    pub nick: String,
    pub ip: Ipv4Addr,
    pub state: ProtocolState,
    /// Bumped on every state change; handshake timers guard on it.
    pub state_epoch: u64,
    /// Challenge sent in `$Lock`, needed to verify `$Key`.
    pub lock: String,
    pub supports: Supports,
    pub client: String,
    pub version: String,
    pub share: u64,
    pub active: bool,
    pub slots: u32,
    /// Normal/registered/operator hub counts from the tag.
    pub hubs: [u32; 3],
    pub rights: Rights,
    /// Logged in with a registered account.
    pub registered: bool,
    /// Sanitised `$MyINFO`, trailing `|` included.
    pub myinfo: Option<Bytes>,
    pub rates: RateLimitTable,
    pub tth: TthRing,
    /// Own entries waiting in each broadcast class.
    pub cache_sent: [u32; CacheClass::COUNT],
    /// Unix time of login.
    pub joined: i64,
    /// `$GetNickList` arrived before login completed.
    pub delayed_nicklist: bool,
}

impl User {
    pub fn new(
        id: ConnId,
        ip: Ipv4Addr,
        rates: &RatesConfig,
        tth_ring_size: usize,
        now: Instant,
    ) -> Self {
        Self {
            id,
            nick: String::new(),
            ip,
            state: ProtocolState::Init,
            state_epoch: 0,
            lock: String::new(),
            supports: Supports::EMPTY,
            client: String::new(),
            version: String::new(),
            share: 0,
            active: false,
            slots: 0,
            hubs: [0; 3],
            rights: Rights::NONE,
            registered: false,
            myinfo: None,
            rates: RateLimitTable::new(rates, now),
            tth: TthRing::new(tth_ring_size),
            cache_sent: [0; CacheClass::COUNT],
            joined: 0,
            delayed_nicklist: false,
        }
    }

    /// Move to `state`, returning the new epoch.
    pub fn set_state(&mut self, state: ProtocolState) -> u64 {
        self.state = state;
        self.state_epoch += 1;
        self.state_epoch
    }

    pub fn is_online(&self) -> bool {
        self.state == ProtocolState::Online
    }

    pub fn is_op(&self) -> bool {
        self.rights.is_operator()
    }

    pub fn has(&self, right: Rights) -> bool {
        self.rights.contains(right)
    }

    /// Hidden users are left out of every nicklist.
    pub fn is_hidden(&self) -> bool {
        self.rights.contains(Rights::HIDDEN)
    }

    /// Lowercased nick used as the index key.
    pub fn nick_key(&self) -> String {
        self.nick.to_ascii_lowercase()
    }

    pub fn chat_sent(&self) -> u32 {
        self.cache_sent[CacheClass::Chat.index()]
    }

    pub fn search_sent(&self) -> u32 {
        self.cache_sent[CacheClass::Search.index()]
            + self.cache_sent[CacheClass::SearchPassive.index()]
    }

    /// Copy client details from a parsed tag.
    pub fn apply_tag(&mut self, tag: &Tag<'_>) {
        self.client = String::from_utf8_lossy(tag.client).into_owned();
        self.version = String::from_utf8_lossy(tag.version).into_owned();
        self.active = tag.mode == Mode::Active;
        self.slots = tag.slots;
        self.hubs = tag.hubs;
    }

    /// Forget tag details when the MyINFO carries none.
    pub fn clear_tag(&mut self) {
        self.client.clear();
        self.version.clear();
        self.active = false;
        self.slots = 0;
        self.hubs = [0; 3];
    }
}
