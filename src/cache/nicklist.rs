//! Cached nicklist replies.
//!
//! Full lists are rebuilt from the live users at most once per
//! `rebuild_period` unless marked dirty. Joins in between are appended to
//! the `hello_update` and `info_update` deltas, so a reply is always the
//! full lists followed by the deltas.

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use nmdc_proto::{Supports, encode};

/// A listed user as seen by a rebuild.
#[derive(Debug, Clone, Copy)]
pub struct NickEntry<'a> {
    pub nick: &'a str,
    pub myinfo: &'a Bytes,
    pub op: bool,
}

#[derive(Debug)]
pub struct NicklistCache {
    nicklist: Bytes,
    oplist: Bytes,
    infolist: Bytes,
    hello_update: BytesMut,
    info_update: BytesMut,
    dirty: bool,
    last_rebuild: Instant,
    rebuild_period: Duration,
    spare_divisor: usize,
    rebuilds: u64,
}

impl NicklistCache {
    pub fn new(rebuild_period: Duration, spare_divisor: usize, now: Instant) -> Self {
        Self {
            nicklist: encode::nick_list(encode::NICKLIST_PREFIX, []),
            oplist: encode::nick_list(encode::OPLIST_PREFIX, []),
            infolist: Bytes::new(),
            hello_update: BytesMut::new(),
            info_update: BytesMut::new(),
            dirty: true,
            last_rebuild: now,
            rebuild_period,
            spare_divisor: spare_divisor.max(1),
            rebuilds: 0,
        }
    }

    pub fn configure(&mut self, rebuild_period: Duration, spare_divisor: usize) {
        self.rebuild_period = rebuild_period;
        self.spare_divisor = spare_divisor.max(1);
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn needs_rebuild(&self, now: Instant) -> bool {
        self.dirty || now.saturating_duration_since(self.last_rebuild) >= self.rebuild_period
    }

    /// Record a join since the last rebuild.
    pub fn add(&mut self, nick: &str, myinfo: &Bytes) {
        self.hello_update.extend_from_slice(&encode::hello(nick));
        self.info_update.extend_from_slice(myinfo);
        self.check_spare();
    }

    /// Record a changed MyINFO since the last rebuild.
    pub fn update_info(&mut self, myinfo: &Bytes) {
        self.info_update.extend_from_slice(myinfo);
        self.check_spare();
    }

    /// Regenerate the full lists and clear the deltas.
    pub fn rebuild<'a, I>(&mut self, users: I, now: Instant)
    where
        I: IntoIterator<Item = NickEntry<'a>>,
    {
        let mut nicks = Vec::new();
        let mut ops = Vec::new();
        let mut info = BytesMut::new();
        for entry in users {
            nicks.push(entry.nick);
            if entry.op {
                ops.push(entry.nick);
            }
            info.extend_from_slice(entry.myinfo);
        }
        self.nicklist = encode::nick_list(encode::NICKLIST_PREFIX, nicks);
        self.oplist = encode::nick_list(encode::OPLIST_PREFIX, ops);
        self.infolist = info.freeze();
        self.hello_update.clear();
        self.info_update.clear();
        self.dirty = false;
        self.last_rebuild = now;
        self.rebuilds += 1;
    }

    /// Buffers answering `$GetNickList` for a client with `supports`.
    pub fn reply(&self, supports: Supports) -> Vec<Bytes> {
        let mut out = vec![self.nicklist.clone(), self.oplist.clone()];
        if !supports.contains(Supports::NO_HELLO) && !self.hello_update.is_empty() {
            out.push(Bytes::copy_from_slice(&self.hello_update));
        }
        if supports.contains(Supports::NO_GET_INFO) || supports.contains(Supports::NO_HELLO) {
            out.push(self.infolist.clone());
            if !self.info_update.is_empty() {
                out.push(Bytes::copy_from_slice(&self.info_update));
            }
        }
        out
    }

    /// Deltas may grow to a fraction of the full lists before a rebuild
    /// becomes the cheaper option.
    fn check_spare(&mut self) {
        let full = self.nicklist.len() + self.infolist.len();
        let deltas = self.hello_update.len() + self.info_update.len();
        if deltas > full / self.spare_divisor {
            self.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(nick: &str) -> Bytes {
        Bytes::from(format!("$MyINFO $ALL {nick} d$ $DSL\x01$$0$|"))
    }

    #[test]
    fn test_rebuild_lists() {
        let now = Instant::now();
        let mut cache = NicklistCache::new(Duration::from_secs(60), 8, now);
        assert!(cache.needs_rebuild(now));
        let (a, b) = (info("alice"), info("bob"));
        cache.rebuild(
            [
                NickEntry { nick: "alice", myinfo: &a, op: true },
                NickEntry { nick: "bob", myinfo: &b, op: false },
            ],
            now,
        );
        assert!(!cache.needs_rebuild(now));
        let reply = cache.reply(Supports::EMPTY);
        assert_eq!(reply[0], "$NickList alice$$bob$$|");
        assert_eq!(reply[1], "$OpList alice$$|");
        assert_eq!(reply.len(), 2);

        let reply = cache.reply(Supports::NO_HELLO);
        assert_eq!(reply.len(), 3);
        assert!(reply[2].starts_with(b"$MyINFO $ALL alice"));
        assert!(cache.needs_rebuild(now + Duration::from_secs(60)));
    }

    #[test]
    fn test_join_delta_then_spare_overflow() {
        let now = Instant::now();
        let mut cache = NicklistCache::new(Duration::from_secs(60), 1, now);
        let a = info("alice");
        cache.rebuild([NickEntry { nick: "alice", myinfo: &a, op: false }], now);

        let c = info("carol");
        cache.add("carol", &c);
        let reply = cache.reply(Supports::EMPTY);
        assert_eq!(reply[2], "$Hello carol|");
        assert!(!cache.is_dirty());

        for _ in 0..4 {
            cache.update_info(&c);
        }
        assert!(cache.is_dirty());
    }
}
