//! Recently departed users.
//!
//! A user who leaves after being fully online stays listed for the
//! `delayed_logout` grace period. Others keep seeing them in the nicklist,
//! and a reconnect from the same identity gets its rate buckets and search
//! history back instead of a fresh allowance.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Instant;

use bytes::Bytes;

use super::user::User;
use crate::security::{RateLimitTable, TthRing};

#[derive(Debug)]
pub struct DepartedUser {
    pub nick: String,
    pub ip: Ipv4Addr,
    pub share: u64,
    pub myinfo: Bytes,
    pub op: bool,
    pub hidden: bool,
    pub rates: RateLimitTable,
    pub tth: TthRing,
    pub expires: Instant,
}

impl DepartedUser {
    /// Trimmed copy of an online user. `None` if the user never sent a
    /// MyINFO.
    pub fn from_user(user: User, expires: Instant) -> Option<Self> {
        let op = user.is_op();
        let hidden = user.is_hidden();
        Some(Self {
            myinfo: user.myinfo?,
            nick: user.nick,
            ip: user.ip,
            share: user.share,
            op,
            hidden,
            rates: user.rates,
            tth: user.tth,
            expires,
        })
    }

    /// A returning session is the same identity unless both its IP and its
    /// share differ from the departed one.
    pub fn matches(&self, ip: Ipv4Addr, share: u64) -> bool {
        self.ip == ip || self.share == share
    }
}

#[derive(Debug, Default)]
pub struct CacheList {
    entries: HashMap<String, DepartedUser>,
}

impl CacheList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep `user` until its grace period ends. Replaces an older entry for
    /// the same nick, which is returned.
    pub fn insert(&mut self, user: DepartedUser) -> Option<DepartedUser> {
        self.entries.insert(user.nick.to_ascii_lowercase(), user)
    }

    pub fn get(&self, nick: &str) -> Option<&DepartedUser> {
        self.entries.get(&nick.to_ascii_lowercase())
    }

    pub fn contains(&self, nick: &str) -> bool {
        self.entries.contains_key(&nick.to_ascii_lowercase())
    }

    pub fn take(&mut self, nick: &str) -> Option<DepartedUser> {
        self.entries.remove(&nick.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &DepartedUser> {
        self.entries.values()
    }

    /// Remove and return every entry whose grace period has ended.
    pub fn expire(&mut self, now: Instant) -> Vec<DepartedUser> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, user)| user.expires <= now)
            .map(|(key, _)| key.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|key| self.entries.remove(&key))
            .collect()
    }
}
