//! Netmask-aware ban table.
//!
//! Entries are indexed twice: by `(network, prefix length)` and by
//! lowercased nick. A per-prefix-length usage counter lets
//! [`BanList::find_by_ip_any_mask`] probe only the prefix lengths that are
//! actually in use, from the most specific (/32) down to /0. Expired entries
//! are deleted lazily by whichever lookup meets them, and in bulk by
//! [`BanList::sweep_expired`].
//!
//! An entry takes part in IP lookups unless it is a pure nick ban (a nick
//! with an unspecified `0.0.0.0/0` address).

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ban table errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BanError {
    #[error("invalid netmask: {0}")]
    InvalidNetmask(Ipv4Addr),
}

/// Handle to an entry, stable until the entry is deleted.
pub type BanId = u64;

/// A single ban.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanEntry {
    /// Network address (already masked).
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub nick: Option<String>,
    /// Nick of the operator who issued the ban.
    pub op: String,
    pub reason: String,
    /// Unix time after which the ban lapses; `None` is permanent.
    pub expiry: Option<i64>,
}

impl BanEntry {
    pub fn prefix_len(&self) -> u8 {
        u32::from(self.netmask).leading_ones() as u8
    }

    /// Whether the entry takes part in IP lookups.
    pub fn is_ip_ban(&self) -> bool {
        self.nick.is_none() || self.netmask != Ipv4Addr::UNSPECIFIED
    }

    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expiry, Some(expiry) if now > expiry)
    }

    /// Seconds left, `None` for permanent bans.
    pub fn remaining(&self, now: i64) -> Option<i64> {
        self.expiry.map(|expiry| (expiry - now).max(0))
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.is_ip_ban() && u32::from(ip) & u32::from(self.netmask) == u32::from(self.ip)
    }

    pub fn network(&self) -> Option<Ipv4Net> {
        Ipv4Net::new(self.ip, self.prefix_len()).ok()
    }
}

fn mask_of(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        len => u32::MAX << (32 - u32::from(len.min(32))),
    }
}

/// Prefix length of a contiguous netmask.
pub fn prefix_of(netmask: Ipv4Addr) -> Result<u8, BanError> {
    let bits = u32::from(netmask);
    let ones = bits.leading_ones();
    if ones + bits.trailing_zeros() == 32 {
        Ok(ones as u8)
    } else {
        Err(BanError::InvalidNetmask(netmask))
    }
}

fn nick_key(nick: &str) -> String {
    nick.to_ascii_lowercase()
}

#[derive(Debug)]
pub struct BanList {
    entries: BTreeMap<BanId, BanEntry>,
    by_ip: HashMap<(u32, u8), Vec<BanId>>,
    by_nick: HashMap<String, Vec<BanId>>,
    prefix_usage: [u32; 33],
    next_id: BanId,
}

impl Default for BanList {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            by_ip: HashMap::new(),
            by_nick: HashMap::new(),
            prefix_usage: [0; 33],
            next_id: BanId::default(),
        }
    }
}

impl BanList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order, expired ones included.
    pub fn iter(&self) -> impl Iterator<Item = (BanId, &BanEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    pub fn get(&self, id: BanId) -> Option<&BanEntry> {
        self.entries.get(&id)
    }

    /// Insert a ban, replacing an existing one with the same nick, network
    /// and netmask.
    pub fn add(
        &mut self,
        op: &str,
        nick: Option<&str>,
        ip: Ipv4Addr,
        netmask: Ipv4Addr,
        reason: &str,
        expiry: Option<i64>,
    ) -> Result<&BanEntry, BanError> {
        let prefix = prefix_of(netmask)?;
        let network = Ipv4Addr::from(u32::from(ip) & mask_of(prefix));
        let nick = nick.filter(|n| !n.is_empty());

        let entry = BanEntry {
            ip: network,
            netmask,
            nick: nick.map(str::to_string),
            op: op.to_string(),
            reason: reason.to_string(),
            expiry,
        };
        if let Some(existing) = self.find_exact(&entry) {
            self.remove(existing);
        }
        Ok(self.insert(entry))
    }

    /// Convenience wrapper taking an `ipnet` network.
    pub fn add_net(
        &mut self,
        op: &str,
        nick: Option<&str>,
        net: Ipv4Net,
        reason: &str,
        expiry: Option<i64>,
    ) -> Result<&BanEntry, BanError> {
        self.add(op, nick, net.network(), net.netmask(), reason, expiry)
    }

    fn insert(&mut self, entry: BanEntry) -> &BanEntry {
        let id = self.next_id;
        self.next_id += 1;
        if entry.is_ip_ban() {
            let prefix = entry.prefix_len();
            self.by_ip
                .entry((u32::from(entry.ip), prefix))
                .or_default()
                .push(id);
            self.prefix_usage[usize::from(prefix)] += 1;
        }
        if let Some(nick) = &entry.nick {
            self.by_nick.entry(nick_key(nick)).or_default().push(id);
        }
        self.entries.entry(id).or_insert(entry)
    }

    fn find_exact(&self, entry: &BanEntry) -> Option<BanId> {
        let same_nick = |other: &BanEntry| {
            match (&other.nick, &entry.nick) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                (None, None) => true,
                _ => false,
            }
        };
        self.by_ip
            .get(&(u32::from(entry.ip), entry.prefix_len()))
            .into_iter()
            .chain(entry.nick.as_ref().and_then(|n| self.by_nick.get(&nick_key(n))))
            .flatten()
            .copied()
            .find(|id| {
                self.entries.get(id).is_some_and(|other| {
                    other.ip == entry.ip && other.netmask == entry.netmask && same_nick(other)
                })
            })
    }

    fn remove(&mut self, id: BanId) -> Option<BanEntry> {
        let entry = self.entries.remove(&id)?;
        if entry.is_ip_ban() {
            let prefix = entry.prefix_len();
            let key = (u32::from(entry.ip), prefix);
            if let Some(ids) = self.by_ip.get_mut(&key) {
                ids.retain(|other| *other != id);
                if ids.is_empty() {
                    self.by_ip.remove(&key);
                }
            }
            let usage = &mut self.prefix_usage[usize::from(prefix)];
            *usage = usage.saturating_sub(1);
        }
        if let Some(nick) = &entry.nick {
            let key = nick_key(nick);
            if let Some(ids) = self.by_nick.get_mut(&key) {
                ids.retain(|other| *other != id);
                if ids.is_empty() {
                    self.by_nick.remove(&key);
                }
            }
        }
        Some(entry)
    }

    /// Drop expired ids from `ids`, returning the live ones in insertion
    /// order.
    fn purge_expired(&mut self, ids: Vec<BanId>, now: i64) -> Vec<BanId> {
        let mut live = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            if entry.is_expired(now) {
                self.remove(id);
            } else {
                live.push(id);
            }
        }
        live
    }

    /// Most recently added live id.
    fn latest_live(&mut self, ids: Vec<BanId>, now: i64) -> Option<BanId> {
        self.purge_expired(ids, now).into_iter().max()
    }

    /// First live id after `after`.
    fn first_live(&mut self, ids: Vec<BanId>, after: Option<BanId>, now: i64) -> Option<BanId> {
        self.purge_expired(ids, now)
            .into_iter()
            .filter(|id| after.is_none_or(|after| *id > after))
            .min()
    }

    fn ip_bucket(&self, network: u32, prefix: u8) -> Vec<BanId> {
        self.by_ip
            .get(&(network, prefix))
            .cloned()
            .unwrap_or_default()
    }

    fn nick_bucket(&self, nick: &str) -> Vec<BanId> {
        self.by_nick
            .get(&nick_key(nick))
            .cloned()
            .unwrap_or_default()
    }

    pub fn find_by_ip_and_mask(
        &mut self,
        ip: Ipv4Addr,
        netmask: Ipv4Addr,
        now: i64,
    ) -> Option<&BanEntry> {
        let prefix = prefix_of(netmask).ok()?;
        let ids = self.ip_bucket(u32::from(ip) & mask_of(prefix), prefix);
        let id = self.latest_live(ids, now)?;
        self.entries.get(&id)
    }

    /// Most specific live ban covering `ip`.
    pub fn find_by_ip_any_mask(&mut self, ip: Ipv4Addr, now: i64) -> Option<&BanEntry> {
        let mut hit = None;
        for prefix in (0..=32u8).rev() {
            if self.prefix_usage[usize::from(prefix)] == 0 {
                continue;
            }
            let ids = self.ip_bucket(u32::from(ip) & mask_of(prefix), prefix);
            if let Some(id) = self.latest_live(ids, now) {
                hit = Some(id);
                break;
            }
        }
        self.entries.get(&hit?)
    }

    pub fn find_by_nick(&mut self, nick: &str, now: i64) -> Option<&BanEntry> {
        let ids = self.nick_bucket(nick);
        let id = self.latest_live(ids, now)?;
        self.entries.get(&id)
    }

    /// Walk every live ban for `nick`. Pass the previous id as `cursor` to
    /// get the next one.
    pub fn find_by_nick_iterate(
        &mut self,
        nick: &str,
        cursor: Option<BanId>,
        now: i64,
    ) -> Option<(BanId, &BanEntry)> {
        let ids = self.nick_bucket(nick);
        let id = self.first_live(ids, cursor, now)?;
        self.entries.get(&id).map(|entry| (id, entry))
    }

    pub fn delete(&mut self, id: BanId) -> bool {
        self.remove(id).is_some()
    }

    /// Delete every entry for exactly this network.
    pub fn delete_by_ip(&mut self, ip: Ipv4Addr, netmask: Ipv4Addr) -> usize {
        let Ok(prefix) = prefix_of(netmask) else {
            return 0;
        };
        let ids = self.ip_bucket(u32::from(ip) & mask_of(prefix), prefix);
        ids.into_iter().filter(|id| self.remove(*id).is_some()).count()
    }

    pub fn delete_by_nick(&mut self, nick: &str) -> usize {
        let ids = self.nick_bucket(nick);
        ids.into_iter().filter(|id| self.remove(*id).is_some()).count()
    }

    /// Delete every expired entry, returning how many went.
    pub fn sweep_expired(&mut self, now: i64) -> usize {
        let expired: Vec<BanId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(id, _)| *id)
            .collect();
        expired
            .into_iter()
            .filter(|id| self.remove(*id).is_some())
            .count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_ip.clear();
        self.by_nick.clear();
        self.prefix_usage = [0; 33];
    }
}
