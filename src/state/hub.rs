//! Hub - the single owner of all hub state.
//!
//! One actor task owns the `Hub` and is the only code that mutates it, so
//! nothing here locks. Sessions live in a `BTreeMap` keyed by connection id,
//! which makes every walk over the users (nicklist rebuilds, flushes)
//! deterministic.
//!
//! The disconnect path is idempotent and releases a connection from every
//! index in the same call.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::{Duration, Instant};

use bytes::Bytes;
use nmdc_proto::{ProtocolError, encode};
use tracing::{debug, info, warn};

use super::accounts::Accounts;
use super::cachelist::{CacheList, DepartedUser};
use super::clock::Clock;
use super::stats::{HubStats, Refusal};
use super::uid::{ConnId, ConnIdGenerator};
use super::user::{ProtocolState, User};
use crate::cache::{BroadcastCache, CacheClass};
use crate::config::{Config, ConfigStore, StoreError};
use crate::events::{PluginBus, PluginEvent};
use crate::metrics;
use crate::network::{BufferLimits, ConnectionState, OutputState, TimerKind, TimerQueue, Transport, WriteOutcome};
use crate::persistence::{self, PersistenceError};
use crate::security::{BanEntry, BanList, ConnectionThrottle, LeakyBucket};

/// Seconds between ban and throttle sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Software name advertised in `$Lock` and `$HubINFO`.
pub const SOFTWARE: &str = "nmdc-hubd";

/// A live connection: its socket side and its protocol identity.
pub struct Session {
    pub conn: ConnectionState,
    pub user: User,
}

pub struct Hub {
    pub(crate) config: Config,
    pub(crate) store: ConfigStore,
    pub(crate) limits: BufferLimits,
    pub(crate) clock: Clock,
    pub(crate) stats: HubStats,
    pub(crate) events: PluginBus,
    pub(crate) accounts: Accounts,
    pub(crate) soft_bans: BanList,
    pub(crate) hard_bans: BanList,
    pub(crate) reconnect_bans: BanList,
    pub(crate) cache: BroadcastCache,
    pub(crate) cachelist: CacheList,
    pub(crate) sessions: BTreeMap<ConnId, Session>,
    pub(crate) nicks: HashMap<String, ConnId>,
    pub(crate) timers: TimerQueue,
    pub(crate) ids: ConnIdGenerator,
    pub(crate) buffered_total: usize,
    pub(crate) connects: LeakyBucket,
    pub(crate) throttle: ConnectionThrottle,
    pub(crate) hubsec_info: Bytes,
    last_flush: Instant,
    last_sweep: Instant,
    last_save: Instant,
}

fn hubsec_myinfo(config: &Config) -> Bytes {
    Bytes::from(format!(
        "$MyINFO $ALL {} {}$ $\x01$$0$|",
        config.hub.hubsec_nick, config.hub.hubsec_description
    ))
}

impl Hub {
    pub fn new(config: Config) -> Self {
        let clock = Clock::now();
        let now = clock.mono();
        Self {
            store: ConfigStore::new(),
            limits: BufferLimits::from(&config.limits),
            stats: HubStats::new(),
            events: PluginBus::new(),
            accounts: Accounts::new(),
            soft_bans: BanList::new(),
            hard_bans: BanList::new(),
            reconnect_bans: BanList::new(),
            cache: BroadcastCache::new(&config.cache, now),
            cachelist: CacheList::new(),
            sessions: BTreeMap::new(),
            nicks: HashMap::new(),
            timers: TimerQueue::new(),
            ids: ConnIdGenerator::new(),
            buffered_total: 0,
            connects: LeakyBucket::full(&config.rates.connects, now),
            throttle: ConnectionThrottle::new(config.security.connection_burst_per_ip),
            hubsec_info: hubsec_myinfo(&config),
            last_flush: now,
            last_sweep: now,
            last_save: now,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &HubStats {
        &self.stats
    }

    pub fn events_mut(&mut self) -> &mut PluginBus {
        &mut self.events
    }

    pub fn accounts_mut(&mut self) -> &mut Accounts {
        &mut self.accounts
    }

    /// Monotonic now, as of the last clock sync.
    pub fn now(&self) -> Instant {
        self.clock.mono()
    }

    /// Unix seconds, as of the last clock sync.
    pub fn wall(&self) -> i64 {
        self.clock.wall()
    }

    /// Move the hub clock forward without waiting. Test hook.
    pub fn advance_clock(&mut self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn buffered_total(&self) -> usize {
        self.buffered_total
    }

    pub fn emit(&mut self, event: PluginEvent) -> bool {
        self.events.emit(&event)
    }

    // ------------------------------------------------------------------
    // Admission and registration
    // ------------------------------------------------------------------

    /// Accept-time admission. A refused socket gets no bytes at all.
    pub fn admit(&mut self, ip: Ipv4Addr) -> Result<(), Refusal> {
        let now = self.clock.mono();
        let wall = self.clock.wall();
        let refusal = if self.hard_bans.find_by_ip_any_mask(ip, wall).is_some() {
            metrics::record_ban("hard");
            Some(Refusal::HardBan)
        } else if self.buffered_total >= self.limits.total {
            Some(Refusal::BufferBudget)
        } else if !self.connects.try_take(&self.config.rates.connects, now) {
            Some(Refusal::HubThrottle)
        } else if !self.throttle.check(ip) {
            Some(Refusal::IpThrottle)
        } else {
            None
        };
        match refusal {
            Some(reason) => {
                self.stats.refused(reason);
                Err(reason)
            }
            None => Ok(()),
        }
    }

    pub fn next_id(&mut self) -> ConnId {
        self.ids.next_id()
    }

    /// Start tracking an admitted connection.
    pub fn register(&mut self, id: ConnId, ip: Ipv4Addr, transport: Box<dyn Transport>) {
        let user = User::new(
            id,
            ip,
            &self.config.rates,
            self.config.security.tth_ring_size,
            self.clock.mono(),
        );
        let conn = ConnectionState::new(id, ip, transport);
        self.sessions.insert(id, Session { conn, user });
        self.stats.accepted();
        self.emit(PluginEvent::Connect { ip });
        info!(%id, %ip, "Connection accepted");
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn session(&self, id: ConnId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: ConnId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn user(&self, id: ConnId) -> Option<&User> {
        self.sessions.get(&id).map(|s| &s.user)
    }

    pub fn user_mut(&mut self, id: ConnId) -> Option<&mut User> {
        self.sessions.get_mut(&id).map(|s| &mut s.user)
    }

    /// Connection currently holding `nick` (any state past nick validation).
    pub fn find_nick(&self, nick: &str) -> Option<ConnId> {
        self.nicks.get(&nick.to_ascii_lowercase()).copied()
    }

    /// Online user by nick.
    pub fn find_online(&self, nick: &str) -> Option<&User> {
        self.find_nick(nick)
            .and_then(|id| self.user(id))
            .filter(|user| user.is_online())
    }

    pub fn online_count(&self) -> usize {
        self.sessions.values().filter(|s| s.user.is_online()).count()
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_hubsec(&self, nick: &[u8]) -> bool {
        nick.eq_ignore_ascii_case(self.config.hub.hubsec_nick.as_bytes())
    }

    /// Claim `nick` for `id`.
    pub fn bind_nick(&mut self, id: ConnId, nick: &str) {
        self.nicks.insert(nick.to_ascii_lowercase(), id);
        if let Some(user) = self.user_mut(id) {
            user.nick = nick.to_string();
        }
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// Write `bufs` to `id`. Returns false if the connection is gone or the
    /// write failed (in which case it has been disconnected).
    pub fn send(&mut self, id: ConnId, bufs: &[Bytes]) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        let result = session
            .conn
            .write(bufs, &self.limits, &mut self.buffered_total);
        let epoch = session.conn.epoch();
        match result {
            Ok((outcome, change)) => {
                if outcome == WriteOutcome::Dropped {
                    self.stats.buffer_drop();
                    debug!(%id, "Output dropped by buffer limits");
                }
                if let Some(state) = change {
                    self.arm_output_timer(id, state, epoch);
                }
                metrics::set_buffered_bytes(self.buffered_total);
                true
            }
            Err(e) => {
                debug!(%id, error = %e, "Write failed");
                self.disconnect(id, "Write error");
                false
            }
        }
    }

    pub fn send_one(&mut self, id: ConnId, buf: Bytes) -> bool {
        self.send(id, &[buf])
    }

    /// Main-chat line from the hub security bot to `id` alone.
    pub fn hub_message(&mut self, id: ConnId, text: &str) -> bool {
        let msg = encode::chat(&self.config.hub.hubsec_nick, text.as_bytes());
        self.send_one(id, msg)
    }

    /// Private message from the hub security bot.
    pub fn hub_pm(&mut self, id: ConnId, text: &str) -> bool {
        let Some(nick) = self.user(id).map(|u| u.nick.clone()) else {
            return false;
        };
        let hubsec = &self.config.hub.hubsec_nick;
        let msg = encode::private_message(&nick, hubsec, text.as_bytes());
        self.send_one(id, msg)
    }

    /// Give `id` headroom for a large hub-pushed payload.
    pub fn grant_credit(&mut self, id: ConnId, bytes: usize) {
        if !self.config.limits.nicklist_credit {
            return;
        }
        if let Some(session) = self.sessions.get_mut(&id) {
            session.conn.grant_credit(bytes);
        }
    }

    /// Queue a broadcast and count it against its author.
    pub fn broadcast(&mut self, class: CacheClass, author: Option<ConnId>, msg: Bytes) {
        if let Some(user) = author.and_then(|id| self.user_mut(id)) {
            user.cache_sent[class.index()] += 1;
        }
        self.cache.enqueue(class, author, msg);
    }

    /// Drop `author`'s queued entries in `class`.
    pub fn purge(&mut self, class: CacheClass, author: ConnId) {
        let removed = self.cache.purge(class, author) as u32;
        if let Some(user) = self.user_mut(author) {
            let sent = &mut user.cache_sent[class.index()];
            *sent = sent.saturating_sub(removed);
        }
    }

    /// The socket can take more output.
    pub fn on_writable(&mut self, id: ConnId) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        let result = session
            .conn
            .on_writable(&self.limits, &mut self.buffered_total);
        let epoch = session.conn.epoch();
        match result {
            Ok(Some(state)) => self.arm_output_timer(id, state, epoch),
            Ok(None) => {}
            Err(e) => {
                debug!(%id, error = %e, "Drain failed");
                self.disconnect(id, "Write error");
            }
        }
        metrics::set_buffered_bytes(self.buffered_total);
    }

    fn arm_output_timer(&mut self, id: ConnId, state: OutputState, epoch: u64) {
        let now = self.clock.mono();
        let (kind, secs) = match state {
            OutputState::Buffering => (TimerKind::Buffering, self.config.limits.timeout_buffering),
            OutputState::Overflow => (TimerKind::Overflow, self.config.limits.timeout_overflow),
            OutputState::Normal | OutputState::Closed => return,
        };
        debug!(%id, state = state.name(), "Output state changed");
        self.timers.arm(now + Duration::from_secs(secs), id, kind, epoch);
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    pub fn feed(&mut self, id: ConnId, data: &[u8]) {
        let block = self.config.limits.block_on_overflow;
        let max = self.config.limits.max_token_length;
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        if let Err(e) = session.conn.feed(data, block, max) {
            warn!(%id, error = %e, "Input overflow while output is blocked");
            self.disconnect(id, "Input overflow");
        }
    }

    /// Next complete token from `id`, unless its input is withheld.
    pub fn next_token(&mut self, id: ConnId) -> Option<Result<Bytes, ProtocolError>> {
        let block = self.config.limits.block_on_overflow;
        let max = self.config.limits.max_token_length;
        let session = self.sessions.get_mut(&id)?;
        if session.conn.input_blocked(block) {
            return None;
        }
        session.conn.next_token(max).transpose()
    }

    // ------------------------------------------------------------------
    // Protocol state
    // ------------------------------------------------------------------

    /// Move `id` to `state`. Each handshake step gets its own timeout.
    pub fn set_state(&mut self, id: ConnId, state: ProtocolState) {
        let now = self.clock.mono();
        let timeout = Duration::from_secs(self.config.login.handshake_timeout);
        let Some(user) = self.user_mut(id) else {
            return;
        };
        let from = user.state;
        let epoch = user.set_state(state);
        debug!(%id, %from, to = %state, "State change");
        if state.in_handshake() {
            self.timers.arm(now + timeout, id, TimerKind::Handshake, epoch);
        }
    }

    /// Fire every due timer whose guarded state is unchanged.
    pub fn fire_timers(&mut self) {
        let now = self.clock.mono();
        for deadline in self.timers.expired(now) {
            let Some(session) = self.sessions.get(&deadline.id) else {
                continue;
            };
            match deadline.kind {
                TimerKind::Handshake => {
                    let user = &session.user;
                    if user.state.in_handshake() && user.state_epoch == deadline.epoch {
                        info!(id = %deadline.id, state = %user.state, "Handshake timeout");
                        self.disconnect(deadline.id, "Handshake timeout");
                    }
                }
                TimerKind::Buffering | TimerKind::Overflow => {
                    if session.conn.epoch() != deadline.epoch {
                        continue;
                    }
                    let reason = if deadline.kind == TimerKind::Buffering {
                        self.stats.buffering_timeouts += 1;
                        "Buffering timeout"
                    } else {
                        self.stats.overflow_timeouts += 1;
                        "Overflow timeout"
                    };
                    if self.config.limits.disconnect_on_timeout {
                        info!(id = %deadline.id, "{reason}");
                        self.disconnect(deadline.id, reason);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Disconnect
    // ------------------------------------------------------------------

    /// Release `id` from every index. Calling it twice is a no-op.
    pub fn disconnect(&mut self, id: ConnId, reason: &str) {
        let Some(mut session) = self.sessions.remove(&id) else {
            return;
        };
        session.conn.close(&mut self.buffered_total);
        self.cache.forget(id);
        metrics::set_buffered_bytes(self.buffered_total);

        let mut user = session.user;
        let was_online = user.is_online();
        user.set_state(ProtocolState::Disconnected);
        if !user.nick.is_empty() && self.nicks.get(&user.nick_key()) == Some(&id) {
            self.nicks.remove(&user.nick_key());
        }
        info!(%id, ip = %user.ip, nick = %user.nick, %reason, "Connection closed");

        if !was_online {
            return;
        }
        metrics::set_online_users(self.online_count());
        self.emit(PluginEvent::Logout {
            nick: user.nick.clone(),
            reason: reason.to_string(),
        });

        let wall = self.clock.wall();
        let reconnect = self.config.login.reconnect_bantime;
        if reconnect > 0 {
            let expiry = Some(wall + reconnect as i64);
            if let Err(e) = self.reconnect_bans.add(
                SOFTWARE,
                Some(&user.nick),
                user.ip,
                Ipv4Addr::BROADCAST,
                "reconnecting too fast",
                expiry,
            ) {
                warn!(error = %e, "Failed to record reconnect ban");
            }
        }

        let hidden = user.is_hidden();
        let nick = user.nick.clone();
        let grace = self.config.login.delayed_logout;
        if grace > 0 && !hidden {
            let expires = self.clock.mono() + Duration::from_secs(grace);
            if let Some(departed) = DepartedUser::from_user(user, expires) {
                self.cachelist.insert(departed);
                return;
            }
        }
        if !hidden {
            self.cache.enqueue(CacheClass::Quit, None, encode::quit(&nick));
        }
        self.cache.nicklist.mark_dirty();
    }

    /// Evict departed users whose grace period ran out.
    pub fn sweep_cachelist(&mut self) {
        let now = self.clock.mono();
        for departed in self.cachelist.expire(now) {
            debug!(nick = %departed.nick, "Grace period over");
            if self.find_online(&departed.nick).is_none() {
                self.cache
                    .enqueue(CacheClass::Quit, None, encode::quit(&departed.nick));
            }
            self.cache.nicklist.mark_dirty();
        }
    }

    // ------------------------------------------------------------------
    // Bans
    // ------------------------------------------------------------------

    /// Live soft ban matching `nick` or `ip`.
    pub fn soft_ban_for(&mut self, nick: &str, ip: Ipv4Addr) -> Option<BanEntry> {
        let wall = self.clock.wall();
        if let Some(entry) = self.soft_bans.find_by_nick(nick, wall) {
            return Some(entry.clone());
        }
        self.soft_bans.find_by_ip_any_mask(ip, wall).cloned()
    }

    /// Live reconnect ban for `nick` or `ip`.
    pub fn reconnect_ban_for(&mut self, nick: &str, ip: Ipv4Addr) -> Option<BanEntry> {
        let wall = self.clock.wall();
        if let Some(entry) = self.reconnect_bans.find_by_nick(nick, wall) {
            return Some(entry.clone());
        }
        self.reconnect_bans.find_by_ip_any_mask(ip, wall).cloned()
    }

    /// Hard-ban `ip` and drop it. Used for exploit signatures.
    pub fn hard_ban_ip(&mut self, ip: Ipv4Addr, secs: u64, reason: &str) {
        let expiry = (secs > 0).then(|| self.clock.wall() + secs as i64);
        if let Err(e) = self
            .hard_bans
            .add(SOFTWARE, None, ip, Ipv4Addr::BROADCAST, reason, expiry)
        {
            warn!(error = %e, "Failed to add hard ban");
        }
        metrics::record_ban("hard");
        warn!(%ip, %reason, "IP hard-banned");
    }

    // ------------------------------------------------------------------
    // Config
    // ------------------------------------------------------------------

    pub fn config_get(&self, key: &str) -> Result<String, StoreError> {
        self.store.get(&self.config, key)
    }

    pub fn config_list(&self, prefix: &str) -> Vec<(&'static str, crate::config::ValueKind, String)> {
        self.store.list(&self.config, prefix)
    }

    /// Set a config key at runtime. Plugins may veto the change.
    pub fn config_set(&mut self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut candidate = self.config.clone();
        self.store.set(&mut candidate, key, value)?;
        let event = PluginEvent::ConfigChange {
            key: key.to_string(),
            value: value.to_string(),
        };
        if !self.emit(event) {
            return Ok(false);
        }
        self.config = candidate;
        self.apply_config();
        info!(%key, %value, "Config changed");
        Ok(true)
    }

    fn apply_config(&mut self) {
        self.limits = BufferLimits::from(&self.config.limits);
        self.cache.configure(&self.config.cache);
        self.throttle = ConnectionThrottle::new(self.config.security.connection_burst_per_ip);
        self.hubsec_info = hubsec_myinfo(&self.config);
        self.cache.nicklist.mark_dirty();
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Write banlists and accounts.
    pub fn save(&mut self) -> Result<(), PersistenceError> {
        let wall = self.clock.wall();
        let files = &self.config.files;
        let soft = persistence::save_bans(&self.soft_bans, Path::new(&files.banlist), wall)?;
        let hard = persistence::save_bans(&self.hard_bans, Path::new(&files.hardbanlist), wall)?;
        persistence::save_accounts(&self.accounts, Path::new(&files.accounts))?;
        self.last_save = self.clock.mono();
        self.emit(PluginEvent::Save);
        info!(soft, hard, accounts = self.accounts.len(), "State saved");
        Ok(())
    }

    /// Read banlists and accounts. Missing files leave the current state;
    /// a file that fails to load is reported and skipped.
    pub fn load(&mut self) -> Vec<PersistenceError> {
        let wall = self.clock.wall();
        let files = self.config.files.clone();
        let mut errors = Vec::new();

        for (path, hard) in [(&files.banlist, false), (&files.hardbanlist, true)] {
            match persistence::load_bans(Path::new(path), wall) {
                Ok(Some(list)) => {
                    info!(%path, entries = list.len(), "Ban list loaded");
                    if hard {
                        self.hard_bans = list;
                    } else {
                        self.soft_bans = list;
                    }
                }
                Ok(None) => info!(%path, "No ban list yet"),
                Err(e) => {
                    warn!(error = %e, "Ban list not loaded");
                    errors.push(e);
                }
            }
        }
        match persistence::load_accounts(Path::new(&files.accounts)) {
            Ok(Some(accounts)) => {
                info!(path = %files.accounts, accounts = accounts.len(), "Accounts loaded");
                self.accounts = accounts;
            }
            Ok(None) => info!(path = %files.accounts, "No accounts yet"),
            Err(e) => {
                warn!(error = %e, "Accounts not loaded");
                errors.push(e);
            }
        }
        self.emit(PluginEvent::Load);
        errors
    }

    // ------------------------------------------------------------------
    // Periodic work
    // ------------------------------------------------------------------

    /// Called by the event loop every 100 ms.
    pub fn tick(&mut self) {
        self.clock.sync();
        self.fire_timers();
        let now = self.clock.mono();

        if now.saturating_duration_since(self.last_flush) >= Duration::from_secs(1) {
            self.last_flush = now;
            self.flush();
        }

        if now.saturating_duration_since(self.last_sweep) >= SWEEP_INTERVAL {
            self.last_sweep = now;
            let wall = self.clock.wall();
            let swept = self.soft_bans.sweep_expired(wall)
                + self.hard_bans.sweep_expired(wall)
                + self.reconnect_bans.sweep_expired(wall);
            self.throttle.cleanup();
            if swept > 0 {
                debug!(swept, "Expired bans removed");
            }
        }

        let autosave = self.config.files.autosave_interval;
        if autosave > 0
            && now.saturating_duration_since(self.last_save) >= Duration::from_secs(autosave)
        {
            if let Err(e) = self.save() {
                warn!(error = %e, "Autosave failed");
            }
            self.last_save = now;
        }
    }
}
