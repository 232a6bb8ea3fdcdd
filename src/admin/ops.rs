//! Operator actions on the hub: bans, kicks, drops and redirects.
//!
//! The `$Kick`/`$Close`/`$OpForceMove` tokens and the `!` commands both
//! land here, so a ban placed either way looks the same to the victim,
//! the plugins and the banlist.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use ipnet::Ipv4Net;
use nmdc_proto::encode;
use tracing::{info, warn};

use super::AdminError;
use crate::config::store::format_duration;
use crate::events::PluginEvent;
use crate::metrics;
use crate::state::{ConnId, Hub, Rights};

/// What a ban applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanScope {
    /// The nick alone.
    Nick(String),
    /// The nick, plus its address while it is connected.
    User(String),
    /// Soft ban on an address or network, checked at login.
    Ip(Ipv4Net),
    /// Hard ban, checked at accept time.
    HardIp(Ipv4Net),
}

impl BanScope {
    fn is_hard(&self) -> bool {
        matches!(self, BanScope::HardIp(_))
    }
}

impl fmt::Display for BanScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BanScope::Nick(nick) | BanScope::User(nick) => f.write_str(nick),
            BanScope::Ip(net) | BanScope::HardIp(net) => write!(f, "{net}"),
        }
    }
}

/// The line a banned user reads before being dropped.
pub fn ban_notice(remaining: Option<i64>, reason: &str) -> String {
    let reason = if reason.is_empty() {
        "no reason given"
    } else {
        reason
    };
    match remaining {
        Some(left) => {
            let left = format_duration(Duration::from_secs(left.max(0) as u64));
            format!("You are banned for {left}: {reason}.")
        }
        None => format!("You are banned permanently: {reason}."),
    }
}

impl Hub {
    /// Nick, address and protection of a connected user.
    fn victim(&self, id: ConnId) -> Result<(String, Ipv4Addr), AdminError> {
        let user = self
            .user(id)
            .ok_or_else(|| AdminError::NotOnline(id.to_string()))?;
        if user.has(Rights::OWNER) {
            return Err(AdminError::Protected(user.nick.clone()));
        }
        Ok((user.nick.clone(), user.ip))
    }

    /// Sessions a fresh ban catches.
    fn ban_victims(&self, scope: &BanScope) -> Vec<ConnId> {
        match scope {
            BanScope::Nick(nick) | BanScope::User(nick) => {
                self.find_nick(nick).into_iter().collect()
            }
            BanScope::Ip(net) | BanScope::HardIp(net) => self
                .sessions
                .iter()
                .filter(|(_, s)| net.contains(&s.user.ip) && !s.user.has(Rights::OWNER))
                .map(|(id, _)| *id)
                .collect(),
        }
    }

    /// Record a ban, tell whoever it catches and drop them. `secs == 0`
    /// bans permanently. Returns how many connections were dropped.
    pub fn apply_ban(
        &mut self,
        op: &str,
        scope: BanScope,
        secs: u64,
        reason: &str,
    ) -> Result<usize, AdminError> {
        if let BanScope::Nick(nick) | BanScope::User(nick) = &scope {
            if let Some(id) = self.find_nick(nick) {
                self.victim(id)?;
            }
        }
        let expiry = (secs > 0).then(|| self.wall() + secs as i64);
        let event = PluginEvent::Ban {
            op: op.to_string(),
            target: scope.to_string(),
            reason: reason.to_string(),
            expiry,
        };
        if !self.emit(event) {
            return Err(AdminError::Vetoed);
        }

        match &scope {
            BanScope::Nick(nick) => {
                let any = Ipv4Addr::UNSPECIFIED;
                self.soft_bans.add(op, Some(nick), any, any, reason, expiry)?;
            }
            BanScope::User(nick) => {
                let ip = self.find_nick(nick).and_then(|id| self.user(id)).map(|u| u.ip);
                let (ip, mask) = match ip {
                    Some(ip) => (ip, Ipv4Addr::BROADCAST),
                    None => (Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED),
                };
                self.soft_bans.add(op, Some(nick), ip, mask, reason, expiry)?;
            }
            BanScope::Ip(net) => {
                self.soft_bans.add_net(op, None, *net, reason, expiry)?;
            }
            BanScope::HardIp(net) => {
                self.hard_bans.add_net(op, None, *net, reason, expiry)?;
            }
        }
        metrics::record_ban(if scope.is_hard() { "hard" } else { "soft" });
        warn!(%op, target = %scope, secs, %reason, "Ban added");

        let victims = self.ban_victims(&scope);
        let notice = ban_notice((secs > 0).then_some(secs as i64), reason);
        for id in &victims {
            self.hub_message(*id, &notice);
            self.disconnect(*id, "Banned");
        }
        Ok(victims.len())
    }

    /// Disconnect `target` and keep it out for `kick_bantime`.
    pub fn kick(&mut self, op: &str, target: ConnId, reason: &str) -> Result<(), AdminError> {
        let (nick, ip) = self.victim(target)?;
        let event = PluginEvent::Kick {
            op: op.to_string(),
            target: nick.clone(),
            reason: reason.to_string(),
        };
        if !self.emit(event) {
            return Err(AdminError::Vetoed);
        }

        let bantime = self.config.security.kick_bantime;
        if bantime > 0 {
            let expiry = Some(self.wall() + bantime as i64);
            self.soft_bans
                .add(op, Some(&nick), ip, Ipv4Addr::BROADCAST, reason, expiry)?;
            metrics::record_ban("kick");
        }
        info!(%op, %nick, %ip, %reason, "User kicked");
        self.hub_message(target, &format!("You were kicked by {op}: {reason}."));
        self.disconnect(target, "Kicked");
        Ok(())
    }

    /// Disconnect `target` without a ban.
    pub fn drop_user(&mut self, op: &str, target: ConnId, reason: &str) -> Result<(), AdminError> {
        let (nick, ip) = self.victim(target)?;
        info!(%op, %nick, %ip, %reason, "User dropped");
        self.hub_message(target, &format!("You were disconnected by {op}: {reason}."));
        self.disconnect(target, "Dropped");
        Ok(())
    }

    /// Send `target` to another hub. Queued broadcasts are flushed first so
    /// the user leaves with everything addressed to them.
    pub fn redirect(
        &mut self,
        op: &str,
        target: ConnId,
        address: &str,
        message: &str,
    ) -> Result<(), AdminError> {
        let (nick, _) = self.victim(target)?;
        let event = PluginEvent::Redirect {
            op: op.to_string(),
            target: nick.clone(),
            address: address.to_string(),
        };
        if !self.emit(event) {
            return Err(AdminError::Vetoed);
        }

        self.flush();
        let text = format!("You are being redirected to {address}: {message}");
        let out = [
            encode::private_message(&nick, op, text.as_bytes()),
            encode::force_move(address.as_bytes()),
        ];
        self.send(target, &out);
        info!(%op, %nick, %address, "User redirected");
        self.disconnect(target, "Redirected");
        Ok(())
    }

    /// Re-read an online user's rights after their account changed.
    pub fn refresh_rights(&mut self, nick: &str) {
        let Some(id) = self.find_nick(nick) else {
            return;
        };
        let registered = self.accounts.rights_of(nick);
        let default = self.config.hub.default_rights;
        let Some(user) = self.user_mut(id) else {
            return;
        };
        let was_op = user.is_op();
        user.rights = registered.unwrap_or(default);
        user.registered = registered.is_some();
        if user.is_op() != was_op {
            self.cache.nicklist.mark_dirty();
        }
    }
}
