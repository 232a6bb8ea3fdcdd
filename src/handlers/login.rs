//! Login: `$ValidateNick`, `$MyPass` and `$MyINFO`.
//!
//! A connection that answered the lock correctly picks a nick, proves its
//! password if the nick is registered, and finishes logging in with its
//! first `$MyINFO`. Later `$MyINFO`s from an online user are updates.

use bytes::Bytes;
use nmdc_proto::message::single_argument;
use nmdc_proto::{MyInfo, Tag, TokenError, encode};
use tracing::{debug, info, warn};

use super::info::send_nicklist;
use super::{Context, Handler, secs};
use crate::admin::{BanScope, ban_notice};
use crate::cache::CacheClass;
use crate::config::LoginConfig;
use crate::config::store::{format_bytes, format_duration};
use crate::error::{HandlerError, HandlerResult};
use crate::events::PluginEvent;
use crate::security::{BanEntry, RateAction};
use crate::state::{PasswordCheck, ProtocolState, Rights};

/// Why a nick is unacceptable, or `None`.
fn nick_problem(nick: &str, login: &LoginConfig) -> Option<String> {
    let len = nick.chars().count();
    if len < login.nick_min_length {
        return Some(format!(
            "Your nick is too short, the minimum is {} characters.",
            login.nick_min_length
        ));
    }
    if len > login.nick_max_length {
        return Some(format!(
            "Your nick is too long, the maximum is {} characters.",
            login.nick_max_length
        ));
    }
    let allowed = |c: char| {
        if login.nick_chars.is_empty() {
            !c.is_control() && !matches!(c, ' ' | '$' | '|' | '<' | '>')
        } else {
            login.nick_chars.contains(c)
        }
    };
    if let Some(bad) = nick.chars().find(|c| !allowed(*c)) {
        return Some(format!("Your nick contains the forbidden character {bad:?}."));
    }
    None
}

/// Refuse the nick: explain, then `$ValidateDenide`.
fn deny(ctx: &mut Context<'_>, nick: &str, why: String) -> HandlerResult {
    ctx.reply(&why);
    ctx.hub
        .send_one(ctx.id, encode::validate_denide(nick.as_bytes()));
    Err(HandlerError::NickRejected(why))
}

/// Tell a soft-banned user why, and send them on if a redirect is set.
fn banned(ctx: &mut Context<'_>, ban: &BanEntry) -> HandlerResult {
    let wall = ctx.hub.wall();
    ctx.reply(&ban_notice(ban.remaining(wall), &ban.reason));
    redirect(ctx);
    Err(HandlerError::Refused(format!("banned: {}", ban.reason)))
}

/// `$ForceMove` to the configured redirect, if any.
fn redirect(ctx: &mut Context<'_>) {
    let target = &ctx.hub.config.hub.redirect;
    if !target.is_empty() {
        let msg = encode::force_move(target.as_bytes());
        ctx.hub.send_one(ctx.id, msg);
    }
}

/// Rights a nick logs in with: its account's, or the defaults.
fn assign_rights(ctx: &mut Context<'_>, nick: &str) -> Result<(), HandlerError> {
    let registered = ctx.hub.accounts.rights_of(nick);
    let default = ctx.hub.config.hub.default_rights;
    let user = ctx.user_mut()?;
    user.rights = registered.unwrap_or(default);
    user.registered = registered.is_some();
    Ok(())
}

/// Nick accepted: greet and wait for the first MyINFO.
fn enter_hello(ctx: &mut Context<'_>) -> HandlerResult {
    let user = ctx.user()?;
    let nick = user.nick.clone();
    let mut greeting = Vec::with_capacity(2);
    if user.registered && user.is_op() {
        greeting.push(encode::logged_in(&nick));
    }
    greeting.push(encode::hello(&nick));
    ctx.hub.send(ctx.id, &greeting);
    ctx.hub.set_state(ctx.id, ProtocolState::Hello);
    Ok(())
}

/// Handler for `$ValidateNick`.
pub struct ValidateNickHandler;

impl Handler for ValidateNickHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        let raw = single_argument(ctx.token, b"$ValidateNick ", "nick")?;
        let nick = std::str::from_utf8(raw)
            .map_err(|_| TokenError::NotUtf8("nick"))?
            .to_string();

        if let Some(why) = nick_problem(&nick, &ctx.hub.config.login) {
            return deny(ctx, &nick, why);
        }
        if ctx.hub.is_hubsec(raw) {
            return deny(ctx, &nick, "That nick is reserved.".to_string());
        }

        let ip = ctx.user()?.ip;
        if let Some(ban) = ctx.hub.reconnect_ban_for(&nick, ip) {
            let left = ban.remaining(ctx.hub.wall()).unwrap_or(0).max(0) as u64;
            ctx.reply(&format!(
                "You are reconnecting too fast, wait {}.",
                format_duration(secs(left))
            ));
            return Err(HandlerError::Refused("reconnecting too fast".into()));
        }
        if let Some(ban) = ctx.hub.soft_ban_for(&nick, ip) {
            return banned(ctx, &ban);
        }

        if let Some(other) = ctx.hub.find_nick(&nick).filter(|other| *other != ctx.id) {
            let other_ip = ctx.hub.user(other).map(|u| u.ip);
            if other_ip == Some(ip) {
                info!(%nick, %ip, old = %other, new = %ctx.id, "Same address reclaiming nick");
                ctx.hub.disconnect(other, "Reconnected");
            } else {
                return deny(ctx, &nick, format!("The nick {nick} is already in use."));
            }
        }

        let rights = ctx
            .hub
            .accounts
            .rights_of(&nick)
            .unwrap_or(ctx.hub.config.hub.default_rights);
        let max_users = ctx.hub.config.hub.max_users as usize;
        if ctx.hub.online_count() >= max_users && !rights.is_operator() {
            debug!(%nick, max_users, "Hub full");
            ctx.hub.send_one(ctx.id, encode::hub_is_full());
            redirect(ctx);
            return Err(HandlerError::Refused("hub full".into()));
        }

        ctx.hub.bind_nick(ctx.id, &nick);
        if ctx.hub.accounts.requires_password(&nick) {
            ctx.hub.send_one(ctx.id, encode::get_pass());
            ctx.hub.set_state(ctx.id, ProtocolState::WaitPass);
            return Ok(());
        }
        assign_rights(ctx, &nick)?;
        enter_hello(ctx)
    }
}

/// Handler for `$MyPass`.
pub struct MyPassHandler;

impl Handler for MyPassHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        let password = single_argument(ctx.token, b"$MyPass ", "password")?;
        let password = String::from_utf8_lossy(password);
        let nick = ctx.nick()?;

        match ctx.hub.accounts.check_password(&nick, &password) {
            PasswordCheck::Accepted => {
                let wall = ctx.hub.wall();
                ctx.hub.accounts.record_login(&nick, wall);
                assign_rights(ctx, &nick)?;
                enter_hello(ctx)
            }
            // The account lost its password (or vanished) meanwhile.
            PasswordCheck::NotRequired => {
                assign_rights(ctx, &nick)?;
                enter_hello(ctx)
            }
            PasswordCheck::Rejected => {
                ctx.hub.send_one(ctx.id, encode::bad_pass());
                let retries = ctx.hub.config.login.password_retries;
                if ctx.hub.accounts.record_bad_password(&nick, retries) {
                    let bantime = ctx.hub.config.login.password_bantime;
                    let ip = ctx.user()?.ip;
                    warn!(%nick, %ip, "Too many bad passwords, banning nick");
                    let hubsec = ctx.hub.config.hub.hubsec_nick.clone();
                    let scope = BanScope::Nick(nick.clone());
                    if let Err(e) = ctx.hub.apply_ban(&hubsec, scope, bantime, "too many bad passwords") {
                        warn!(%nick, error = %e, "Password ban not applied");
                    }
                }
                Err(HandlerError::BadPassword)
            }
        }
    }
}

/// A sanitised MyINFO and what was learned from it.
struct Sanitised<'a> {
    myinfo: Bytes,
    /// Share as the client reported it.
    share: u64,
    tag: Option<Tag<'a>>,
}

fn sanitise<'a>(ctx: &Context<'_>, info: &MyInfo<'a>) -> Result<Sanitised<'a>, HandlerError> {
    let rights = ctx.user()?.rights;
    let limits = ctx.hub.config.limits.field_limits();
    let myinfo = info.rebuild(&limits, rights.contains(Rights::SHARE_HIDE))?;
    let share = info.share_size()?;
    let tag = match info.parsed_tag() {
        Some(Ok(tag)) => Some(tag),
        Some(Err(e)) => {
            debug!(id = %ctx.id, error = %e, "Unparsable tag");
            None
        }
        None => None,
    };
    Ok(Sanitised { myinfo, share, tag })
}

/// Tag, share, slot and hub requirements. Holders of TAG skip the tag
/// rules; holders of OWNER skip everything.
fn tag_policy(login: &LoginConfig, rights: Rights, info: &Sanitised<'_>) -> Option<String> {
    if rights.contains(Rights::OWNER) {
        return None;
    }
    if info.share < login.share_min {
        return Some(format!(
            "You must share at least {}.",
            format_bytes(login.share_min)
        ));
    }
    if rights.contains(Rights::TAG) {
        return None;
    }
    let Some(tag) = &info.tag else {
        return login
            .require_tag
            .then(|| "Your client must send a valid tag.".to_string());
    };
    if tag.slots < login.slots_min {
        return Some(format!("You must open at least {} slots.", login.slots_min));
    }
    if login.hubs_max > 0 && tag.hub_total() > login.hubs_max {
        return Some(format!(
            "You are in too many hubs, the maximum is {}.",
            login.hubs_max
        ));
    }
    None
}

/// Handler for `$MyINFO`, both the login one and later updates.
pub struct MyInfoHandler;

impl Handler for MyInfoHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        let token = ctx.token;
        let info = MyInfo::parse(token)?;
        ctx.verify_nick(info.nick, "MyINFO nick")?;
        let sanitised = sanitise(ctx, &info)?;
        let rights = ctx.user()?.rights;
        if let Some(why) = tag_policy(&ctx.hub.config.login, rights, &sanitised) {
            ctx.reply(&why);
            return Err(HandlerError::Refused(why));
        }

        if ctx.user()?.is_online() {
            update(ctx, sanitised)
        } else {
            complete_login(ctx, sanitised)
        }
    }
}

fn store(ctx: &mut Context<'_>, info: &Sanitised<'_>) -> Result<(), HandlerError> {
    let user = ctx.user_mut()?;
    user.myinfo = Some(info.myinfo.clone());
    user.share = info.share;
    match &info.tag {
        Some(tag) => user.apply_tag(tag),
        None => user.clear_tag(),
    }
    Ok(())
}

fn complete_login(ctx: &mut Context<'_>, info: Sanitised<'_>) -> HandlerResult {
    let user = ctx.user()?;
    let (nick, ip) = (user.nick.clone(), user.ip);
    if !ctx.hub.emit(PluginEvent::Login {
        nick: nick.clone(),
        ip,
    }) {
        ctx.reply("Your login was refused.");
        return Err(HandlerError::Refused("login vetoed".into()));
    }

    store(ctx, &info)?;
    let restored = match ctx.hub.cachelist.take(&nick) {
        Some(departed) if departed.matches(ip, info.share) => {
            debug!(%nick, "Reconnect within grace period");
            let user = ctx.user_mut()?;
            user.rates = departed.rates;
            user.tth = departed.tth;
            true
        }
        Some(_) => {
            debug!(%nick, "Stale cachelist entry dropped");
            ctx.hub.cache.nicklist.mark_dirty();
            false
        }
        None => false,
    };

    let wall = ctx.hub.wall();
    let user = ctx.user_mut()?;
    user.joined = wall;
    let hidden = user.is_hidden();
    let op = user.is_op();
    let delayed_nicklist = std::mem::take(&mut user.delayed_nicklist);
    ctx.hub.set_state(ctx.id, ProtocolState::Online);

    let myinfo = info.myinfo;
    if !hidden {
        if restored {
            ctx.hub.cache.nicklist.update_info(&myinfo);
        } else {
            ctx.hub
                .broadcast(CacheClass::Hello, Some(ctx.id), encode::hello(&nick));
            ctx.hub.cache.nicklist.add(&nick, &myinfo);
        }
        ctx.hub
            .broadcast(CacheClass::MyInfoOp, Some(ctx.id), myinfo.clone());
        ctx.hub
            .broadcast(CacheClass::MyInfo, Some(ctx.id), myinfo.clone());
        if op {
            let oplist = encode::nick_list(encode::OPLIST_PREFIX, [nick.as_str()]);
            ctx.hub.broadcast(CacheClass::OpList, None, oplist);
            ctx.hub.cache.nicklist.mark_dirty();
        }
    }

    ctx.hub.send_one(ctx.id, myinfo);
    let online = ctx.hub.online_count();
    ctx.hub.stats.login(online);
    info!(%nick, %ip, restored, "User logged in");

    let motd = ctx.hub.config.hub.motd.clone();
    if !motd.is_empty() {
        ctx.reply(&motd);
    }
    if delayed_nicklist {
        send_nicklist(ctx.hub, ctx.id);
    }
    Ok(())
}

fn update(ctx: &mut Context<'_>, info: Sanitised<'_>) -> HandlerResult {
    let user = ctx.user()?;
    if user.myinfo.as_ref() == Some(&info.myinfo) {
        return Ok(());
    }
    let hidden = user.is_hidden();
    store(ctx, &info)?;
    if hidden {
        return Ok(());
    }

    let to_ops = ctx.throttle(RateAction::MyInfoOp).is_ok();
    let to_all = ctx.throttle(RateAction::MyInfo).is_ok();
    let myinfo = info.myinfo;
    if to_ops {
        ctx.hub
            .broadcast(CacheClass::MyInfoOp, Some(ctx.id), myinfo.clone());
    }
    if to_all {
        // Only the latest update matters to non-operators.
        ctx.hub.purge(CacheClass::MyInfo, ctx.id);
        ctx.hub
            .broadcast(CacheClass::MyInfo, Some(ctx.id), myinfo.clone());
    }
    ctx.hub.cache.nicklist.update_info(&myinfo);
    if !to_ops && !to_all {
        return Err(HandlerError::Throttled(RateAction::MyInfo));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use nmdc_proto::lock_to_key;

    use super::*;
    use crate::handlers::{NmdcProtocol, ProtocolHandler};
    use crate::network::mock::MockTransport;
    use crate::state::test_support::*;
    use crate::state::{ConnId, Hub};

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    /// Run a fresh connection through the lock/key exchange.
    fn handshake(hub: &mut Hub, protocol: &NmdcProtocol, addr: Ipv4Addr) -> (ConnId, MockTransport) {
        let (id, mock) = connect(hub, addr);
        protocol.on_accept(hub, id);
        let lock = hub.user(id).unwrap().lock.clone();
        let mut key = b"$Key ".to_vec();
        key.extend_from_slice(&lock_to_key(lock.as_bytes()));
        protocol.handle_token(hub, id, &key);
        mock.take_sent();
        (id, mock)
    }

    fn myinfo(nick: &str, share: u64) -> Vec<u8> {
        format!("$MyINFO $ALL {nick} desc<++ V:0.868,M:A,H:1/0/0,S:3>$ $DSL\x01$${share}$").into_bytes()
    }

    fn login(hub: &mut Hub, protocol: &NmdcProtocol, addr: Ipv4Addr, nick: &str) -> (ConnId, MockTransport) {
        let (id, mock) = handshake(hub, protocol, addr);
        protocol.handle_token(hub, id, format!("$ValidateNick {nick}").as_bytes());
        protocol.handle_token(hub, id, &myinfo(nick, 1024));
        (id, mock)
    }

    #[test]
    fn test_myinfo_fixture_shape() {
        let raw = myinfo("alice", 5);
        let info = MyInfo::parse(&raw).unwrap();
        assert_eq!(info.nick, b"alice");
        assert_eq!(info.share, b"5");
        assert!(info.tag.is_some());
    }

    #[test]
    fn test_validate_nick_sends_hello() {
        let mut hub = Hub::new(test_config());
        let protocol = NmdcProtocol::new();
        let (id, mock) = handshake(&mut hub, &protocol, ip(1));
        protocol.handle_token(&mut hub, id, b"$ValidateNick alice");
        assert_eq!(mock.take_sent(), "$Hello alice|");
        assert_eq!(hub.user(id).unwrap().state, ProtocolState::Hello);
        assert_eq!(hub.find_nick("ALICE"), Some(id));
    }

    #[test]
    fn test_bad_nick_is_denied() {
        let mut hub = Hub::new(test_config());
        let protocol = NmdcProtocol::new();
        let (id, mock) = handshake(&mut hub, &protocol, ip(1));
        protocol.handle_token(&mut hub, id, b"$ValidateNick a<b");
        let sent = mock.take_sent();
        assert!(sent.contains("forbidden character"));
        assert!(sent.ends_with("$ValidateDenide a<b|"));
        assert!(mock.is_closed());
    }

    #[test]
    fn test_hubsec_nick_is_reserved() {
        let mut hub = Hub::new(test_config());
        let protocol = NmdcProtocol::new();
        let (id, mock) = handshake(&mut hub, &protocol, ip(1));
        protocol.handle_token(&mut hub, id, b"$ValidateNick hubsec");
        assert!(mock.take_sent().contains("$ValidateDenide hubsec|"));
        assert!(hub.session(id).is_none());
    }

    #[test]
    fn test_collision_from_other_ip_is_rejected() {
        let mut hub = Hub::new(test_config());
        let protocol = NmdcProtocol::new();
        let (first, first_out) = login(&mut hub, &protocol, ip(1), "alice");
        assert!(hub.user(first).unwrap().is_online());
        first_out.take_sent();

        let (second, second_out) = handshake(&mut hub, &protocol, ip(2));
        protocol.handle_token(&mut hub, second, b"$ValidateNick alice");
        assert!(second_out.take_sent().contains("$ValidateDenide alice|"));
        assert!(second_out.is_closed());
        assert!(hub.user(first).unwrap().is_online());
        assert!(!first_out.is_closed());
        assert_eq!(hub.find_nick("alice"), Some(first));
    }

    #[test]
    fn test_collision_from_same_ip_replaces_session() {
        let mut hub = Hub::new(test_config());
        let protocol = NmdcProtocol::new();
        let (first, first_out) = login(&mut hub, &protocol, ip(1), "alice");

        let (second, second_out) = handshake(&mut hub, &protocol, ip(1));
        protocol.handle_token(&mut hub, second, b"$ValidateNick alice");
        assert!(first_out.is_closed());
        assert!(hub.session(first).is_none());
        assert_eq!(second_out.take_sent(), "$Hello alice|");
        assert_eq!(hub.find_nick("alice"), Some(second));
    }

    #[test]
    fn test_soft_ban_redirects() {
        let mut config = test_config();
        config.hub.redirect = "other.hub:411".into();
        let mut hub = Hub::new(config);
        hub.soft_bans
            .add("op", Some("mallory"), ip(9), Ipv4Addr::BROADCAST, "spam", None)
            .unwrap();
        let protocol = NmdcProtocol::new();
        let (id, mock) = handshake(&mut hub, &protocol, ip(3));
        protocol.handle_token(&mut hub, id, b"$ValidateNick mallory");
        let sent = mock.take_sent();
        assert!(sent.contains("You are banned permanently: spam."));
        assert!(sent.ends_with("$ForceMove other.hub:411|"));
        assert!(mock.is_closed());
    }

    #[test]
    fn test_hub_full() {
        let mut config = test_config();
        config.hub.max_users = 1;
        let mut hub = Hub::new(config);
        let protocol = NmdcProtocol::new();
        login(&mut hub, &protocol, ip(1), "alice");
        let (id, mock) = handshake(&mut hub, &protocol, ip(2));
        protocol.handle_token(&mut hub, id, b"$ValidateNick bob");
        assert_eq!(mock.take_sent(), "$HubIsFull|");
        assert!(mock.is_closed());
    }

    #[test]
    fn test_password_flow() {
        let mut hub = Hub::new(test_config());
        hub.accounts.set_group("ops", Rights::OP | Rights::KICK);
        hub.accounts
            .add_account("boss", "ops", Some("hunter2"), "owner", 0)
            .unwrap();
        let protocol = NmdcProtocol::new();

        let (id, mock) = handshake(&mut hub, &protocol, ip(1));
        protocol.handle_token(&mut hub, id, b"$ValidateNick boss");
        assert_eq!(mock.take_sent(), "$GetPass|");
        assert_eq!(hub.user(id).unwrap().state, ProtocolState::WaitPass);
        protocol.handle_token(&mut hub, id, b"$MyPass hunter2");
        assert_eq!(mock.take_sent(), "$LogedIn boss|$Hello boss|");
        let user = hub.user(id).unwrap();
        assert!(user.registered);
        assert!(user.has(Rights::KICK));
    }

    #[test]
    fn test_bad_password_bans_after_retries() {
        let mut config = test_config();
        config.login.password_retries = 2;
        let mut hub = Hub::new(config);
        hub.accounts.set_group("reg", Rights::CHAT);
        hub.accounts
            .add_account("boss", "reg", Some("hunter2"), "owner", 0)
            .unwrap();
        let protocol = NmdcProtocol::new();

        for attempt in 0..2 {
            let (id, mock) = handshake(&mut hub, &protocol, ip(1));
            protocol.handle_token(&mut hub, id, b"$ValidateNick boss");
            protocol.handle_token(&mut hub, id, b"$MyPass wrong");
            assert!(mock.take_sent().contains("$BadPass|"), "attempt {attempt}");
            assert!(mock.is_closed());
        }
        assert!(hub.soft_ban_for("boss", ip(200)).is_some());
    }

    #[test]
    fn test_login_announces_and_sends_motd() {
        let mut hub = Hub::new(test_config());
        let protocol = NmdcProtocol::new();
        let (_, bob_out) = login(&mut hub, &protocol, ip(2), "bob");
        bob_out.take_sent();

        let (id, mock) = handshake(&mut hub, &protocol, ip(1));
        protocol.handle_token(&mut hub, id, b"$ValidateNick alice");
        mock.take_sent();
        protocol.handle_token(&mut hub, id, &myinfo("alice", 1024));
        let sent = mock.take_sent();
        assert!(sent.starts_with("$MyINFO $ALL alice desc<++ V:0.868,M:A,H:1/0/0,S:3>$ $DSL\x01$$1024$|"));
        assert!(sent.ends_with("<HubSec> Welcome to the hub.|"));

        let user = hub.user(id).unwrap();
        assert!(user.is_online());
        assert!(user.active);
        assert_eq!(user.slots, 3);
        assert_eq!(user.share, 1024);

        hub.flush();
        let seen = bob_out.take_sent();
        assert!(seen.contains("$Hello alice|"));
        assert!(seen.contains("$MyINFO $ALL alice"));
        assert!(!mock.take_sent().contains("$Hello alice|"));
    }

    #[test]
    fn test_delayed_nicklist_after_login() {
        let mut hub = Hub::new(test_config());
        let protocol = NmdcProtocol::new();
        let (id, mock) = handshake(&mut hub, &protocol, ip(1));
        protocol.handle_token(&mut hub, id, b"$ValidateNick alice");
        protocol.handle_token(&mut hub, id, b"$GetNickList");
        assert_eq!(mock.take_sent(), "$Hello alice|");
        protocol.handle_token(&mut hub, id, &myinfo("alice", 1024));
        let sent = mock.take_sent();
        assert!(sent.contains("$NickList HubSec$$alice$$|"));
        assert!(sent.contains("$OpList HubSec$$|"));
    }

    #[test]
    fn test_required_tag() {
        let mut config = test_config();
        config.login.require_tag = true;
        let mut hub = Hub::new(config);
        let protocol = NmdcProtocol::new();
        let (id, mock) = handshake(&mut hub, &protocol, ip(1));
        protocol.handle_token(&mut hub, id, b"$ValidateNick alice");
        protocol.handle_token(&mut hub, id, b"$MyINFO $ALL alice plain$ $DSL\x01$$0$");
        assert!(mock.take_sent().contains("valid tag"));
        assert!(mock.is_closed());
    }

    #[test]
    fn test_tag_right_bypasses_tag_policy() {
        let mut config = test_config();
        config.login.require_tag = true;
        config.login.slots_min = 10;
        config.hub.default_rights = config.hub.default_rights | Rights::TAG;
        let mut hub = Hub::new(config);
        let protocol = NmdcProtocol::new();
        let (id, _) = login(&mut hub, &protocol, ip(1), "alice");
        assert!(hub.user(id).unwrap().is_online());
    }

    #[test]
    fn test_spoofed_myinfo_disconnects() {
        let mut hub = Hub::new(test_config());
        let protocol = NmdcProtocol::new();
        let (id, mock) = handshake(&mut hub, &protocol, ip(1));
        protocol.handle_token(&mut hub, id, b"$ValidateNick alice");
        protocol.handle_token(&mut hub, id, &myinfo("bob", 1));
        assert!(mock.is_closed());
        assert_eq!(hub.stats().nick_spoofs, 1);
    }

    #[test]
    fn test_myinfo_update_coalesces_for_non_ops() {
        let mut hub = Hub::new(test_config());
        let protocol = NmdcProtocol::new();
        let (alice, _) = login(&mut hub, &protocol, ip(1), "alice");
        let (_, bob_out) = login(&mut hub, &protocol, ip(2), "bob");
        hub.flush();
        bob_out.take_sent();

        protocol.handle_token(&mut hub, alice, &myinfo("alice", 2048));
        protocol.handle_token(&mut hub, alice, &myinfo("alice", 4096));
        // The myinfo cadence is longer than a second.
        hub.advance_clock(Duration::from_secs(hub.config().cache.myinfo_period + 1));
        hub.flush();
        let seen = bob_out.take_sent();
        assert!(!seen.contains("$2048$"));
        assert_eq!(seen.matches("$4096$").count(), 1);
        assert_eq!(hub.user(alice).unwrap().share, 4096);
    }

    #[test]
    fn test_reconnect_in_grace_restores_buckets() {
        let mut config = test_config();
        config.login.delayed_logout = 30;
        let mut hub = Hub::new(config);
        let protocol = NmdcProtocol::new();
        let (first, _) = login(&mut hub, &protocol, ip(1), "alice");
        let (_, bob_out) = login(&mut hub, &protocol, ip(2), "bob");
        hub.flush();
        bob_out.take_sent();

        while crate::handlers::take_token(&mut hub, first, RateAction::Chat) == Some(true) {}
        hub.disconnect(first, "gone");
        assert!(hub.cachelist.contains("alice"));

        let (second, _) = login(&mut hub, &protocol, ip(1), "alice");
        assert!(hub.user(second).unwrap().is_online());
        assert!(!hub.cachelist.contains("alice"));
        assert_eq!(
            crate::handlers::take_token(&mut hub, second, RateAction::Chat),
            Some(false)
        );
        hub.flush();
        let seen = bob_out.take_sent();
        assert!(!seen.contains("$Hello alice|"));
        assert!(!seen.contains("$Quit alice|"));
    }
}
