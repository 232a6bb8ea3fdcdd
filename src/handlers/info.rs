//! Queries about users and the hub: `$GetNickList`, `$GetINFO`,
//! `$BotINFO`, `$UserIP` and `$Quit`.

use nmdc_proto::encode::{self, HubInfo};
use nmdc_proto::message::user_ip_nicks;
use nmdc_proto::GetInfo;
use tracing::debug;

use super::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::security::RateAction;
use crate::state::{ConnId, Hub, ProtocolState, Rights, SOFTWARE};

/// Write the nicklist to `id`, rebuilding it first if it is stale.
pub(crate) fn send_nicklist(hub: &mut Hub, id: ConnId) {
    let now = hub.now();
    if hub.cache.nicklist.needs_rebuild(now) {
        hub.rebuild_nicklist(now);
    }
    let Some(supports) = hub.user(id).map(|u| u.supports) else {
        return;
    };
    let reply = hub.cache.nicklist.reply(supports);
    let bytes = reply.iter().map(|b| b.len()).sum();
    hub.grant_credit(id, bytes);
    hub.send(id, &reply);
}

/// Handler for `$GetNickList`. Before login the request is remembered and
/// answered once the user is online.
pub struct GetNickListHandler;

impl Handler for GetNickListHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        let user = ctx.user_mut()?;
        if user.state != ProtocolState::Online {
            user.delayed_nicklist = true;
            return Ok(());
        }
        ctx.rate(RateAction::GetNickList)?;
        send_nicklist(ctx.hub, ctx.id);
        Ok(())
    }
}

/// Handler for `$GetINFO <target> <nick>`.
pub struct GetInfoHandler;

impl Handler for GetInfoHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        let query = GetInfo::parse(ctx.token)?;
        ctx.verify_nick(query.nick, "GetINFO nick")?;
        ctx.throttle(RateAction::GetInfo)?;

        let myinfo = if ctx.hub.is_hubsec(query.target) {
            ctx.hub.hubsec_info.clone()
        } else {
            let target = ctx.target(query.target)?;
            let user = ctx.hub.user(target).ok_or(HandlerError::Gone)?;
            if user.is_hidden() {
                return Err(HandlerError::UnknownTarget(user.nick.clone()));
            }
            user.myinfo.clone().ok_or(HandlerError::Gone)?
        };
        ctx.hub.send_one(ctx.id, myinfo);
        Ok(())
    }
}

/// Handler for `$BotINFO`: hub description for hublist pingers.
pub struct BotInfoHandler;

impl Handler for BotInfoHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        ctx.throttle(RateAction::GetInfo)?;
        let hub = &ctx.hub.config.hub;
        let login = &ctx.hub.config.login;
        let reply = encode::hub_info(&HubInfo {
            name: &hub.name,
            address: &hub.hostname,
            description: &hub.description,
            max_users: hub.max_users,
            share_min: login.share_min,
            slots_min: login.slots_min,
            hubs_max: login.hubs_max,
            software: SOFTWARE,
            owner: &hub.owner,
        });
        ctx.hub.send_one(ctx.id, reply);
        Ok(())
    }
}

/// Handler for `$UserIP nick$$nick...`.
pub struct UserIpHandler;

impl Handler for UserIpHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        ctx.require(Rights::USERIP, "query user addresses")?;
        ctx.throttle(RateAction::GetInfo)?;
        let nicks = user_ip_nicks(ctx.token)?;
        let found: Vec<(String, std::net::Ipv4Addr)> = nicks
            .iter()
            .filter_map(|nick| ctx.hub.find_online(&String::from_utf8_lossy(nick)))
            .map(|user| (user.nick.clone(), user.ip))
            .collect();
        if found.is_empty() {
            return Ok(());
        }
        let reply = encode::user_ip(found.iter().map(|(nick, ip)| (nick.as_str(), *ip)));
        ctx.hub.send_one(ctx.id, reply);
        Ok(())
    }
}

/// Handler for `$Quit`.
pub struct QuitHandler;

impl Handler for QuitHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        debug!(id = %ctx.id, "Client quit");
        ctx.hub.disconnect(ctx.id, "Quit");
        Ok(())
    }
}
