//! Peer-to-peer connection setup: `$ConnectToMe` and `$RevConnectToMe`.
//!
//! Both go straight to the target's socket, bypassing the broadcast cache,
//! so a download starts as soon as the hub has read the request.

use nmdc_proto::{ConnectToMe, RevConnectToMe};
use tracing::debug;

use super::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::security::RateAction;
use crate::state::Rights;

/// Handler for `$ConnectToMe <target> <ip>:<port>`.
pub struct ConnectToMeHandler;

impl Handler for ConnectToMeHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        ctx.require(Rights::DL, "download")?;
        let ctm = ConnectToMe::parse(ctx.token)?;
        let user = ctx.user()?;
        if ctm.ip != user.ip && !user.has(Rights::SOURCE_VERIFY) {
            ctx.hub.stats.nick_spoofs += 1;
            return Err(HandlerError::Spoofed("connect address"));
        }
        ctx.throttle(RateAction::Downloads)?;
        let target = ctx.target(ctm.target)?;
        let msg = ctx.framed();
        ctx.hub.send_one(target, msg);
        Ok(())
    }
}

/// Handler for `$RevConnectToMe <nick> <target>`: a passive user asking an
/// active one to connect.
pub struct RevConnectToMeHandler;

impl Handler for RevConnectToMeHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        ctx.require(Rights::DL, "download")?;
        let rctm = RevConnectToMe::parse(ctx.token)?;
        ctx.verify_nick(rctm.nick, "RevConnectToMe nick")?;
        ctx.throttle(RateAction::Downloads)?;
        let target = ctx.target(rctm.target)?;

        let sender_active = ctx.user()?.active;
        let target_active = ctx.hub.user(target).is_some_and(|u| u.active);
        if !sender_active && !target_active {
            debug!(id = %ctx.id, %target, "Both sides passive, request dropped");
            return Ok(());
        }
        let msg = ctx.framed();
        ctx.hub.send_one(target, msg);
        Ok(())
    }
}
