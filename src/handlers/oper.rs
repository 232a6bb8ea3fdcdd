//! Operator tokens: `$Kick`, `$Close` and `$OpForceMove`.
//!
//! Clients with op features send these from their user list menus. They
//! do the same thing as `!kick`, `!drop` and a redirect.

use nmdc_proto::message::single_argument;
use nmdc_proto::OpForceMove;

use super::{Context, Handler};
use crate::admin::AdminError;
use crate::error::{HandlerError, HandlerResult};
use crate::state::Rights;

/// Report a refused operator action to the operator.
fn refused(ctx: &mut Context<'_>, err: AdminError) -> HandlerResult {
    match err {
        AdminError::Vetoed => Err(HandlerError::Vetoed),
        other => {
            ctx.reply(&other.to_string());
            Ok(())
        }
    }
}

/// Handler for `$Kick <nick>`.
pub struct KickHandler;

impl Handler for KickHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        ctx.require(Rights::KICK, "kick")?;
        let nick = single_argument(ctx.token, b"$Kick ", "nick")?;
        let target = ctx.target(nick)?;
        let op = ctx.nick()?;
        match ctx.hub.kick(&op, target, "no reason given") {
            Ok(()) => Ok(()),
            Err(e) => refused(ctx, e),
        }
    }
}

/// Handler for `$Close <nick>`: disconnect without a ban.
pub struct CloseHandler;

impl Handler for CloseHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        ctx.require(Rights::KICK, "disconnect users")?;
        let nick = single_argument(ctx.token, b"$Close ", "nick")?;
        let target = ctx.target(nick)?;
        let op = ctx.nick()?;
        match ctx.hub.drop_user(&op, target, "closed") {
            Ok(()) => Ok(()),
            Err(e) => refused(ctx, e),
        }
    }
}

/// Handler for `$OpForceMove $Who:<nick>$Where:<address>$Msg:<message>`.
pub struct OpForceMoveHandler;

impl Handler for OpForceMoveHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        ctx.require(Rights::REDIRECT, "redirect users")?;
        let moved = OpForceMove::parse(ctx.token)?;
        let target = ctx.target(moved.who)?;
        let op = ctx.nick()?;
        let address = String::from_utf8_lossy(moved.destination);
        let message = String::from_utf8_lossy(moved.message);
        match ctx.hub.redirect(&op, target, &address, &message) {
            Ok(()) => Ok(()),
            Err(e) => refused(ctx, e),
        }
    }
}
