//! Lock/key handshake: `$Supports`, `$Key` and the exploit signature.

use nmdc_proto::message::single_argument;
use nmdc_proto::token::arguments;
use nmdc_proto::{HUB_SUPPORTS, Supports, TokenKind, encode, verify_key};
use tracing::debug;

use super::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::ProtocolState;

/// Handler for `$Supports` during the handshake.
pub struct SupportsHandler;

impl Handler for SupportsHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        let flags = Supports::parse(arguments(ctx.token, TokenKind::Supports));
        ctx.user_mut()?.supports = flags;
        debug!(id = %ctx.id, supports = %flags, "Client features");
        ctx.hub.send_one(ctx.id, encode::supports(HUB_SUPPORTS));
        ctx.hub.set_state(ctx.id, ProtocolState::WaitKey);
        Ok(())
    }
}

/// Handler for `$Key`: the answer to our `$Lock`.
pub struct KeyHandler;

impl Handler for KeyHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        let key = single_argument(ctx.token, b"$Key ", "key")?;
        if !verify_key(ctx.user()?.lock.as_bytes(), key) {
            ctx.hub.stats.broken_keys += 1;
            return Err(HandlerError::BrokenKey);
        }
        ctx.hub.set_state(ctx.id, ProtocolState::WaitNick);
        Ok(())
    }
}

/// `$MyNick` is client-to-client only. Seen at the hub before the key it
/// is an attempt to bounce the lock exchange onto a third party.
pub struct CtmExploitHandler;

impl Handler for CtmExploitHandler {
    fn handle(&self, _ctx: &mut Context<'_>) -> HandlerResult {
        Err(HandlerError::CtmExploit)
    }
}

/// Tokens accepted and dropped (`$Lock` from a client, `$Version`).
pub struct IgnoreHandler;

impl Handler for IgnoreHandler {
    fn handle(&self, _ctx: &mut Context<'_>) -> HandlerResult {
        Ok(())
    }
}
