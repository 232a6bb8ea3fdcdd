//! NMDC token handlers.
//!
//! This module contains the [`Handler`] trait, the per-token [`Context`]
//! and the [`ProtocolHandler`] seam the event loop drives. The dispatch
//! table itself lives in [`registry`]: it maps `(state, token kind)` to a
//! handler, so a token that is not valid in the connection's current state
//! never reaches any handler code.
//!
//! Handlers are synchronous. They run to completion on the hub actor and
//! report failures as [`HandlerError`]s, which the dispatcher turns into
//! one of the [`ErrorAction`](crate::error::ErrorAction)s.

mod chat;
mod handshake;
mod info;
mod login;
mod oper;
mod registry;
mod search;
mod transfer;

pub use registry::NmdcProtocol;

use bytes::{BufMut, Bytes, BytesMut};
use std::time::{Duration, Instant};

use crate::error::{HandlerError, HandlerResult};
use crate::security::RateAction;
use crate::state::{ConnId, Hub, Rights, User};

/// Per-token context handed to each handler.
pub struct Context<'a> {
    /// The hub actor's state.
    pub hub: &'a mut Hub,
    /// Connection that sent the token.
    pub id: ConnId,
    /// The token without its trailing `|`.
    pub token: &'a [u8],
}

impl<'a> Context<'a> {
    pub fn new(hub: &'a mut Hub, id: ConnId, token: &'a [u8]) -> Self {
        Self { hub, id, token }
    }

    pub fn user(&self) -> Result<&User, HandlerError> {
        self.hub.user(self.id).ok_or(HandlerError::Gone)
    }

    pub fn user_mut(&mut self) -> Result<&mut User, HandlerError> {
        self.hub.user_mut(self.id).ok_or(HandlerError::Gone)
    }

    pub fn nick(&self) -> Result<String, HandlerError> {
        Ok(self.user()?.nick.clone())
    }

    pub fn now(&self) -> Instant {
        self.hub.now()
    }

    /// The token re-framed with its `|`, ready to be forwarded.
    pub fn framed(&self) -> Bytes {
        framed(self.token)
    }

    /// Fail with `Unauthorized` unless the sender holds `right`.
    pub fn require(&self, right: Rights, what: &'static str) -> HandlerResult {
        if self.user()?.has(right) {
            Ok(())
        } else {
            Err(HandlerError::Unauthorized(what))
        }
    }

    /// Take a token from the sender's `action` bucket. A denial is reported
    /// to the user and counts towards a violation ban.
    pub fn rate(&mut self, action: RateAction) -> HandlerResult {
        if self.take(action)? {
            Ok(())
        } else {
            Err(HandlerError::RateLimited(action))
        }
    }

    /// Like [`Context::rate`], but a denial drops the token silently.
    pub fn throttle(&mut self, action: RateAction) -> HandlerResult {
        if self.take(action)? {
            Ok(())
        } else {
            Err(HandlerError::Throttled(action))
        }
    }

    fn take(&mut self, action: RateAction) -> Result<bool, HandlerError> {
        take_token(self.hub, self.id, action).ok_or(HandlerError::Gone)
    }

    /// The nick embedded in a token must be the sender's own.
    pub fn verify_nick(&mut self, claimed: &[u8], what: &'static str) -> HandlerResult {
        if claimed == self.user()?.nick.as_bytes() {
            return Ok(());
        }
        self.hub.stats.nick_spoofs += 1;
        Err(HandlerError::Spoofed(what))
    }

    /// Online user by nick, as an id.
    pub fn target(&self, nick: &[u8]) -> Result<ConnId, HandlerError> {
        let nick = String::from_utf8_lossy(nick);
        self.hub
            .find_nick(&nick)
            .filter(|id| self.hub.user(*id).is_some_and(User::is_online))
            .ok_or_else(|| HandlerError::UnknownTarget(nick.into_owned()))
    }

    /// Main-chat line from the hub security bot to the sender.
    pub fn reply(&mut self, text: &str) {
        self.hub.hub_message(self.id, text);
    }
}

/// Take a token from `id`'s `action` bucket. `None` if `id` is gone.
pub(crate) fn take_token(hub: &mut Hub, id: ConnId, action: RateAction) -> Option<bool> {
    let now = hub.clock.mono();
    let session = hub.sessions.get_mut(&id)?;
    let allowed = session.user.rates.try_take(action, &hub.config.rates, now);
    if !allowed {
        hub.stats.rate_denied(action);
    }
    Some(allowed)
}

/// Append the `|` a parsed token lost.
pub fn framed(token: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(token.len() + 1);
    out.put_slice(token);
    out.put_u8(b'|');
    out.freeze()
}

/// Seconds as a `Duration`.
pub(crate) fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

/// Trait implemented by all token handlers.
pub trait Handler {
    /// Handle one token.
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult;
}

/// A wire protocol spoken on the hub port.
///
/// The event loop only knows this trait; NMDC is the one implementation.
pub trait ProtocolHandler {
    fn name(&self) -> &'static str;

    /// Greet a freshly registered connection.
    fn on_accept(&self, hub: &mut Hub, id: ConnId);

    /// Process one complete token from `id`.
    fn handle_token(&self, hub: &mut Hub, id: ConnId, token: &[u8]);
}
