//! Token dispatch table and the NMDC protocol driver.

use std::collections::HashMap;

use nmdc_proto::{TokenKind, encode, generate_lock, identify};
use tracing::{debug, warn};

use super::chat::{ChatHandler, McToHandler, PrivateMessageHandler};
use super::handshake::{CtmExploitHandler, IgnoreHandler, KeyHandler, SupportsHandler};
use super::info::{BotInfoHandler, GetInfoHandler, GetNickListHandler, QuitHandler, UserIpHandler};
use super::login::{MyInfoHandler, MyPassHandler, ValidateNickHandler};
use super::oper::{CloseHandler, KickHandler, OpForceMoveHandler};
use super::search::{SearchHandler, SearchResultHandler};
use super::transfer::{ConnectToMeHandler, RevConnectToMeHandler};
use super::{Context, Handler, ProtocolHandler, take_token};
use crate::admin::BanScope;
use crate::error::{ErrorAction, HandlerError};
use crate::metrics;
use crate::security::RateAction;
use crate::state::{ConnId, Hub, ProtocolState, SOFTWARE};
use crate::telemetry::TokenTimer;

use ProtocolState::{Hello, Init, Online, SendLock, WaitKey, WaitNick, WaitPass};

/// Registry of token handlers, keyed by state and token kind.
pub struct Registry {
    handlers: HashMap<(ProtocolState, TokenKind), Box<dyn Handler>>,
}

impl Registry {
    /// Create a new registry with all handlers registered.
    pub fn new() -> Self {
        let mut handlers: HashMap<(ProtocolState, TokenKind), Box<dyn Handler>> = HashMap::new();

        // Handshake
        for state in [Init, SendLock, WaitKey] {
            handlers.insert((state, TokenKind::MyNick), Box::new(CtmExploitHandler));
        }
        handlers.insert((SendLock, TokenKind::Supports), Box::new(SupportsHandler));
        handlers.insert((SendLock, TokenKind::Key), Box::new(KeyHandler));
        handlers.insert((WaitKey, TokenKind::Key), Box::new(KeyHandler));
        handlers.insert((SendLock, TokenKind::Lock), Box::new(IgnoreHandler));
        handlers.insert((WaitKey, TokenKind::Lock), Box::new(IgnoreHandler));

        // Login
        handlers.insert((WaitNick, TokenKind::ValidateNick), Box::new(ValidateNickHandler));
        handlers.insert((WaitPass, TokenKind::MyPass), Box::new(MyPassHandler));
        handlers.insert((Hello, TokenKind::MyInfo), Box::new(MyInfoHandler));
        handlers.insert((Online, TokenKind::MyInfo), Box::new(MyInfoHandler));
        for state in [WaitNick, WaitPass, Hello, Online] {
            handlers.insert((state, TokenKind::Version), Box::new(IgnoreHandler));
        }
        handlers.insert((WaitPass, TokenKind::GetNickList), Box::new(GetNickListHandler));
        handlers.insert((Hello, TokenKind::GetNickList), Box::new(GetNickListHandler));
        handlers.insert((Online, TokenKind::GetNickList), Box::new(GetNickListHandler));
        handlers.insert((Online, TokenKind::Supports), Box::new(IgnoreHandler));

        // Chat and private messages
        handlers.insert((Online, TokenKind::Chat), Box::new(ChatHandler));
        handlers.insert((Online, TokenKind::To), Box::new(PrivateMessageHandler));
        handlers.insert((Online, TokenKind::McTo), Box::new(McToHandler));

        // Search
        handlers.insert((Online, TokenKind::Search), Box::new(SearchHandler));
        handlers.insert((Online, TokenKind::SearchResult), Box::new(SearchResultHandler));

        // Peer connections
        handlers.insert((Online, TokenKind::ConnectToMe), Box::new(ConnectToMeHandler));
        handlers.insert((Online, TokenKind::RevConnectToMe), Box::new(RevConnectToMeHandler));

        // Info queries
        handlers.insert((Online, TokenKind::GetInfo), Box::new(GetInfoHandler));
        handlers.insert((Hello, TokenKind::BotInfo), Box::new(BotInfoHandler));
        handlers.insert((Online, TokenKind::BotInfo), Box::new(BotInfoHandler));
        handlers.insert((Online, TokenKind::UserIp), Box::new(UserIpHandler));
        handlers.insert((Online, TokenKind::Quit), Box::new(QuitHandler));

        // Operator tokens
        handlers.insert((Online, TokenKind::Kick), Box::new(KickHandler));
        handlers.insert((Online, TokenKind::Close), Box::new(CloseHandler));
        handlers.insert((Online, TokenKind::OpForceMove), Box::new(OpForceMoveHandler));

        Self { handlers }
    }

    /// Dispatch one token to the handler registered for the sender's
    /// current state.
    pub fn dispatch(&self, ctx: &mut Context<'_>, kind: TokenKind) -> Result<(), HandlerError> {
        let state = ctx.user()?.state;
        match self.handlers.get(&(state, kind)) {
            Some(handler) => handler.handle(ctx),
            None if kind == TokenKind::Empty => Ok(()),
            None if kind == TokenKind::Unknown => {
                debug!(id = %ctx.id, "Unknown token ignored");
                Ok(())
            }
            None => Err(HandlerError::OutOfOrder(kind.name())),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// The NMDC protocol.
#[derive(Default)]
pub struct NmdcProtocol {
    registry: Registry,
}

impl NmdcProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a failed token to its consequence.
    fn on_error(&self, hub: &mut Hub, id: ConnId, kind: TokenKind, err: HandlerError) {
        metrics::record_handler_error(kind.name(), err.error_code());
        match err.action() {
            ErrorAction::Ignore => {
                debug!(%id, token = kind.name(), error = %err, "Token dropped");
            }
            ErrorAction::Warn => {
                if let HandlerError::RateLimited(action) = err {
                    rate_violation(hub, id, action, &err.to_string());
                } else {
                    debug!(%id, token = kind.name(), error = %err, "Token refused");
                    hub.hub_message(id, &err.to_string());
                }
            }
            ErrorAction::Disconnect => {
                let ip = hub.user(id).map(|u| u.ip);
                warn!(%id, ip = ?ip, token = kind.name(), error = %err, "Protocol violation");
                hub.disconnect(id, &err.to_string());
            }
            ErrorAction::Ban => {
                let Some(ip) = hub.user(id).map(|u| u.ip) else {
                    return;
                };
                hub.stats.ctm_exploits += 1;
                let bantime = hub.config.login.ctm_exploit_bantime;
                hub.hard_ban_ip(ip, bantime, &err.to_string());
                hub.disconnect(id, &err.to_string());
            }
        }
    }
}

/// A rate denial: warn (through the warnings bucket) and escalate to a
/// temporary ban once the violations bucket runs dry.
fn rate_violation(hub: &mut Hub, id: ConnId, action: RateAction, warning: &str) {
    if take_token(hub, id, RateAction::Warnings) == Some(true) {
        hub.hub_message(id, warning);
    }
    if take_token(hub, id, RateAction::Violations) != Some(false) {
        return;
    }
    let Some((nick, ip)) = hub.user(id).map(|u| (u.nick.clone(), u.ip)) else {
        return;
    };
    let bantime = hub.config.security.violation_bantime;
    let reason = format!("flooding ({})", action.name());
    warn!(%nick, %ip, action = action.name(), "Repeated rate violations, banning");
    hub.stats.violation_bans += 1;
    let op = hub.config.hub.hubsec_nick.clone();
    if let Err(e) = hub.apply_ban(&op, BanScope::User(nick), bantime, &reason) {
        debug!(%id, error = %e, "Violation ban not applied");
    }
    hub.disconnect(id, "Rate violations");
}

impl ProtocolHandler for NmdcProtocol {
    fn name(&self) -> &'static str {
        "nmdc"
    }

    fn on_accept(&self, hub: &mut Hub, id: ConnId) {
        let lock = generate_lock(&mut rand::thread_rng(), hub.config.login.lock_length);
        let pk = format!("{SOFTWARE}{}", env!("CARGO_PKG_VERSION"));
        let greeting = [encode::lock(&lock, &pk), encode::hub_name(&hub.config.hub.name)];
        if let Some(user) = hub.user_mut(id) {
            user.lock = lock;
        }
        if hub.send(id, &greeting) {
            hub.set_state(id, SendLock);
        }
    }

    fn handle_token(&self, hub: &mut Hub, id: ConnId, token: &[u8]) {
        let kind = identify(token);
        let _timer = TokenTimer::new(kind.name());
        debug!(%id, token = kind.name(), len = token.len(), "Token");
        let mut ctx = Context::new(hub, id, token);
        if let Err(err) = self.registry.dispatch(&mut ctx, kind) {
            self.on_error(hub, id, kind, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    #[test]
    fn test_on_accept_sends_lock_and_name() {
        let mut hub = Hub::new(test_config());
        let (id, mock) = connect(&mut hub, Ipv4Addr::new(10, 0, 0, 1));
        NmdcProtocol::new().on_accept(&mut hub, id);
        let sent = mock.take_sent();
        assert!(sent.starts_with("$Lock EXTENDEDPROTOCOL"));
        assert!(sent.contains(" Pk=nmdc-hubd"));
        assert!(sent.ends_with("$HubName nmdc-hubd|"));
        let user = hub.user(id).unwrap();
        assert_eq!(user.state, SendLock);
        assert_eq!(user.lock.len(), "EXTENDEDPROTOCOL".len() + 16);
    }

    #[test]
    fn test_mynick_before_key_hard_bans() {
        let mut hub = Hub::new(test_config());
        let ip = Ipv4Addr::new(10, 0, 0, 9);
        let (id, mock) = connect(&mut hub, ip);
        let protocol = NmdcProtocol::new();
        protocol.on_accept(&mut hub, id);
        protocol.handle_token(&mut hub, id, b"$MyNick victim");
        assert!(mock.is_closed());
        assert!(hub.session(id).is_none());
        assert_eq!(hub.stats().ctm_exploits, 1);
        assert!(hub.admit(ip).is_err());
    }

    #[test]
    fn test_out_of_order_token_is_ignored() {
        let mut hub = Hub::new(test_config());
        let (id, mock) = connect(&mut hub, Ipv4Addr::new(10, 0, 0, 1));
        let protocol = NmdcProtocol::new();
        protocol.on_accept(&mut hub, id);
        mock.take_sent();
        protocol.handle_token(&mut hub, id, b"<alice> hello");
        protocol.handle_token(&mut hub, id, b"$Frobnicate");
        protocol.handle_token(&mut hub, id, b"");
        assert!(hub.session(id).is_some());
        assert_eq!(mock.take_sent(), "");
        assert_eq!(hub.user(id).unwrap().state, SendLock);
    }

    #[test]
    fn test_ignored_tokens_do_not_extend_handshake() {
        let mut hub = Hub::new(test_config());
        let (id, mock) = connect(&mut hub, Ipv4Addr::new(10, 0, 0, 1));
        let protocol = NmdcProtocol::new();
        protocol.on_accept(&mut hub, id);

        hub.advance_clock(Duration::from_secs(20));
        protocol.handle_token(&mut hub, id, b"$Frobnicate");
        protocol.handle_token(&mut hub, id, b"<alice> hello");
        hub.fire_timers();
        assert!(hub.session(id).is_some());

        hub.advance_clock(Duration::from_secs(11));
        hub.fire_timers();
        assert!(hub.session(id).is_none());
        assert!(mock.is_closed());
    }
}
