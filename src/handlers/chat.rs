//! Main chat and private messages.

use nmdc_proto::{ChatLine, McTo, PrivateMessage, encode};

use super::{Context, Handler};
use crate::admin::{self, ReplyVia};
use crate::cache::CacheClass;
use crate::error::{HandlerError, HandlerResult};
use crate::events::PluginEvent;
use crate::security::RateAction;
use crate::state::Rights;

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Handler for `<nick> text`.
pub struct ChatHandler;

impl Handler for ChatHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        ctx.require(Rights::CHAT, "chat")?;
        let line = ChatLine::parse(ctx.token)?;
        ctx.verify_nick(line.nick, "chat nick")?;
        if line.text.len() > ctx.hub.config.limits.max_chat_length {
            return Err(HandlerError::TooLong("chat message"));
        }
        ctx.rate(RateAction::Chat)?;

        if let Some(command) = line.text.strip_prefix(b"!") {
            let command = text(command);
            if admin::is_command(&command) {
                admin::execute(ctx.hub, ctx.id, &command, ReplyVia::Chat);
                return Ok(());
            }
        }

        let event = PluginEvent::Chat {
            nick: ctx.nick()?,
            text: text(line.text),
        };
        if !ctx.hub.emit(event) {
            return Err(HandlerError::Vetoed);
        }

        let msg = ctx.framed();
        ctx.hub.send_one(ctx.id, msg.clone());
        ctx.hub.broadcast(CacheClass::Chat, Some(ctx.id), msg);
        Ok(())
    }
}

/// Handler for `$To: <target> From: <nick> $<nick> text`.
pub struct PrivateMessageHandler;

impl Handler for PrivateMessageHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        ctx.require(Rights::PM, "send private messages")?;
        let pm = PrivateMessage::parse(ctx.token)?;
        ctx.verify_nick(pm.from, "PM sender")?;
        ctx.verify_nick(pm.nick, "PM nick")?;
        if pm.text.len() > ctx.hub.config.limits.max_pm_length {
            return Err(HandlerError::TooLong("private message"));
        }
        ctx.rate(RateAction::Chat)?;

        if ctx.hub.is_hubsec(pm.target) {
            let command = pm.text.strip_prefix(b"!").unwrap_or(pm.text);
            admin::execute(ctx.hub, ctx.id, &text(command), ReplyVia::Private);
            return Ok(());
        }

        let target = ctx.target(pm.target)?;
        let event = PluginEvent::PrivateMessage {
            from: ctx.nick()?,
            to: text(pm.target),
            text: text(pm.text),
        };
        if !ctx.hub.emit(event) {
            return Err(HandlerError::Vetoed);
        }
        let msg = ctx.framed();
        ctx.hub.cache.queue_direct(target, msg);
        Ok(())
    }
}

/// Handler for `$MCTo: <target> $<nick> text`: a private line shown in the
/// target's main chat.
pub struct McToHandler;

impl Handler for McToHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        ctx.require(Rights::PM, "send private messages")?;
        let mcto = McTo::parse(ctx.token)?;
        ctx.verify_nick(mcto.from, "MCTo sender")?;
        if mcto.text.len() > ctx.hub.config.limits.max_pm_length {
            return Err(HandlerError::TooLong("private message"));
        }
        ctx.rate(RateAction::Chat)?;

        let target = ctx.target(mcto.target)?;
        let from = ctx.nick()?;
        let event = PluginEvent::PrivateMessage {
            from: from.clone(),
            to: text(mcto.target),
            text: text(mcto.text),
        };
        if !ctx.hub.emit(event) {
            return Err(HandlerError::Vetoed);
        }
        ctx.hub
            .cache
            .queue_direct(target, encode::chat(&from, mcto.text));
        Ok(())
    }
}
