//! `$Search` and `$SR`.
//!
//! Searches fan out through the broadcast cache. Active searches reach
//! everyone; passive ones only reach active users, since two passive
//! clients cannot connect to each other. A TTH search repeated within
//! `search_repeat_min` is dropped, and one repeated within
//! `research_interval` goes to the slower research classes.

use nmdc_proto::{Search, SearchResult, SearchSource};
use tracing::debug;

use super::{Context, Handler, framed, secs};
use crate::cache::CacheClass;
use crate::error::{HandlerError, HandlerResult};
use crate::events::PluginEvent;
use crate::security::{RateAction, TthVerdict};
use crate::state::Rights;

/// Handler for `$Search`.
pub struct SearchHandler;

impl Handler for SearchHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        ctx.require(Rights::SEARCH, "search")?;
        if ctx.token.len() > ctx.hub.config.limits.max_search_length {
            return Err(HandlerError::TooLong("search"));
        }
        let search = Search::parse(ctx.token)?;
        let (own_ip, exempt) = {
            let user = ctx.user()?;
            (user.ip, user.has(Rights::SOURCE_VERIFY))
        };
        match search.source {
            SearchSource::Active { ip, .. } => {
                if ip != own_ip && !exempt {
                    ctx.hub.stats.nick_spoofs += 1;
                    return Err(HandlerError::Spoofed("search address"));
                }
            }
            SearchSource::Passive { nick } => ctx.verify_nick(nick, "search nick")?,
        }
        if !ctx.user()?.has(Rights::NO_SEARCH_LIMIT) {
            ctx.rate(RateAction::Search)?;
        }

        let mut research = false;
        if let Some(tth) = search.tth {
            let now = ctx.now();
            let security = &ctx.hub.config.security;
            let (min, window) = (secs(security.search_repeat_min), secs(security.research_interval));
            let user = ctx.user_mut()?;
            match user.tth.check_and_record(tth, now, min, window) {
                TthVerdict::Suppress => {
                    debug!(id = %ctx.id, "Repeated TTH search suppressed");
                    return Ok(());
                }
                TthVerdict::Research => research = true,
                TthVerdict::New => {}
            }
        }

        let event = PluginEvent::Search {
            nick: ctx.nick()?,
            query: String::from_utf8_lossy(search.query).into_owned(),
        };
        if !ctx.hub.emit(event) {
            return Err(HandlerError::Vetoed);
        }

        let class = match (search.is_passive(), research) {
            (false, false) => CacheClass::Search,
            (true, false) => CacheClass::SearchPassive,
            (false, true) => CacheClass::Research,
            (true, true) => CacheClass::ResearchPassive,
        };
        let msg = ctx.framed();
        ctx.hub.broadcast(class, Some(ctx.id), msg);
        Ok(())
    }
}

/// Handler for `$SR <nick> ...\x05<target>`: routed back to a passive
/// searcher with the target suffix cut off.
pub struct SearchResultHandler;

impl Handler for SearchResultHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        let result = SearchResult::parse(ctx.token)?;
        ctx.verify_nick(result.nick, "search result nick")?;
        let target = ctx.target(result.target)?;
        ctx.throttle(RateAction::SearchResultsOut)?;
        if super::take_token(ctx.hub, target, RateAction::SearchResultsIn) != Some(true) {
            return Err(HandlerError::Throttled(RateAction::SearchResultsIn));
        }
        ctx.hub.cache.queue_direct(target, framed(result.forward));
        Ok(())
    }
}
