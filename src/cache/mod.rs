//! Broadcast cache: batched fan-out of hub-wide messages.
//!
//! Handlers never write a broadcast to every user. They queue it in one of
//! the [`CacheClass`] queues with its author, and once per second the flush
//! (see [`flush`]) turns each ready class into one shared buffer handed to
//! every receiving user. A user who authored entries in a class gets a
//! private copy without them instead.
//!
//! Messages to a single target that should still ride the flush (private
//! messages and passive search results) go through the per-target direct
//! queues.

mod element;
pub mod flush;
mod nicklist;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use nmdc_proto::Supports;

pub use element::{Batch, CacheElement};
pub use nicklist::{NickEntry, NicklistCache};

use crate::config::CacheConfig;
use crate::state::{ConnId, User};

/// Broadcast classes in flush order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheClass {
    /// `$Hello` for joining users.
    Hello,
    /// Every MyINFO, for operators.
    MyInfoOp,
    /// Coalesced MyINFO, for everyone else.
    MyInfo,
    OpList,
    Chat,
    /// Searches from active users.
    Search,
    /// Searches from passive users; active receivers only.
    SearchPassive,
    Research,
    ResearchPassive,
    Quit,
}

impl CacheClass {
    pub const COUNT: usize = 10;

    pub const ALL: [CacheClass; CacheClass::COUNT] = [
        CacheClass::Hello,
        CacheClass::MyInfoOp,
        CacheClass::MyInfo,
        CacheClass::OpList,
        CacheClass::Chat,
        CacheClass::Search,
        CacheClass::SearchPassive,
        CacheClass::Research,
        CacheClass::ResearchPassive,
        CacheClass::Quit,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            CacheClass::Hello => "hello",
            CacheClass::MyInfoOp => "myinfo_op",
            CacheClass::MyInfo => "myinfo",
            CacheClass::OpList => "oplist",
            CacheClass::Chat => "chat",
            CacheClass::Search => "search",
            CacheClass::SearchPassive => "search_passive",
            CacheClass::Research => "research",
            CacheClass::ResearchPassive => "research_passive",
            CacheClass::Quit => "quit",
        }
    }

    /// Whether `user` gets this class at all.
    pub fn receives(self, user: &User) -> bool {
        match self {
            CacheClass::Hello => !user.supports.contains(Supports::NO_HELLO),
            CacheClass::MyInfoOp => user.is_op(),
            CacheClass::MyInfo => !user.is_op(),
            CacheClass::SearchPassive | CacheClass::ResearchPassive => user.active,
            _ => true,
        }
    }

    fn period(self, config: &CacheConfig) -> Duration {
        match self {
            CacheClass::MyInfo => Duration::from_secs(config.myinfo_period),
            CacheClass::Research | CacheClass::ResearchPassive => {
                Duration::from_secs(config.research_period)
            }
            _ => Duration::from_secs(1),
        }
    }
}

pub struct BroadcastCache {
    classes: Vec<CacheElement>,
    direct: HashMap<ConnId, Vec<Bytes>>,
    direct_bytes: usize,
    pub nicklist: NicklistCache,
}

impl BroadcastCache {
    pub fn new(config: &CacheConfig, now: Instant) -> Self {
        Self {
            classes: CacheClass::ALL
                .iter()
                .map(|class| CacheElement::new(class.period(config), now))
                .collect(),
            direct: HashMap::new(),
            direct_bytes: 0,
            nicklist: NicklistCache::new(
                Duration::from_secs(config.rebuild_period),
                config.spare_divisor,
                now,
            ),
        }
    }

    /// Apply changed cadences.
    pub fn configure(&mut self, config: &CacheConfig) {
        for class in CacheClass::ALL {
            self.classes[class.index()].set_period(class.period(config));
        }
        self.nicklist.configure(
            Duration::from_secs(config.rebuild_period),
            config.spare_divisor,
        );
    }

    pub fn class(&self, class: CacheClass) -> &CacheElement {
        &self.classes[class.index()]
    }

    /// Queue `msg` for every receiver of `class`. The author's own
    /// `cache_sent` counter must be bumped by the caller.
    pub fn enqueue(&mut self, class: CacheClass, author: Option<ConnId>, msg: Bytes) {
        self.classes[class.index()].push(author, msg);
    }

    /// Drop `author`'s queued entries from `class`.
    pub fn purge(&mut self, class: CacheClass, author: ConnId) -> usize {
        self.classes[class.index()].purge(author)
    }

    /// Queue `msg` for `target` alone, delivered with the next flush.
    pub fn queue_direct(&mut self, target: ConnId, msg: Bytes) {
        self.direct_bytes += msg.len();
        self.direct.entry(target).or_default().push(msg);
    }

    pub fn take_direct(&mut self, target: ConnId) -> Option<Vec<Bytes>> {
        let msgs = self.direct.remove(&target)?;
        self.direct_bytes -= msgs.iter().map(Bytes::len).sum::<usize>();
        Some(msgs)
    }

    /// Bytes waiting in the direct queues.
    pub fn direct_bytes(&self) -> usize {
        self.direct_bytes
    }

    /// Drop messages waiting for a departed connection. What it authored
    /// stays queued for everyone else.
    pub fn forget(&mut self, id: ConnId) {
        self.take_direct(id);
    }

    /// Classes due this tick, emptied into batches in flush order.
    pub(crate) fn take_ready(&mut self, now: Instant) -> Vec<(CacheClass, Batch)> {
        CacheClass::ALL
            .iter()
            .filter_map(|&class| {
                let element = &mut self.classes[class.index()];
                element.ready(now).then(|| (class, element.take()))
            })
            .collect()
    }
}
