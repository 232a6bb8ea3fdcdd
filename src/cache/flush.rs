//! The periodic cache flush.
//!
//! Once per second every ready class is emptied into one shared batch.
//! Each online user then gets, in class order, either the shared buffer or
//! (when they authored entries in that class) a private copy with their own
//! entries left out. Direct messages for the user go right before the
//! `$Quit` batch, so a departing user's last PM still arrives before their
//! quit.

use std::iter;
use std::time::Instant;

use bytes::Bytes;
use tracing::debug;

use super::{CacheClass, NickEntry};
use crate::events::PluginEvent;
use crate::state::{ConnId, Hub};

impl Hub {
    /// Deliver every ready broadcast class and all direct queues.
    pub fn flush(&mut self) {
        let now = self.clock.mono();
        let ready = self.cache.take_ready(now);
        if self.cache.nicklist.needs_rebuild(now) {
            self.rebuild_nicklist(now);
        }

        let ids: Vec<ConnId> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.user.is_online())
            .map(|(id, _)| *id)
            .collect();

        let mut bytes = 0u64;
        let mut recipients = 0usize;
        for id in ids {
            let mut direct = self.cache.take_direct(id).unwrap_or_default();
            // An earlier send in this loop may have dropped the session.
            let Some(session) = self.sessions.get(&id) else {
                continue;
            };
            let user = &session.user;

            let mut bufs: Vec<Bytes> = Vec::with_capacity(ready.len() + direct.len());
            for (class, batch) in &ready {
                if *class == CacheClass::Quit {
                    bufs.append(&mut direct);
                }
                if !class.receives(user) {
                    continue;
                }
                let buf = if user.cache_sent[class.index()] > 0 {
                    batch.without(id)
                } else {
                    batch.shared.clone()
                };
                if !buf.is_empty() {
                    bufs.push(buf);
                }
            }
            bufs.append(&mut direct);

            if bufs.is_empty() {
                continue;
            }
            bytes += bufs.iter().map(|b| b.len() as u64).sum::<u64>();
            recipients += 1;
            self.send(id, &bufs);
        }

        for session in self.sessions.values_mut() {
            for (class, _) in &ready {
                session.user.cache_sent[class.index()] = 0;
            }
        }

        if recipients > 0 {
            self.stats.flushed(bytes, recipients);
            debug!(classes = ready.len(), recipients, bytes, "Cache flushed");
        }
        if !ready.is_empty() {
            self.emit(PluginEvent::CacheFlush {
                classes: ready.len(),
                bytes,
            });
        }

        self.sweep_cachelist();
    }

    /// Regenerate the nicklist from the online users, the users still in
    /// their logout grace period and the hub security bot.
    pub(crate) fn rebuild_nicklist(&mut self, now: Instant) {
        let hubsec = NickEntry {
            nick: &self.config.hub.hubsec_nick,
            myinfo: &self.hubsec_info,
            op: true,
        };
        let online = self
            .sessions
            .values()
            .map(|session| &session.user)
            .filter(|user| user.is_online() && !user.is_hidden())
            .filter_map(|user| {
                let myinfo = user.myinfo.as_ref()?;
                Some(NickEntry {
                    nick: &user.nick,
                    myinfo,
                    op: user.is_op(),
                })
            });
        let nicks = &self.nicks;
        let departed = self
            .cachelist
            .iter()
            .filter(|departed| !departed.hidden)
            .filter(|departed| !nicks.contains_key(&departed.nick.to_ascii_lowercase()))
            .map(|departed| NickEntry {
                nick: &departed.nick,
                myinfo: &departed.myinfo,
                op: departed.op,
            });

        self.cache
            .nicklist
            .rebuild(iter::once(hubsec).chain(online).chain(departed), now);
        debug!(rebuilds = self.cache.nicklist.rebuilds(), "Nicklist rebuilt");
    }
}
