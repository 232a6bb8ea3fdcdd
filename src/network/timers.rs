//! Single-shot deadline timers for the hub actor.
//!
//! A min-heap keyed by deadline. Each entry names the state it guards
//! through an epoch; the hub drops entries whose epoch is stale when they
//! come due, so timers are never cancelled explicitly.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::state::ConnId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKind {
    /// Login must complete before this fires. Guards the user's state epoch.
    Handshake,
    /// Output stuck in buffering. Guards the connection's output epoch.
    Buffering,
    /// Output stuck in overflow. Guards the connection's output epoch.
    Overflow,
}

impl TimerKind {
    pub fn name(self) -> &'static str {
        match self {
            TimerKind::Handshake => "handshake",
            TimerKind::Buffering => "buffering",
            TimerKind::Overflow => "overflow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    pub at: Instant,
    pub id: ConnId,
    pub kind: TimerKind,
    pub epoch: u64,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<Deadline>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn arm(&mut self, at: Instant, id: ConnId, kind: TimerKind, epoch: u64) {
        self.heap.push(Reverse(Deadline { at, id, kind, epoch }));
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(d)| d.at)
    }

    /// Pop every deadline at or before `now`, earliest first.
    pub fn expired(&mut self, now: Instant) -> Vec<Deadline> {
        let mut due = Vec::new();
        while let Some(Reverse(next)) = self.heap.peek() {
            if next.at > now {
                break;
            }
            if let Some(Reverse(deadline)) = self.heap.pop() {
                due.push(deadline);
            }
        }
        due
    }
}
