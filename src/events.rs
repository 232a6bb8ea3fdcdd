//! Plugin event bus.
//!
//! Handlers are called in registration order with every [`PluginEvent`].
//! A handler returning [`Verdict::Drop`] vetoes the action in progress;
//! the hub aborts it and stops calling further handlers.

use std::fmt;
use std::net::Ipv4Addr;

use tracing::debug;

/// Lifecycle events emitted by the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    Connect { ip: Ipv4Addr },
    Login { nick: String, ip: Ipv4Addr },
    Logout { nick: String, reason: String },
    Chat { nick: String, text: String },
    PrivateMessage { from: String, to: String, text: String },
    Search { nick: String, query: String },
    Kick { op: String, target: String, reason: String },
    Ban { op: String, target: String, reason: String, expiry: Option<i64> },
    Redirect { op: String, target: String, address: String },
    ConfigChange { key: String, value: String },
    CacheFlush { classes: usize, bytes: u64 },
    Save,
    Load,
}

impl PluginEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PluginEvent::Connect { .. } => "connect",
            PluginEvent::Login { .. } => "login",
            PluginEvent::Logout { .. } => "logout",
            PluginEvent::Chat { .. } => "chat",
            PluginEvent::PrivateMessage { .. } => "pm",
            PluginEvent::Search { .. } => "search",
            PluginEvent::Kick { .. } => "kick",
            PluginEvent::Ban { .. } => "ban",
            PluginEvent::Redirect { .. } => "redirect",
            PluginEvent::ConfigChange { .. } => "config",
            PluginEvent::CacheFlush { .. } => "flush",
            PluginEvent::Save => "save",
            PluginEvent::Load => "load",
        }
    }
}

/// A handler's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    /// Abort the action and stop.
    Drop,
    /// Accept the action but skip later handlers.
    Stop,
}

type Handler = Box<dyn FnMut(&PluginEvent) -> Verdict>;

#[derive(Default)]
pub struct PluginBus {
    handlers: Vec<(String, Handler)>,
}

impl fmt::Debug for PluginBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|(name, _)| name))
            .finish()
    }
}

impl PluginBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: FnMut(&PluginEvent) -> Verdict + 'static,
    {
        self.handlers.push((name.into(), Box::new(handler)));
    }

    /// Remove a handler by name. Returns false if none matched.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(n, _)| n != name);
        self.handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Deliver `event`. Returns false when a handler vetoed it.
    pub fn emit(&mut self, event: &PluginEvent) -> bool {
        for (name, handler) in &mut self.handlers {
            match handler(event) {
                Verdict::Continue => {}
                Verdict::Stop => return true,
                Verdict::Drop => {
                    debug!(plugin = %name, event = event.name(), "Event vetoed");
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn chat() -> PluginEvent {
        PluginEvent::Chat {
            nick: "alice".into(),
            text: "hi".into(),
        }
    }

    #[test]
    fn test_drop_vetoes_and_stops() {
        let calls = Rc::new(Cell::new(0));
        let mut bus = PluginBus::new();
        bus.register("filter", |event| match event {
            PluginEvent::Chat { text, .. } if text == "hi" => Verdict::Drop,
            _ => Verdict::Continue,
        });
        let seen = Rc::clone(&calls);
        bus.register("counter", move |_| {
            seen.set(seen.get() + 1);
            Verdict::Continue
        });

        assert!(!bus.emit(&chat()));
        assert_eq!(calls.get(), 0);
        assert!(bus.emit(&PluginEvent::Save));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_stop_accepts() {
        let mut bus = PluginBus::new();
        bus.register("first", |_| Verdict::Stop);
        bus.register("never", |_| Verdict::Drop);
        assert!(bus.emit(&chat()));
        assert!(bus.unregister("first"));
        assert!(!bus.emit(&chat()));
        assert_eq!(bus.len(), 1);
    }
}
