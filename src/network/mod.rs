//! Network module.
//!
//! Contains the Gateway (TCP listener), the per-connection output and
//! input buffering, the socket reactors, deadline timers and the hub
//! actor's event loop.

mod connection;
mod event_loop;
mod gateway;
mod timers;
mod transport;

pub use connection::{BufferLimits, ConnectionState, OutputState, WriteOutcome};
pub use event_loop::{EVENT_QUEUE, EventLoop};
pub use gateway::Gateway;
pub use timers::{TimerKind, TimerQueue};
pub use transport::Transport;

#[cfg(test)]
pub use transport::mock;
