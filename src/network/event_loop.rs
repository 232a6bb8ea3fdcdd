//! The hub actor's main loop.
//!
//! One task owns the [`Hub`] and is the only code that touches it. It
//! wakes on [`NetEvent`]s from the gateway and the reactors, and on a
//! 100 ms tick that drives timers, the cache flush, ban sweeps and
//! autosave.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use super::transport::{NetEvent, TcpTransport};
use crate::handlers::ProtocolHandler;
use crate::state::{ConnId, Hub};
use crate::telemetry::spans;

/// Period of the housekeeping tick.
const TICK: Duration = Duration::from_millis(100);

/// Capacity of the event channel. A full channel pauses socket reads.
pub const EVENT_QUEUE: usize = 4096;

pub struct EventLoop<P> {
    hub: Hub,
    protocol: P,
    events: mpsc::Receiver<NetEvent>,
    /// Cloned into each reactor task.
    sender: mpsc::Sender<NetEvent>,
}

impl<P: ProtocolHandler> EventLoop<P> {
    pub fn new(
        hub: Hub,
        protocol: P,
        events: mpsc::Receiver<NetEvent>,
        sender: mpsc::Sender<NetEvent>,
    ) -> Self {
        Self {
            hub,
            protocol,
            events,
            sender,
        }
    }

    /// Run until Ctrl-C or until every event sender is gone, then save.
    #[instrument(skip_all, name = "hub", fields(protocol = self.protocol.name()))]
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!("Hub running");
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => {
                        info!("Event channel closed");
                        break;
                    }
                },
                _ = tick.tick() => self.hub.tick(),
                signal = &mut shutdown => {
                    if let Err(e) = signal {
                        error!(error = %e, "Failed to listen for Ctrl-C");
                    }
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        if let Err(e) = self.hub.save() {
            error!(error = %e, "Final save failed");
        }
        info!(online = self.hub.online_count(), "Hub stopped");
        Ok(())
    }

    fn handle(&mut self, event: NetEvent) {
        match event {
            NetEvent::Accepted { stream, addr } => self.accept(stream, addr),
            NetEvent::Input { id, data } => {
                self.hub.feed(id, &data);
                self.process_input(id);
            }
            NetEvent::Writable { id } => {
                self.hub.on_writable(id);
                // Input may have been held back while output overflowed.
                self.process_input(id);
            }
            NetEvent::Closed { id, error } => {
                let reason = match error {
                    Some(e) => format!("Read error: {e}"),
                    None => "Connection closed by peer".to_string(),
                };
                self.hub.disconnect(id, &reason);
            }
        }
    }

    fn accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        let IpAddr::V4(ip) = addr.ip().to_canonical() else {
            debug!(%addr, "Non-IPv4 peer dropped");
            return;
        };
        if let Err(refusal) = self.hub.admit(ip) {
            info!(%ip, reason = refusal.name(), "Connection refused");
            return;
        }
        let id = self.hub.next_id();
        let transport = TcpTransport::spawn(id, stream, self.sender.clone(), spans::connection(id, ip));
        self.hub.register(id, ip, Box::new(transport));
        self.protocol.on_accept(&mut self.hub, id);
    }

    /// Hand every complete token from `id` to the protocol.
    fn process_input(&mut self, id: ConnId) {
        while let Some(next) = self.hub.next_token(id) {
            match next {
                Ok(token) => self.protocol.handle_token(&mut self.hub, id, &token),
                Err(e) => {
                    warn!(%id, error = %e, "Input rejected");
                    self.hub.disconnect(id, "Token too long");
                    break;
                }
            }
        }
    }
}
