//! Gateway - TCP listener that accepts incoming connections.
//!
//! The Gateway only accepts and forwards. Admission (hard bans, buffer
//! budget, connection throttles) happens in the hub actor, which owns the
//! state those checks need.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use super::transport::NetEvent;

/// Pause after an accept error such as EMFILE, so a full descriptor table
/// does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The Gateway accepts incoming TCP connections and hands them to the hub.
pub struct Gateway {
    listener: TcpListener,
    events: mpsc::Sender<NetEvent>,
}

impl Gateway {
    /// Bind the gateway to the specified address.
    pub async fn bind(addr: SocketAddr, events: mpsc::Sender<NetEvent>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Listener bound");
        Ok(Self { listener, events })
    }

    /// Run the gateway until the hub actor goes away.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    if addr.ip().to_canonical().is_ipv6() {
                        warn!(%addr, "IPv6 connection rejected");
                        continue;
                    }
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%addr, error = %e, "Failed to set TCP_NODELAY");
                    }
                    if self
                        .events
                        .send(NetEvent::Accepted { stream, addr })
                        .await
                        .is_err()
                    {
                        info!("Hub stopped, gateway exiting");
                        return Ok(());
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}
