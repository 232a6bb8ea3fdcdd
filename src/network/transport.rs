//! Socket plumbing between the hub actor and the per-connection reactor
//! tasks.
//!
//! The actor never awaits a socket. It writes with non-blocking vectored
//! writes through [`Transport`], and a small reactor task per connection
//! turns readiness into [`NetEvent`]s:
//!
//! ```text
//! reactor ── Input / Writable / Closed ──▶ hub actor
//!         ◀── IoRequest::Writable / Close ─
//! ```

use std::io::{self, IoSlice};
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{Instrument, debug};

use crate::state::ConnId;

/// Largest read handed to the actor at once.
const READ_CHUNK: usize = 16 * 1024;

/// Most buffers passed to one vectored write.
pub const MAX_IOVECS: usize = 64;

/// Events delivered to the hub actor.
#[derive(Debug)]
pub enum NetEvent {
    /// A new TCP connection from the gateway.
    Accepted { stream: TcpStream, addr: SocketAddr },
    /// Bytes read from a connection.
    Input { id: ConnId, data: Bytes },
    /// A connection that asked for it can be written again.
    Writable { id: ConnId },
    /// EOF or a socket error.
    Closed { id: ConnId, error: Option<io::Error> },
}

/// Requests from the actor to a reactor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoRequest {
    /// Report the next writability.
    Writable,
    /// Stop and release the socket.
    Close,
}

/// The write half of a connection as seen by the hub.
pub trait Transport {
    /// Write as much of `bufs` as the socket takes without blocking.
    /// Returns the number of bytes written; `WouldBlock` means none.
    fn try_send(&mut self, bufs: &[Bytes]) -> io::Result<usize>;

    /// Ask for (or stop asking for) a writability event.
    fn want_writable(&mut self, want: bool);

    /// Release the socket. Further sends fail.
    fn close(&mut self);
}

/// [`Transport`] over a tokio TCP stream shared with its reactor task.
pub struct TcpTransport {
    stream: Option<Arc<TcpStream>>,
    control: mpsc::UnboundedSender<IoRequest>,
}

impl TcpTransport {
    /// Spawn the reactor task for `stream` and return the actor's half.
    pub fn spawn(
        id: ConnId,
        stream: TcpStream,
        events: mpsc::Sender<NetEvent>,
        span: tracing::Span,
    ) -> Self {
        let stream = Arc::new(stream);
        let (control, requests) = mpsc::unbounded_channel();
        tokio::spawn(reactor(id, Arc::clone(&stream), requests, events).instrument(span));
        Self {
            stream: Some(stream),
            control,
        }
    }
}

impl Transport for TcpTransport {
    fn try_send(&mut self, bufs: &[Bytes]) -> io::Result<usize> {
        let Some(stream) = &self.stream else {
            return Err(io::ErrorKind::NotConnected.into());
        };
        let slices: Vec<IoSlice<'_>> = bufs
            .iter()
            .take(MAX_IOVECS)
            .map(|buf| IoSlice::new(buf))
            .collect();
        stream.try_write_vectored(&slices)
    }

    fn want_writable(&mut self, want: bool) {
        if want {
            let _ = self.control.send(IoRequest::Writable);
        }
    }

    fn close(&mut self) {
        let _ = self.control.send(IoRequest::Close);
        self.stream = None;
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.control.send(IoRequest::Close);
    }
}

/// Per-connection readiness loop.
///
/// Reads are paused while the actor's event queue is full, which is how
/// input backpressure reaches the socket.
async fn reactor(
    id: ConnId,
    stream: Arc<TcpStream>,
    mut requests: mpsc::UnboundedReceiver<IoRequest>,
    events: mpsc::Sender<NetEvent>,
) {
    let mut want_write = false;
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(IoRequest::Writable) => want_write = true,
                Some(IoRequest::Close) | None => break,
            },
            ready = stream.writable(), if want_write => {
                want_write = false;
                if ready.is_err() || events.send(NetEvent::Writable { id }).await.is_err() {
                    break;
                }
            }
            ready = stream.readable() => {
                if let Err(e) = ready {
                    let _ = events.send(NetEvent::Closed { id, error: Some(e) }).await;
                    break;
                }
                buf.reserve(READ_CHUNK);
                match stream.try_read_buf(&mut buf) {
                    Ok(0) => {
                        let _ = events.send(NetEvent::Closed { id, error: None }).await;
                        break;
                    }
                    Ok(_) => {
                        let data = buf.split().freeze();
                        if events.send(NetEvent::Input { id, data }).await.is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(e) => {
                        let _ = events.send(NetEvent::Closed { id, error: Some(e) }).await;
                        break;
                    }
                }
            }
        }
    }
    debug!("reactor stopped");
}
