//! Telemetry utilities for token timing and log spans.

use std::time::Instant;

/// Guard for timing a token handler and recording metrics.
///
/// Records latency when dropped.
pub struct TokenTimer {
    token: &'static str,
    start: Instant,
}

impl TokenTimer {
    /// Start timing a token.
    pub fn new(token: &'static str) -> Self {
        Self {
            token,
            start: Instant::now(),
        }
    }
}

impl Drop for TokenTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_token(self.token, duration);
    }
}

/// Span constructors shared by the network layer.
pub mod spans {
    use std::net::Ipv4Addr;

    use tracing::{Span, info_span};

    use crate::state::ConnId;

    /// Span covering one connection's reactor task.
    pub fn connection(id: ConnId, ip: Ipv4Addr) -> Span {
        info_span!("connection", id = %id, ip = %ip)
    }
}
