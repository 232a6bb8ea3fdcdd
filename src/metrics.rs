//! Prometheus metrics collection for nmdc-hubd.
//!
//! Exposed on the HTTP endpoint when `server.metrics_port` is set.
//!
//! - `nmdc_token_total{token}` - Tokens processed by kind
//! - `nmdc_token_duration_seconds{token}` - Handler latency
//! - `nmdc_handler_errors_total{token,error}` - Handler errors by code
//! - `nmdc_cache_flush_bytes_total` - Bytes written by the broadcast cache

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Connections by admission result (accepted, or the refusal reason).
pub static CONNECTIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Completed logins.
pub static LOGINS: OnceLock<IntCounter> = OnceLock::new();

/// Ban enforcement events by list (soft, hard, reconnect).
pub static BANS_ENFORCED: OnceLock<IntCounterVec> = OnceLock::new();

/// Leaky bucket denials by action.
pub static RATE_LIMITED: OnceLock<IntCounterVec> = OnceLock::new();

/// Bytes handed to connections by the cache flush.
pub static FLUSH_BYTES: OnceLock<IntCounter> = OnceLock::new();

/// Cache flush runs.
pub static FLUSHES: OnceLock<IntCounter> = OnceLock::new();

/// Writes dropped by the hard or total buffer limit.
pub static BUFFER_DROPS: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Users currently online.
pub static ONLINE_USERS: OnceLock<IntGauge> = OnceLock::new();

/// Output bytes queued across all connections.
pub static BUFFERED_BYTES: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Protocol metrics
// ========================================================================

/// Tokens processed by kind.
pub static TOKEN_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Token handler latency by kind.
pub static TOKEN_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Handler errors by token kind and error code.
pub static HANDLER_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Recipients per cache flush.
pub static FLUSH_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::error!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(CONNECTIONS, IntCounterVec::new(Opts::new("nmdc_connections_total", "Connections by admission result"), &["result"]));
    register!(LOGINS, IntCounter::new("nmdc_logins_total", "Completed logins"));
    register!(BANS_ENFORCED, IntCounterVec::new(Opts::new("nmdc_bans_enforced_total", "Ban enforcement events"), &["list"]));
    register!(RATE_LIMITED, IntCounterVec::new(Opts::new("nmdc_rate_limited_total", "Leaky bucket denials"), &["action"]));
    register!(FLUSH_BYTES, IntCounter::new("nmdc_cache_flush_bytes_total", "Bytes written by the broadcast cache"));
    register!(FLUSHES, IntCounter::new("nmdc_cache_flushes_total", "Broadcast cache flushes"));
    register!(BUFFER_DROPS, IntCounter::new("nmdc_buffer_drops_total", "Writes dropped by buffer limits"));
    register!(ONLINE_USERS, IntGauge::new("nmdc_online_users", "Users currently online"));
    register!(BUFFERED_BYTES, IntGauge::new("nmdc_buffered_bytes", "Queued output bytes"));

    register!(TOKEN_COUNTER, IntCounterVec::new(Opts::new("nmdc_token_total", "Tokens processed by kind"), &["token"]));
    register!(TOKEN_LATENCY, HistogramVec::new(
        HistogramOpts::new("nmdc_token_duration_seconds", "Token handler latency by kind")
            .buckets(vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
        &["token"]));
    register!(HANDLER_ERRORS, IntCounterVec::new(Opts::new("nmdc_handler_errors_total", "Handler errors by token and code"), &["token", "error"]));
    register!(FLUSH_FANOUT, Histogram::with_opts(
        HistogramOpts::new("nmdc_flush_fanout", "Recipients per cache flush")
            .buckets(vec![1.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

#[inline]
fn inc_vec(metric: &OnceLock<IntCounterVec>, labels: &[&str]) {
    if let Some(c) = metric.get() {
        c.with_label_values(labels).inc();
    }
}

#[inline]
fn inc(metric: &OnceLock<IntCounter>, by: u64) {
    if let Some(c) = metric.get() {
        c.inc_by(by);
    }
}

/// Record a processed token with its handler latency.
#[inline]
pub fn record_token(token: &str, duration_secs: f64) {
    inc_vec(&TOKEN_COUNTER, &[token]);
    if let Some(h) = TOKEN_LATENCY.get() {
        h.with_label_values(&[token]).observe(duration_secs);
    }
}

#[inline]
pub fn record_handler_error(token: &str, error: &str) {
    inc_vec(&HANDLER_ERRORS, &[token, error]);
}

#[inline]
pub fn record_connection(result: &str) {
    inc_vec(&CONNECTIONS, &[result]);
}

#[inline]
pub fn record_login() {
    inc(&LOGINS, 1);
}

#[inline]
pub fn record_ban(list: &str) {
    inc_vec(&BANS_ENFORCED, &[list]);
}

#[inline]
pub fn record_rate_limited(action: &str) {
    inc_vec(&RATE_LIMITED, &[action]);
}

#[inline]
pub fn record_buffer_drop() {
    inc(&BUFFER_DROPS, 1);
}

/// Record one cache flush.
#[inline]
pub fn record_flush(bytes: u64, recipients: usize) {
    inc(&FLUSHES, 1);
    inc(&FLUSH_BYTES, bytes);
    if let Some(h) = FLUSH_FANOUT.get() {
        h.observe(recipients as f64);
    }
}

#[inline]
pub fn set_online_users(count: usize) {
    if let Some(g) = ONLINE_USERS.get() {
        g.set(count as i64);
    }
}

#[inline]
pub fn set_buffered_bytes(bytes: usize) {
    if let Some(g) = BUFFERED_BYTES.get() {
        g.set(bytes as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();

        record_token("Chat", 0.0001);
        record_flush(128, 3);
        record_rate_limited("chat");

        let output = gather_metrics();
        assert!(output.contains("nmdc_token_total"));
        assert!(output.contains("nmdc_cache_flushes_total"));
    }
}
