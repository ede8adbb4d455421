//! Metrics definition and exposition.
//!
//! # Metrics
//! - `proxy_frames_total` (counter, by direction): frames seen on either side
//! - `proxy_frames_dropped_total` (counter, by direction): frames a filter dropped
//! - `proxy_originated_requests_total` (counter): requests issued by filters
//! - `proxy_request_timeouts_total` (counter): originated requests past deadline
//! - `proxy_active_connections` (gauge): currently open connection pairs

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const FRAMES_TOTAL: &str = "proxy_frames_total";
pub const FRAMES_DROPPED_TOTAL: &str = "proxy_frames_dropped_total";
pub const ORIGINATED_REQUESTS_TOTAL: &str = "proxy_originated_requests_total";
pub const REQUEST_TIMEOUTS_TOTAL: &str = "proxy_request_timeouts_total";
pub const ACTIVE_CONNECTIONS: &str = "proxy_active_connections";

/// Install the Prometheus recorder and bind its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics endpoint bound");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install metrics exporter");
        }
    }
}

fn describe() {
    metrics::describe_counter!(FRAMES_TOTAL, "Frames seen, labeled by direction");
    metrics::describe_counter!(FRAMES_DROPPED_TOTAL, "Frames dropped by a filter, labeled by direction");
    metrics::describe_counter!(ORIGINATED_REQUESTS_TOTAL, "Requests originated by filters");
    metrics::describe_counter!(REQUEST_TIMEOUTS_TOTAL, "Originated requests that hit their deadline");
    metrics::describe_gauge!(ACTIVE_CONNECTIONS, "Currently open connection pairs");
}
