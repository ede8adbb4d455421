//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the Kafka proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limits).
    pub listener: ListenerConfig,

    /// Backend broker the proxy fronts.
    pub upstream: UpstreamConfig,

    /// Identity the proxy advertises to clients.
    pub proxy: ProxySection,

    /// Ordered filter chain definition.
    pub filters: Vec<FilterDefinition>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9192").
    pub bind_address: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9192".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Backend broker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Broker address (e.g., "127.0.0.1:9092").
    pub address: String,

    /// Broker connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9092".to_string(),
            connect_timeout_secs: 5,
        }
    }
}

/// The address the proxy presents to clients in rewritten broker metadata.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySection {
    /// `host:port` clients should reconnect through.
    pub address: String,
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            address: "localhost:9192".to_string(),
        }
    }
}

/// One entry in the ordered filter chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterDefinition {
    /// Registered filter name (see `filter::registry`).
    pub name: String,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default deadline for filter-originated requests in milliseconds.
    pub send_request_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            send_request_ms: 30_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
