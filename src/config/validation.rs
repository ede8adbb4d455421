//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check addresses parse, timeouts are positive, filter names exist
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Runs once at startup; nothing is validated per-frame

use std::net::SocketAddr;

use crate::addressing::SniAddressMapping;
use crate::config::schema::ProxyConfig;
use crate::filter::registry;

/// One semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    InvalidBindAddress(String),
    InvalidUpstreamAddress(String),
    InvalidProxyAddress(String),
    UnknownFilter(String),
    ZeroTimeout(&'static str),
    ZeroMaxConnections,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidBindAddress(a) => write!(f, "listener.bind_address {:?} is not a socket address", a),
            ValidationError::InvalidUpstreamAddress(a) => write!(f, "upstream.address {:?} is not host:port", a),
            ValidationError::InvalidProxyAddress(a) => write!(f, "proxy.address {:?} is not host:port", a),
            ValidationError::UnknownFilter(n) => write!(f, "filters: {:?} is not a registered filter", n),
            ValidationError::ZeroTimeout(which) => write!(f, "timeouts.{} must be greater than zero", which),
            ValidationError::ZeroMaxConnections => write!(f, "listener.max_connections must be greater than zero"),
        }
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }
    // Upstream and proxy addresses share the host:port shape the address
    // mapping requires.
    if SniAddressMapping::new(&config.upstream.address).is_err() {
        errors.push(ValidationError::InvalidUpstreamAddress(
            config.upstream.address.clone(),
        ));
    }
    if SniAddressMapping::new(&config.proxy.address).is_err() {
        errors.push(ValidationError::InvalidProxyAddress(
            config.proxy.address.clone(),
        ));
    }
    for def in &config.filters {
        if !registry::is_known(&def.name) {
            errors.push(ValidationError::UnknownFilter(def.name.clone()));
        }
    }
    if config.timeouts.send_request_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("send_request_ms"));
    }
    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_timeout_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
