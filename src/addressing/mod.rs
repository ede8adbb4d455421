//! Downstream address mapping.
//!
//! # Responsibilities
//! - Decide what host/port identity the proxy presents to clients in broker
//!   metadata, so clients reconnect through the proxy instead of dialing
//!   backend nodes directly
//!
//! # Design Decisions
//! - Pure lookup over connection identity; no mutable state, no caching
//!   across connections
//! - Configured address is validated at construction, never per-frame

use thiserror::Error;

use crate::pipeline::ConnectionContext;

/// Malformed mapping configuration. Raised at connection build time, before
/// any traffic flows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressMappingError {
    #[error("invalid proxy address {0:?}: expected host:port")]
    InvalidAddress(String),
}

/// Maps a broker-advertised address to the address clients should see.
pub trait AddressMapping: Send + Sync {
    fn downstream_host(&self, ctx: &ConnectionContext, host: &str, port: u16) -> String;
    fn downstream_port(&self, ctx: &ConnectionContext, host: &str, port: u16) -> u16;
}

/// SNI-aware mapping: report the virtual hostname the client negotiated when
/// there is one, otherwise the statically configured host. The port is always
/// the configured port.
#[derive(Debug, Clone)]
pub struct SniAddressMapping {
    target_host: String,
    target_port: u16,
}

impl SniAddressMapping {
    pub fn new(address: &str) -> Result<Self, AddressMappingError> {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| AddressMappingError::InvalidAddress(address.to_string()))?;
        if host.is_empty() {
            return Err(AddressMappingError::InvalidAddress(address.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| AddressMappingError::InvalidAddress(address.to_string()))?;
        Ok(Self {
            target_host: host.to_string(),
            target_port: port,
        })
    }
}

impl AddressMapping for SniAddressMapping {
    fn downstream_host(&self, ctx: &ConnectionContext, _host: &str, _port: u16) -> String {
        match ctx.sni_hostname() {
            Some(sni) => sni.to_string(),
            None => self.target_host.clone(),
        }
    }

    fn downstream_port(&self, _ctx: &ConnectionContext, _host: &str, _port: u16) -> u16 {
        self.target_port
    }
}
