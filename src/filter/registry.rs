//! Mapping from configured filter names to filter instances.
//!
//! The chain definition is static configuration; instances are built fresh
//! for every connection so filters may keep per-connection state.

use std::sync::Arc;

use thiserror::Error;

use crate::addressing::{AddressMappingError, SniAddressMapping};
use crate::config::ProxyConfig;
use crate::filter::broker_address::BrokerAddressFilter;
use crate::filter::{Filter, FilterChain};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown filter {0:?}")]
    UnknownFilter(String),

    #[error(transparent)]
    AddressMapping(#[from] AddressMappingError),
}

/// Filter names accepted in configuration.
pub fn is_known(name: &str) -> bool {
    matches!(name, "broker-address")
}

/// Build a connection's filter chain from the configured definitions.
pub fn build_chain(config: &ProxyConfig) -> Result<FilterChain, RegistryError> {
    let mut filters: Vec<Box<dyn Filter>> = Vec::with_capacity(config.filters.len());
    for def in &config.filters {
        match def.name.as_str() {
            "broker-address" => {
                let mapping = Arc::new(SniAddressMapping::new(&config.proxy.address)?);
                filters.push(Box::new(BrokerAddressFilter::new(mapping)));
            }
            other => return Err(RegistryError::UnknownFilter(other.to_string())),
        }
    }
    Ok(FilterChain::new(filters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::FilterDefinition;

    #[test]
    fn builds_configured_chain_in_order() {
        let mut config = ProxyConfig::default();
        config.filters = vec![FilterDefinition {
            name: "broker-address".to_string(),
        }];
        let chain = build_chain(&config).unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn unknown_filter_name_is_rejected() {
        let mut config = ProxyConfig::default();
        config.filters = vec![FilterDefinition {
            name: "does-not-exist".to_string(),
        }];
        assert!(matches!(
            build_chain(&config),
            Err(RegistryError::UnknownFilter(_))
        ));
    }

    #[test]
    fn bad_proxy_address_fails_chain_build() {
        let mut config = ProxyConfig::default();
        config.proxy.address = "nonsense".to_string();
        config.filters = vec![FilterDefinition {
            name: "broker-address".to_string(),
        }];
        assert!(matches!(
            build_chain(&config),
            Err(RegistryError::AddressMapping(_))
        ));
    }
}
