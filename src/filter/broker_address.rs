//! Broker address rewriting for metadata responses.
//!
//! Clients discover broker addresses from Metadata responses and then dial
//! those addresses directly. This filter rewrites every advertised broker
//! through the configured address mapping so reconnections land on the proxy.

use std::sync::Arc;

use crate::addressing::AddressMapping;
use crate::filter::{Filter, FilterContext};
use crate::protocol::{ApiBody, ApiKey, ResponseHeader};

pub struct BrokerAddressFilter {
    mapping: Arc<dyn AddressMapping>,
}

impl BrokerAddressFilter {
    pub fn new(mapping: Arc<dyn AddressMapping>) -> Self {
        Self { mapping }
    }
}

impl Filter for BrokerAddressFilter {
    fn name(&self) -> &'static str {
        "broker-address"
    }

    fn should_deserialize_response(&self, api_key: ApiKey, api_version: i16) -> bool {
        api_key == ApiKey::Metadata && api_version == 0
    }

    fn on_response(
        &mut self,
        _header: &ResponseHeader,
        body: &mut ApiBody,
        ctx: &mut FilterContext<'_>,
    ) {
        if let ApiBody::MetadataResponse(resp) = body {
            for broker in &mut resp.brokers {
                let original_port = broker.port.clamp(0, u16::MAX as i32) as u16;
                let host = self
                    .mapping
                    .downstream_host(ctx.connection(), &broker.host, original_port);
                let port = self
                    .mapping
                    .downstream_port(ctx.connection(), &broker.host, original_port);
                tracing::debug!(
                    connection_id = %ctx.connection().id(),
                    node_id = broker.node_id,
                    from = %format!("{}:{}", broker.host, broker.port),
                    to = %format!("{}:{}", host, port),
                    "Rewrote advertised broker address"
                );
                broker.host = host;
                broker.port = i32::from(port);
            }
        }
        ctx.forward_response();
    }
}
