//! Filter chain subsystem.
//!
//! # Data Flow
//! ```text
//! Decoded frame
//!     → chain interest check (should_deserialize_request/response)
//!     → no interest: raw bytes pass through, body never decoded
//!     → interest: body decoded once, interested filters run in chain order
//!     → each invocation ends in exactly one of forward / drop
//!     → originated requests issued via context.rs → correlation table
//! ```
//!
//! # Design Decisions
//! - Interest is declared per (api key, version, direction); handlers for
//!   declined traffic are never invoked (zero-copy passthrough)
//! - A handler returning with neither forward nor drop is a contract
//!   violation and fails the connection, instead of silently dropping
//! - The chain is built once per connection; filters may keep their own state

pub mod broker_address;
pub mod context;
pub mod registry;

pub use context::FilterContext;

use crate::protocol::{ApiBody, ApiKey, RequestHeader, ResponseHeader};

/// One pluggable unit of per-message logic.
///
/// Default interest is none, so a filter only pays for the traffic it asks
/// for. Handlers mutate the body in place and must finish by calling
/// `forward_*` or `drop_*` on the context.
pub trait Filter: Send {
    /// Stable name used in diagnostics and config.
    fn name(&self) -> &'static str;

    fn should_deserialize_request(&self, _api_key: ApiKey, _api_version: i16) -> bool {
        false
    }

    fn should_deserialize_response(&self, _api_key: ApiKey, _api_version: i16) -> bool {
        false
    }

    fn on_request(
        &mut self,
        _header: &RequestHeader,
        _body: &mut ApiBody,
        _ctx: &mut FilterContext<'_>,
    ) {
    }

    fn on_response(
        &mut self,
        _header: &ResponseHeader,
        _body: &mut ApiBody,
        _ctx: &mut FilterContext<'_>,
    ) {
    }
}

/// Ordered filter chain, fixed for the lifetime of one connection.
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Self {
        Self { filters }
    }

    pub fn empty() -> Self {
        Self { filters: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// True if any filter wants the decoded body of this request.
    pub fn wants_request(&self, api_key: ApiKey, api_version: i16) -> bool {
        self.filters
            .iter()
            .any(|f| f.should_deserialize_request(api_key, api_version))
    }

    /// True if any filter wants the decoded body of this response.
    pub fn wants_response(&self, api_key: ApiKey, api_version: i16) -> bool {
        self.filters
            .iter()
            .any(|f| f.should_deserialize_response(api_key, api_version))
    }

    pub fn filters_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Filter>> {
        self.filters.iter_mut()
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|x| x.name()))
            .finish()
    }
}
