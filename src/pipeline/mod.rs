//! Per-connection orchestration: frames in, write actions out.
//!
//! # Data Flow
//! ```text
//! Client frame
//!     → header decode (always)
//!     → no filter interest: exact bytes forwarded upstream
//!     → interest: body decode, filters in chain order (forward/drop/originate)
//!     → originated requests registered in the correlation table, sent upstream
//!
//! Broker frame
//!     → correlation id peek
//!     → proxy-owned id: response filters run, entry resolved with the
//!       post-filter body, nothing written downstream
//!     → client id: response filters run, frame forwarded or dropped
//!
//! Deadline tick
//!     → expired entries rejected with a timeout; connection continues
//! ```
//!
//! # Design Decisions
//! - The pipeline does no I/O: it returns `WriteAction`s for the net layer,
//!   which keeps every scenario testable without sockets
//! - One pipeline per connection pair, owned by a single task; no shared
//!   mutable state between connections
//! - Frame-local failures (timeout, unknown correlation id) are logged and
//!   absorbed; protocol corruption is returned as an error and the caller
//!   closes the connection

pub mod correlation;

pub use correlation::{CorrelationTable, ResponsePromise, SendRequestError};

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::time::Instant;

use crate::filter::context::{FilterContext, OriginatedRequest, TerminalAction};
use crate::filter::FilterChain;
use crate::net::connection::ConnectionId;
use crate::observability::metrics as proxy_metrics;
use crate::protocol::{codec, FrameBody, FrameError};

/// Connection-scoped identity available to filters.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    id: ConnectionId,
    sni_hostname: Option<String>,
}

impl ConnectionContext {
    pub fn new(id: ConnectionId, sni_hostname: Option<String>) -> Self {
        Self { id, sni_hostname }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn sni_hostname(&self) -> Option<&str> {
        self.sni_hostname.as_deref()
    }
}

/// A write the transport layer must perform on the pipeline's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteAction {
    /// Send toward the backend broker.
    Upstream(Bytes),
    /// Send toward the client.
    Downstream(Bytes),
}

/// Connection-fatal pipeline failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A filter handler returned without forwarding or dropping its frame.
    #[error("filter {filter:?} completed without forwarding or dropping the frame")]
    FilterContractViolation { filter: String },
}

/// The per-connection engine tying codec, filters, and correlation together.
pub struct ConnectionPipeline {
    context: ConnectionContext,
    chain: FilterChain,
    table: CorrelationTable,
    default_timeout: Duration,
}

impl ConnectionPipeline {
    pub fn new(context: ConnectionContext, chain: FilterChain, default_timeout: Duration) -> Self {
        Self {
            context,
            chain,
            table: CorrelationTable::new(),
            default_timeout,
        }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    /// Process one complete frame read from the client.
    pub fn on_client_frame(&mut self, frame: Bytes) -> Result<Vec<WriteAction>, PipelineError> {
        let now = Instant::now();
        let header = codec::decode_request_header(&frame)?;
        metrics::counter!(proxy_metrics::FRAMES_TOTAL, "direction" => "request").increment(1);

        // Negative ids belong to the proxy; a client using one would have its
        // response swallowed by the originated-response path.
        if CorrelationTable::is_proxy_id(header.correlation_id) {
            return Err(FrameError::Malformed(format!(
                "client sent negative correlation id {}; negative ids are proxy-allocated",
                header.correlation_id
            ))
            .into());
        }

        if !self.chain.wants_request(header.api_key, header.api_version) {
            // Zero-copy passthrough: the inbound bytes go out untouched.
            self.table
                .track_passthrough(header.correlation_id, header.api_key, header.api_version);
            return Ok(vec![WriteAction::Upstream(frame)]);
        }

        let request = codec::decode_request(&frame, true)?;
        let FrameBody::Decoded(mut body) = request.body else {
            unreachable!("decode_request(decode_body = true) always yields a decoded body");
        };

        let mut originated = Vec::new();
        let mut dropped = false;
        for filter in self.chain.filters_mut() {
            if !filter.should_deserialize_request(header.api_key, header.api_version) {
                continue;
            }
            let mut ctx =
                FilterContext::new(&self.context, &mut self.table, self.default_timeout, now);
            filter.on_request(&request.header, &mut body, &mut ctx);
            let terminal = ctx.terminal().ok_or_else(|| PipelineError::FilterContractViolation {
                filter: filter.name().to_string(),
            })?;
            originated.append(&mut ctx.take_originated());
            if terminal == TerminalAction::Drop {
                dropped = true;
                break;
            }
        }

        let mut actions = self.encode_originated(originated)?;
        if dropped {
            metrics::counter!(proxy_metrics::FRAMES_DROPPED_TOTAL, "direction" => "request")
                .increment(1);
            tracing::debug!(
                connection_id = %self.context.id(),
                api_key = %header.api_key,
                correlation_id = header.correlation_id,
                "Request dropped by filter chain"
            );
        } else {
            if body.elicits_response() {
                self.table.track_passthrough(
                    header.correlation_id,
                    header.api_key,
                    header.api_version,
                );
            }
            let out = codec::encode_request(&request.header, &FrameBody::Decoded(body))?;
            actions.push(WriteAction::Upstream(out));
        }
        Ok(actions)
    }

    /// Process one complete frame read from the broker.
    pub fn on_broker_frame(&mut self, frame: Bytes) -> Result<Vec<WriteAction>, PipelineError> {
        let now = Instant::now();
        let correlation_id = codec::peek_response_correlation_id(&frame)?;
        metrics::counter!(proxy_metrics::FRAMES_TOTAL, "direction" => "response").increment(1);

        if CorrelationTable::is_proxy_id(correlation_id) {
            let Some(entry) = self.table.remove(correlation_id) else {
                // Late arrival after a timeout, or a duplicate. Not fatal.
                tracing::warn!(
                    connection_id = %self.context.id(),
                    correlation_id,
                    "Discarding response for unknown proxy correlation id"
                );
                return Ok(Vec::new());
            };
            let response =
                codec::decode_response(&frame, entry.api_key, entry.api_version, true)?;
            let FrameBody::Decoded(mut body) = response.body else {
                unreachable!("decode_response(decode_body = true) always yields a decoded body");
            };

            // Originated responses still traverse the response filters; only
            // the downstream write is suppressed, since the client never sent
            // the request. Drop stops the chain but the promise resolves with
            // whatever body the filters left behind.
            let mut originated = Vec::new();
            for filter in self.chain.filters_mut() {
                if !filter.should_deserialize_response(entry.api_key, entry.api_version) {
                    continue;
                }
                let mut ctx =
                    FilterContext::new(&self.context, &mut self.table, self.default_timeout, now);
                filter.on_response(&response.header, &mut body, &mut ctx);
                let terminal =
                    ctx.terminal().ok_or_else(|| PipelineError::FilterContractViolation {
                        filter: filter.name().to_string(),
                    })?;
                originated.append(&mut ctx.take_originated());
                if terminal == TerminalAction::Drop {
                    break;
                }
            }
            let actions = self.encode_originated(originated)?;
            entry.resolve(Ok(Some(body)));
            return Ok(actions);
        }

        let Some((api_key, api_version)) = self.table.take_passthrough(correlation_id) else {
            tracing::warn!(
                connection_id = %self.context.id(),
                correlation_id,
                "Discarding response with no matching in-flight request"
            );
            return Ok(Vec::new());
        };

        if !self.chain.wants_response(api_key, api_version) {
            return Ok(vec![WriteAction::Downstream(frame)]);
        }

        let response = codec::decode_response(&frame, api_key, api_version, true)?;
        let FrameBody::Decoded(mut body) = response.body else {
            unreachable!("decode_response(decode_body = true) always yields a decoded body");
        };

        let mut originated = Vec::new();
        let mut dropped = false;
        for filter in self.chain.filters_mut() {
            if !filter.should_deserialize_response(api_key, api_version) {
                continue;
            }
            let mut ctx =
                FilterContext::new(&self.context, &mut self.table, self.default_timeout, now);
            filter.on_response(&response.header, &mut body, &mut ctx);
            let terminal = ctx.terminal().ok_or_else(|| PipelineError::FilterContractViolation {
                filter: filter.name().to_string(),
            })?;
            originated.append(&mut ctx.take_originated());
            if terminal == TerminalAction::Drop {
                dropped = true;
                break;
            }
        }

        let mut actions = self.encode_originated(originated)?;
        if dropped {
            metrics::counter!(proxy_metrics::FRAMES_DROPPED_TOTAL, "direction" => "response")
                .increment(1);
            tracing::debug!(
                connection_id = %self.context.id(),
                correlation_id,
                "Response dropped by filter chain"
            );
        } else {
            let out = codec::encode_response(
                &response.header,
                &FrameBody::Decoded(body),
                api_key,
                api_version,
            )?;
            actions.push(WriteAction::Downstream(out));
        }
        Ok(actions)
    }

    /// Earliest originated-request deadline, for the connection task's timer.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.table.next_deadline()
    }

    /// Reject every originated request whose deadline has elapsed.
    pub fn on_deadline(&mut self, now: Instant) {
        for (correlation_id, entry) in self.table.expire(now) {
            let elapsed = now.saturating_duration_since(entry.created_at);
            let (api_key, api_version) = (entry.api_key, entry.api_version);
            metrics::counter!(proxy_metrics::REQUEST_TIMEOUTS_TOTAL).increment(1);
            tracing::warn!(
                connection_id = %self.context.id(),
                correlation_id,
                %api_key,
                api_version,
                ?elapsed,
                "Originated request timed out"
            );
            entry.resolve(Err(SendRequestError::Timeout {
                api_key,
                api_version,
                elapsed,
            }));
        }
    }

    /// Tear down: reject everything outstanding. Called exactly once when the
    /// owning connection closes.
    pub fn close(&mut self) {
        let outstanding = self.table.outstanding();
        if outstanding > 0 {
            tracing::debug!(
                connection_id = %self.context.id(),
                outstanding,
                "Rejecting outstanding originated requests at teardown"
            );
        }
        self.table.fail_all();
    }

    fn encode_originated(
        &mut self,
        originated: Vec<OriginatedRequest>,
    ) -> Result<Vec<WriteAction>, PipelineError> {
        let mut actions = Vec::with_capacity(originated.len());
        for request in originated {
            metrics::counter!(proxy_metrics::ORIGINATED_REQUESTS_TOTAL).increment(1);
            let frame = codec::encode_request(&request.header, &FrameBody::Decoded(request.body))?;
            actions.push(WriteAction::Upstream(frame));
        }
        Ok(actions)
    }
}
