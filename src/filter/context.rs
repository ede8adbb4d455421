//! Per-invocation context handed to each filter.
//!
//! # Responsibilities
//! - Record the filter's terminal decision (forward or drop)
//! - Accept originated requests and register them with the correlation table
//! - Expose connection identity (id, negotiated SNI hostname)
//!
//! The context borrows the connection's correlation table, so everything a
//! filter does stays serialized on that connection's task.

use std::time::Duration;

use tokio::time::Instant;

use crate::pipeline::correlation::{CorrelationTable, ResponsePromise};
use crate::pipeline::ConnectionContext;
use crate::protocol::{ApiBody, ApiKey, RequestHeader};

/// The decision a filter must make for the frame it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalAction {
    Forward,
    Drop,
}

/// A request issued by a filter, queued for the upstream write path.
#[derive(Debug)]
pub struct OriginatedRequest {
    pub header: RequestHeader,
    pub body: ApiBody,
}

pub struct FilterContext<'a> {
    connection: &'a ConnectionContext,
    table: &'a mut CorrelationTable,
    default_timeout: Duration,
    now: Instant,
    terminal: Option<TerminalAction>,
    originated: Vec<OriginatedRequest>,
}

impl<'a> FilterContext<'a> {
    pub(crate) fn new(
        connection: &'a ConnectionContext,
        table: &'a mut CorrelationTable,
        default_timeout: Duration,
        now: Instant,
    ) -> Self {
        Self {
            connection,
            table,
            default_timeout,
            now,
            terminal: None,
            originated: Vec::new(),
        }
    }

    /// Pass the (possibly mutated) request on to the next filter or upstream.
    pub fn forward_request(&mut self) {
        self.terminal = Some(TerminalAction::Forward);
    }

    /// Pass the (possibly mutated) response on downstream.
    pub fn forward_response(&mut self) {
        self.terminal = Some(TerminalAction::Forward);
    }

    /// Stop the chain; nothing is sent for this frame.
    pub fn drop_request(&mut self) {
        self.terminal = Some(TerminalAction::Drop);
    }

    /// Stop the chain; nothing is sent for this frame.
    pub fn drop_response(&mut self) {
        self.terminal = Some(TerminalAction::Drop);
    }

    /// Issue a new request upstream on this filter's behalf.
    ///
    /// Returns immediately with a pending promise; the response (or timeout)
    /// resolves it on this connection's task. Requests whose decoded body is
    /// known to elicit no broker response (an acks=0 Produce) are completed
    /// locally with an empty success and never registered for a response.
    pub fn send_request(
        &mut self,
        api_version: i16,
        body: ApiBody,
        timeout: Option<Duration>,
    ) -> ResponsePromise {
        let api_key = body.api_key();

        if !body.elicits_response() {
            tracing::debug!(
                connection_id = %self.connection.id(),
                %api_key,
                "Originated request elicits no response; completing locally"
            );
            // No response will ever carry this correlation id back, so the
            // wire value is inert; zero keeps it out of the proxy id space.
            self.originated.push(OriginatedRequest {
                header: self.originated_header(api_key, api_version, 0),
                body,
            });
            return CorrelationTable::complete_immediately();
        }

        let timeout = timeout.unwrap_or(self.default_timeout);
        let (correlation_id, promise) = self.table.register(api_key, api_version, timeout, self.now);
        self.originated.push(OriginatedRequest {
            header: self.originated_header(api_key, api_version, correlation_id),
            body,
        });
        promise
    }

    fn originated_header(
        &self,
        api_key: ApiKey,
        api_version: i16,
        correlation_id: i32,
    ) -> RequestHeader {
        RequestHeader {
            api_key,
            api_version,
            correlation_id,
            client_id: Some("kafka-proxy".to_string()),
        }
    }

    /// Connection identity for address-mapping-aware filters.
    pub fn connection(&self) -> &ConnectionContext {
        self.connection
    }

    /// The virtual hostname the client negotiated, if the connection has one.
    pub fn sni_hostname(&self) -> Option<&str> {
        self.connection.sni_hostname()
    }

    pub(crate) fn terminal(&self) -> Option<TerminalAction> {
        self.terminal
    }

    pub(crate) fn take_originated(&mut self) -> Vec<OriginatedRequest> {
        std::mem::take(&mut self.originated)
    }
}
