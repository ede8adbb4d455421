//! Correlation tracking for in-flight requests.
//!
//! # Responsibilities
//! - Allocate proxy-owned correlation ids for filter-originated requests
//! - Hold the pending promise for each originated request until its response,
//!   deadline, or the connection's teardown resolves it
//! - Track pass-through requests so response bodies can be decoded (responses
//!   carry no api identity on the wire)
//!
//! # Design Decisions
//! - Proxy ids descend from -1: client-assigned ids are non-negative, so the
//!   two spaces can never collide
//! - Deadlines live in a min-heap popped by the connection's own task; no
//!   per-request timers or threads
//! - Promise resolution is exactly-once because the oneshot sender is consumed
//!   when the entry is removed from the table

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::protocol::{ApiBody, ApiKey};

/// Failure modes for a filter-originated request. Local to one request;
/// never connection-fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendRequestError {
    /// No response arrived before the configured deadline.
    #[error("{api_key} v{api_version} request timed out after {elapsed:?}")]
    Timeout {
        api_key: ApiKey,
        api_version: i16,
        elapsed: Duration,
    },

    /// The connection closed while the request was outstanding.
    #[error("connection closed with request outstanding")]
    ConnectionClosed,
}

type PromiseResult = Result<Option<ApiBody>, SendRequestError>;

/// Pending result of `FilterContext::send_request`.
///
/// Resolves with `Ok(Some(body))` for a matched response, `Ok(None)` for a
/// fire-and-forget request completed locally, or an error. Must be awaited on
/// the owning connection's task; there is no blocking conversion.
#[derive(Debug)]
pub struct ResponsePromise {
    rx: oneshot::Receiver<PromiseResult>,
}

impl ResponsePromise {
    fn pending() -> (oneshot::Sender<PromiseResult>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// A promise already resolved with a synthetic empty success.
    fn resolved_empty() -> Self {
        let (tx, promise) = Self::pending();
        let _ = tx.send(Ok(None));
        promise
    }

    /// Non-blocking check, usable from synchronous filter code.
    pub fn try_take(&mut self) -> Option<PromiseResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Err(SendRequestError::ConnectionClosed))
            }
        }
    }
}

impl Future for ResponsePromise {
    type Output = PromiseResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without resolving: the table (and connection)
            // are gone.
            Poll::Ready(Err(_)) => Poll::Ready(Err(SendRequestError::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// One outstanding proxy-originated request.
#[derive(Debug)]
pub struct CorrelationEntry {
    pub api_key: ApiKey,
    pub api_version: i16,
    sender: oneshot::Sender<PromiseResult>,
    pub created_at: Instant,
    pub deadline: Instant,
}

impl CorrelationEntry {
    /// Consume the entry, resolving its promise. Idempotence is structural:
    /// the entry no longer exists after this.
    pub fn resolve(self, result: PromiseResult) {
        // The receiver may have been dropped by an uninterested filter.
        let _ = self.sender.send(result);
    }
}

/// Per-connection correlation state. Owned by exactly one connection task.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    next_proxy_id: i32,
    entries: HashMap<i32, CorrelationEntry>,
    deadlines: BinaryHeap<Reverse<(Instant, i32)>>,
    /// Pass-through in-flight requests: correlation id → api identity.
    routes: HashMap<i32, (ApiKey, i16)>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            next_proxy_id: -1,
            entries: HashMap::new(),
            deadlines: BinaryHeap::new(),
            routes: HashMap::new(),
        }
    }

    /// True for ids allocated by the proxy rather than a client.
    pub fn is_proxy_id(correlation_id: i32) -> bool {
        correlation_id < 0
    }

    /// Register an originated request awaiting a response. Returns the
    /// allocated correlation id and the pending promise.
    pub fn register(
        &mut self,
        api_key: ApiKey,
        api_version: i16,
        timeout: Duration,
        now: Instant,
    ) -> (i32, ResponsePromise) {
        let correlation_id = self.next_proxy_id;
        self.next_proxy_id -= 1;

        let (sender, promise) = ResponsePromise::pending();
        let deadline = now + timeout;
        self.entries.insert(
            correlation_id,
            CorrelationEntry {
                api_key,
                api_version,
                sender,
                created_at: now,
                deadline,
            },
        );
        self.deadlines.push(Reverse((deadline, correlation_id)));
        (correlation_id, promise)
    }

    /// Satisfy a fire-and-forget request locally: no entry, no deadline.
    pub fn complete_immediately() -> ResponsePromise {
        ResponsePromise::resolved_empty()
    }

    /// Remove the entry for an arriving response, if it is still pending.
    pub fn remove(&mut self, correlation_id: i32) -> Option<CorrelationEntry> {
        self.entries.remove(&correlation_id)
    }

    /// Earliest pending deadline, if any entry is outstanding.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, id))) = self.deadlines.peek().copied() {
            match self.entries.get(&id) {
                // Entry already resolved; its timer is stale.
                None => {
                    self.deadlines.pop();
                }
                Some(entry) if entry.deadline != deadline => {
                    self.deadlines.pop();
                }
                Some(_) => return Some(deadline),
            }
        }
        None
    }

    /// Remove and return every entry whose deadline has elapsed.
    pub fn expire(&mut self, now: Instant) -> Vec<(i32, CorrelationEntry)> {
        let mut expired = Vec::new();
        while let Some(Reverse((deadline, id))) = self.deadlines.peek().copied() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();
            let still_current = self
                .entries
                .get(&id)
                .map(|e| e.deadline == deadline)
                .unwrap_or(false);
            if still_current {
                let entry = self.entries.remove(&id).expect("entry checked above");
                expired.push((id, entry));
            }
        }
        expired
    }

    /// Reject every outstanding entry and drop all deadlines. Used at
    /// connection teardown.
    pub fn fail_all(&mut self) {
        self.deadlines.clear();
        for (_, entry) in self.entries.drain() {
            entry.resolve(Err(SendRequestError::ConnectionClosed));
        }
    }

    pub fn outstanding(&self) -> usize {
        self.entries.len()
    }

    /// Record the api identity of a forwarded pass-through request.
    pub fn track_passthrough(&mut self, correlation_id: i32, api_key: ApiKey, api_version: i16) {
        self.routes.insert(correlation_id, (api_key, api_version));
    }

    /// Match a pass-through response to its request's api identity.
    pub fn take_passthrough(&mut self, correlation_id: i32) -> Option<(ApiKey, i16)> {
        self.routes.remove(&correlation_id)
    }
}
