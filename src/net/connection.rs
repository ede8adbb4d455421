//! Per-connection relay: one task owning a client/broker socket pair.
//!
//! # Responsibilities
//! - Generate unique connection ids for tracing
//! - Establish the broker connection with a timeout
//! - Drive the frame read loop on both sides, the deadline timer, and
//!   shutdown, all serialized on this task
//! - Perform the writes the pipeline asks for

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::ProxyConfig;
use crate::filter::registry::{self, RegistryError};
use crate::observability::metrics as proxy_metrics;
use crate::pipeline::{ConnectionContext, ConnectionPipeline, PipelineError, WriteAction};
use crate::protocol::FrameDecoder;

/// Global atomic counter for connection ids. Relaxed ordering is sufficient:
/// only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Failures that end a connection pair.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to reach upstream broker: {0}")]
    Upstream(std::io::Error),

    #[error("upstream connect timed out")]
    ConnectTimeout,

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Chain(#[from] RegistryError),
}

/// Serve one client connection until either side closes, a fatal protocol
/// error occurs, or shutdown is signaled.
pub async fn handle_connection(
    client: TcpStream,
    config: Arc<ProxyConfig>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ConnectionError> {
    let id = ConnectionId::new();
    let chain = registry::build_chain(&config)?;

    let broker = tokio::time::timeout(
        Duration::from_secs(config.upstream.connect_timeout_secs),
        TcpStream::connect(&config.upstream.address),
    )
    .await
    .map_err(|_| ConnectionError::ConnectTimeout)?
    .map_err(ConnectionError::Upstream)?;

    tracing::debug!(
        connection_id = %id,
        upstream = %config.upstream.address,
        filters = chain.len(),
        "Connection pair established"
    );

    // Plain TCP listener: no TLS handshake, so no negotiated SNI hostname.
    let context = ConnectionContext::new(id, None);
    let mut pipeline = ConnectionPipeline::new(
        context,
        chain,
        Duration::from_millis(config.timeouts.send_request_ms),
    );

    let _gauge = ActiveConnectionGauge::track();
    let (mut client_rd, mut client_wr) = client.into_split();
    let (mut broker_rd, mut broker_wr) = broker.into_split();

    let result = relay_loop(
        &mut pipeline,
        &mut client_rd,
        &mut client_wr,
        &mut broker_rd,
        &mut broker_wr,
        &mut shutdown,
    )
    .await;

    // Teardown always rejects outstanding originated requests, even on the
    // error path.
    pipeline.close();
    tracing::debug!(connection_id = %id, "Connection closed");
    result
}

async fn relay_loop(
    pipeline: &mut ConnectionPipeline,
    client_rd: &mut OwnedReadHalf,
    client_wr: &mut OwnedWriteHalf,
    broker_rd: &mut OwnedReadHalf,
    broker_wr: &mut OwnedWriteHalf,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ConnectionError> {
    let mut client_frames = FrameDecoder::new();
    let mut broker_frames = FrameDecoder::new();
    let mut client_buf = BytesMut::with_capacity(8 * 1024);
    let mut broker_buf = BytesMut::with_capacity(8 * 1024);

    loop {
        let deadline = pipeline.next_deadline();
        tokio::select! {
            read = client_rd.read_buf(&mut client_buf) => {
                if read? == 0 {
                    break;
                }
                client_frames.push(&client_buf);
                client_buf.clear();
                while let Some(frame) = client_frames.next_frame().map_err(PipelineError::from)? {
                    let actions = pipeline.on_client_frame(frame)?;
                    apply_actions(actions, client_wr, broker_wr).await?;
                }
            }
            read = broker_rd.read_buf(&mut broker_buf) => {
                if read? == 0 {
                    break;
                }
                broker_frames.push(&broker_buf);
                broker_buf.clear();
                while let Some(frame) = broker_frames.next_frame().map_err(PipelineError::from)? {
                    let actions = pipeline.on_broker_frame(frame)?;
                    apply_actions(actions, client_wr, broker_wr).await?;
                }
            }
            _ = sleep_until_deadline(deadline) => {
                pipeline.on_deadline(Instant::now());
            }
            _ = shutdown.recv() => {
                tracing::debug!(connection_id = %pipeline.context().id(), "Shutdown signaled");
                break;
            }
        }
    }
    Ok(())
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn apply_actions(
    actions: Vec<WriteAction>,
    client_wr: &mut OwnedWriteHalf,
    broker_wr: &mut OwnedWriteHalf,
) -> std::io::Result<()> {
    for action in actions {
        match action {
            WriteAction::Upstream(bytes) => broker_wr.write_all(&bytes).await?,
            WriteAction::Downstream(bytes) => client_wr.write_all(&bytes).await?,
        }
    }
    Ok(())
}

/// RAII update of the active-connections gauge.
struct ActiveConnectionGauge;

impl ActiveConnectionGauge {
    fn track() -> Self {
        metrics::gauge!(proxy_metrics::ACTIVE_CONNECTIONS).increment(1.0);
        Self
    }
}

impl Drop for ActiveConnectionGauge {
    fn drop(&mut self) {
        metrics::gauge!(proxy_metrics::ACTIVE_CONNECTIONS).decrement(1.0);
    }
}
