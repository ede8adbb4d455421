//! Kafka wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Raw TCP bytes
//!     → codec.rs (length-prefixed frame splitting)
//!     → wire.rs (primitive reads: i16/i32/string/bytes/arrays)
//!     → frame.rs (RequestFrame / ResponseFrame, decoded or opaque body)
//!     → Hand off to the filter pipeline
//! ```
//!
//! # Design Decisions
//! - Headers are always decoded (routing needs the correlation id and api key)
//! - Bodies are decoded only when some filter declared interest; otherwise the
//!   original frame bytes are forwarded untouched
//! - Schema coverage is a versioned table; encoding a body with no known
//!   schema is an explicit error, never a silent truncation

pub mod codec;
pub mod frame;
pub mod wire;

pub use codec::FrameDecoder;
pub use frame::{ApiBody, ApiKey, FrameBody, RequestFrame, RequestHeader, ResponseFrame, ResponseHeader};

use thiserror::Error;

/// Errors surfaced by the codec boundary.
///
/// Both variants are connection-fatal: continued processing after a framing
/// or schema failure risks misrouting correlated traffic.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame header or length prefix is inconsistent with the bytes seen.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// No schema is known for this (api key, version, direction) combination.
    #[error("no schema for {api_key} v{api_version}")]
    UnsupportedVersion { api_key: ApiKey, api_version: i16 },
}
