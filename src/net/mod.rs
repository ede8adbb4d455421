//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → server.rs (spawn one task per connection pair)
//!     → connection.rs (broker connect, frame read loop, pipeline dispatch)
//!
//! Per connection pair:
//!     client reads → pipeline.on_client_frame → broker writes
//!     broker reads → pipeline.on_broker_frame → client writes
//!     deadline tick → pipeline.on_deadline
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - One task owns both sockets and all pipeline state for its connection
//! - Protocol errors close the pair; request-local errors do not

pub mod connection;
pub mod listener;
pub mod server;
