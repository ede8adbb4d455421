//! Protocol-aware Kafka proxy library.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌────────────────────────────────────────────────┐
//!                        │                  KAFKA PROXY                   │
//!                        │                                                │
//!   Client frames        │  ┌─────────┐   ┌──────────┐   ┌────────────┐  │
//!   ─────────────────────┼─▶│   net   │──▶│ protocol │──▶│  pipeline  │  │
//!                        │  │listener │   │  codec   │   │ + filters  │  │
//!                        │  └─────────┘   └──────────┘   └─────┬──────┘  │
//!                        │                                     │         │
//!                        │                                     ▼         │
//!   Client frames        │  ┌─────────┐   ┌──────────┐   ┌────────────┐  │
//!   ◀────────────────────┼──│response │◀──│correlation│◀──│   broker   │◀─┼── Backend
//!                        │  │ rewrite │   │  table   │   │ connection │  │   Broker
//!                        │  └─────────┘   └──────────┘   └────────────┘  │
//!                        │                                                │
//!                        │  ┌──────────────────────────────────────────┐  │
//!                        │  │          Cross-Cutting Concerns           │  │
//!                        │  │  config │ addressing │ observability │    │  │
//!                        │  │            lifecycle                      │  │
//!                        │  └──────────────────────────────────────────┘  │
//!                        └────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod net;
pub mod pipeline;
pub mod protocol;

// Frame processing
pub mod addressing;
pub mod filter;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use lifecycle::Shutdown;
pub use net::server::ProxyServer;
pub use pipeline::{ConnectionContext, ConnectionPipeline, WriteAction};
