//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → Init observability → Bind listener → Accept
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Connections drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Shutdown is a broadcast: every connection task observes it and rejects
//!   its outstanding originated requests before exiting
//! - A second signal aborts immediately

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
