//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to the accept loop and every connection
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All sections have defaults so a minimal config is valid
//! - Validation separates syntactic (serde) from semantic checks and runs
//!   before any traffic is accepted, never per-frame

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::FilterDefinition;
pub use schema::ListenerConfig;
pub use schema::ProxyConfig;
pub use schema::UpstreamConfig;
