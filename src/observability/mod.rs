//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Connection id flows through every per-connection log event
//! - Metric updates are cheap atomic increments on the hot path
//! - The metrics endpoint is optional and bound from configuration

pub mod logging;
pub mod metrics;
