//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline and client produce:
//!     → tracing events (building, sending, validation failures)
//!     → metrics.rs (request counter and latency histogram)
//!
//! Consumers:
//!     → logging.rs (fmt subscriber installed by the CLI)
//!     → whatever metrics recorder the host application installs
//! ```
//!
//! # Design Decisions
//! - The library never installs a subscriber or exporter itself
//! - Secrets are never logged
//! - Metrics are cheap (no-ops without a recorder)

pub mod logging;
pub mod metrics;
