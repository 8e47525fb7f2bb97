//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Server + client produce:
//!     → logging.rs (structured log events, per-call spans)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Call ID (UUID v4) attached to every dispatch span
//! - Metrics are cheap (atomic increments) and no-ops without a recorder

pub mod logging;
pub mod metrics;
