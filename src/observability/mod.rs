//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → admin listener `/metrics` (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request and trace ids are fields on every request log line
//! - Metric updates are cheap; without an installed recorder they are no-ops
//! - The logger is the only process-wide state and is initialized once

pub mod logging;
pub mod metrics;
