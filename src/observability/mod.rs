//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Engine operations produce:
//!     → tracing events (socket_id, operation, endpoint, outcome)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout) in the CLI
//!     → whatever subscriber/recorder the embedding host installs
//! ```
//!
//! # Design Decisions
//! - The library never installs an exporter
//! - Every handle carries a span with its ID so events correlate per socket

pub mod logging;
pub mod metrics;
