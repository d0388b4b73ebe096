//! Metrics collection.
//!
//! # Responsibilities
//! - Define engine metrics (operation outcomes, handshake latency, open sockets)
//! - Record through the `metrics` facade; the host installs any recorder/exporter
//!
//! # Metrics
//! - `etls_operations_total` (counter): operations by `operation`, `outcome`
//! - `etls_handshake_duration_seconds` (histogram): handshake latency by `role`
//! - `etls_open_sockets` (gauge): live socket handles
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op
//! - Outcome label is `ok` or the error category name

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::engine::state::Operation;
use crate::error::ErrorKind;
use crate::tls::Role;

/// Count one finished operation.
pub fn record_operation(operation: Operation, outcome: Result<(), ErrorKind>) {
    let outcome = match outcome {
        Ok(()) => "ok",
        Err(kind) => kind.as_str(),
    };
    counter!(
        "etls_operations_total",
        "operation" => operation.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a completed handshake's latency.
pub fn record_handshake(role: Role, elapsed: Duration) {
    histogram!("etls_handshake_duration_seconds", "role" => role.as_str())
        .record(elapsed.as_secs_f64());
}

pub fn socket_opened() {
    gauge!("etls_open_sockets").increment(1.0);
}

pub fn socket_closed() {
    gauge!("etls_open_sockets").decrement(1.0);
}
