//! Metric helpers for `gatewire`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers do nothing.

use std::time::Duration;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge, histogram};

use crate::connection::Direction;

/// Name of the gauge tracking active connections.
pub const CONNECTIONS_ACTIVE: &str = "gatewire_connections_active";
/// Name of the counter tracking frames read or written.
pub const FRAMES_TOTAL: &str = "gatewire_frames_total";
/// Name of the counter tracking inbound frames dropped for exceeding the size limit.
pub const OVERSIZED_FRAMES_TOTAL: &str = "gatewire_oversized_frames_total";
/// Name of the counter tracking connections closed for heartbeat silence.
pub const HEARTBEAT_TIMEOUTS_TOTAL: &str = "gatewire_heartbeat_timeouts_total";
/// Name of the counter tracking recovered pump panics.
pub const PUMP_PANICS_TOTAL: &str = "gatewire_pump_panics_total";
/// Name of the counter tracking backlog checks that found a full queue.
pub const BACKLOG_FULL_TOTAL: &str = "gatewire_backlog_full_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "gatewire_errors_total";
/// Name of the histogram of socket write durations in seconds.
pub const WRITE_DURATION_SECONDS: &str = "gatewire_write_duration_seconds";

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a dropped oversized frame.
pub fn inc_oversized_frames() {
    #[cfg(feature = "metrics")]
    counter!(OVERSIZED_FRAMES_TOTAL).increment(1);
}

/// Record a heartbeat timeout.
pub fn inc_heartbeat_timeouts() {
    #[cfg(feature = "metrics")]
    counter!(HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
}

/// Record a recovered pump panic.
pub fn inc_pump_panics() {
    #[cfg(feature = "metrics")]
    counter!(PUMP_PANICS_TOTAL).increment(1);
}

/// Record a backlog check that found the queue full.
pub fn inc_backlog_full() {
    #[cfg(feature = "metrics")]
    counter!(BACKLOG_FULL_TOTAL).increment(1);
}

/// Record an error occurrence.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL).increment(1);
}

/// Record how long one socket write took.
pub fn record_write_duration(elapsed: Duration) {
    #[cfg(feature = "metrics")]
    histogram!(WRITE_DURATION_SECONDS).record(elapsed.as_secs_f64());
    #[cfg(not(feature = "metrics"))]
    let _ = elapsed;
}
