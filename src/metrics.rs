//! Metric helpers for `grpcwire`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::status::Code;

/// Name of the counter tracking calls handed to a worker.
pub const CALLS_STARTED: &str = "grpcwire_calls_started_total";
/// Name of the gauge tracking calls still running.
pub const CALLS_ACTIVE: &str = "grpcwire_calls_active";
/// Name of the counter tracking framed messages.
pub const MESSAGES_TOTAL: &str = "grpcwire_messages_total";
/// Name of the counter tracking deframing failures.
pub const DEFRAME_ERRORS: &str = "grpcwire_deframe_errors_total";
/// Name of the counter tracking requests rejected before dispatch.
pub const REQUESTS_REJECTED: &str = "grpcwire_requests_rejected_total";
/// Name of the counter tracking panics in call tasks.
pub const CALL_PANICS: &str = "grpcwire_call_panics_total";

/// Direction of message processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Messages deframed from a request body.
    Inbound,
    /// Messages framed into a response.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "used by metric labels"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Record a call handed to a worker and raise the active gauge.
pub fn inc_calls() {
    #[cfg(feature = "metrics")]
    {
        counter!(CALLS_STARTED).increment(1);
        gauge!(CALLS_ACTIVE).increment(1.0);
    }
}

/// Lower the active calls gauge.
pub fn dec_calls() {
    #[cfg(feature = "metrics")]
    gauge!(CALLS_ACTIVE).decrement(1.0);
}

/// Record a message for the given direction.
pub fn inc_messages(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a deframing failure labelled by its status code.
pub fn inc_deframe_errors(code: Code) {
    #[cfg(feature = "metrics")]
    counter!(DEFRAME_ERRORS, "code" => code.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = code;
}

/// Record a request rejected before dispatch.
pub fn inc_rejections(reason: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(REQUESTS_REJECTED, "reason" => reason).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = reason;
}

/// Record a panic caught in a call task.
pub fn inc_call_panics() {
    #[cfg(feature = "metrics")]
    counter!(CALL_PANICS).increment(1);
}
