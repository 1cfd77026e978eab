//! Metrics collection.
//!
//! # Metrics
//! - `encrypted_api_requests_total` (counter): calls by method, outcome
//! - `encrypted_api_request_duration_seconds` (histogram): call latency by method
//!
//! # Design Decisions
//! - Outcome labels are a small fixed set derived from the error variant
//! - No exporter here; the host application installs a recorder

use std::time::Instant;

use crate::error::{Error, Result};

pub const REQUESTS_TOTAL: &str = "encrypted_api_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "encrypted_api_request_duration_seconds";

/// Record one pipeline call.
pub fn record_request(method: &str, outcome: &'static str, started: Instant) {
    ::metrics::counter!(REQUESTS_TOTAL, "method" => method.to_string(), "outcome" => outcome).increment(1);
    ::metrics::histogram!(REQUEST_DURATION_SECONDS, "method" => method.to_string())
        .record(started.elapsed().as_secs_f64());
}

/// Outcome label for a call result.
pub fn outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(Error::Configuration(_)) => "configuration_error",
        Err(Error::InvalidResponse) => "invalid_response",
        Err(Error::InvalidResponseId { .. }) => "invalid_response_id",
        Err(Error::Crypto(_)) => "crypto_error",
        Err(Error::Transport(_)) => "transport_error",
        Err(_) => "error",
    }
}
