//! Metrics definitions for JWKS token verification.
//!
//! All metrics follow Prometheus naming conventions:
//! - `jwks_auth_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `status`: 2 values (success, error)
//! - `result`: 3 values for cache lookups (hit, miss, coalesced), 2 for
//!   validations (success, rejected)
//! - `decision`: 2 values (allowed, rejected)
//! - `reason`: bounded by [`ReasonCode`] variants
//!
//! Key IDs, subjects and issuer URLs are never used as labels.

use crate::auth::decision::ReasonCode;
use metrics::{counter, histogram};
use std::time::Duration;

/// Record a JWKS fetch.
///
/// Metric: `jwks_auth_jwks_fetch_total`, `jwks_auth_jwks_fetch_duration_seconds`
/// Labels: `status`
pub fn record_jwks_fetch(status: &str, duration: Duration) {
    histogram!("jwks_auth_jwks_fetch_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("jwks_auth_jwks_fetch_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a key cache lookup.
///
/// Metric: `jwks_auth_key_cache_total`
/// Labels: `result` (hit, miss, coalesced)
///
/// `coalesced` counts misses that joined a refresh already in flight.
pub fn record_key_cache_lookup(result: &str) {
    counter!("jwks_auth_key_cache_total",
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record a fetch budget decision.
///
/// Metric: `jwks_auth_jwks_rate_limit_total`
/// Labels: `decision` (allowed, rejected)
pub fn record_rate_limit_decision(decision: &str) {
    counter!("jwks_auth_jwks_rate_limit_total",
        "decision" => decision.to_string()
    )
    .increment(1);
}

/// Record a token validation result.
///
/// Metric: `jwks_auth_token_validations_total`
/// Labels: `result` (success, rejected), `reason` (reason code or `none`)
pub fn record_token_validation(result: &str, reason: Option<ReasonCode>) {
    counter!("jwks_auth_token_validations_total",
        "result" => result.to_string(),
        "reason" => reason.map_or("none", |r| r.as_str()).to_string()
    )
    .increment(1);
}
