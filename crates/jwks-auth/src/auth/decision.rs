//! Authorization decisions.
//!
//! Pure mapping from a verification [`Outcome`] to an allow/deny
//! [`Decision`] with a stable reason code and a status hint. No I/O.

use crate::auth::claims::Claims;
use crate::errors::Rejection;
use std::fmt;

/// Result of verifying one token. Created per request, never persisted.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Token verified; carries the read-only claim set.
    Authorized(Claims),
    /// Token rejected.
    Rejected(Rejection),
}

impl From<Result<Claims, Rejection>> for Outcome {
    fn from(result: Result<Claims, Rejection>) -> Self {
        match result {
            Ok(claims) => Outcome::Authorized(claims),
            Err(rejection) => Outcome::Rejected(rejection),
        }
    }
}

/// Stable, bounded reason codes for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    MissingToken,
    MalformedToken,
    UnsupportedAlgorithm,
    UnknownKeyId,
    RateLimitExceeded,
    FetchError,
    InvalidSignature,
    TokenExpired,
    TokenNotYetValid,
    IssuerMismatch,
    AudienceMismatch,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::MissingToken => "missing_token",
            ReasonCode::MalformedToken => "malformed_token",
            ReasonCode::UnsupportedAlgorithm => "unsupported_algorithm",
            ReasonCode::UnknownKeyId => "unknown_key_id",
            ReasonCode::RateLimitExceeded => "rate_limit_exceeded",
            ReasonCode::FetchError => "fetch_error",
            ReasonCode::InvalidSignature => "invalid_signature",
            ReasonCode::TokenExpired => "token_expired",
            ReasonCode::TokenNotYetValid => "token_not_yet_valid",
            ReasonCode::IssuerMismatch => "issuer_mismatch",
            ReasonCode::AudienceMismatch => "audience_mismatch",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suggested response class for a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusHint {
    /// Authorized; continue processing.
    Ok,
    /// Client fault: the token itself is unacceptable.
    Unauthorized,
    /// Transient infrastructure fault: fetch failure or exhausted fetch budget.
    ServiceUnavailable,
}

/// Allow/deny decision consumed by the request-handling layer.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allow: bool,
    pub status_hint: StatusHint,
    /// `None` when allowed.
    pub reason: Option<ReasonCode>,
    /// Present only when allowed.
    pub claims: Option<Claims>,
}

/// Map a verification outcome to a decision.
pub fn decide(outcome: Outcome) -> Decision {
    match outcome {
        Outcome::Authorized(claims) => Decision {
            allow: true,
            status_hint: StatusHint::Ok,
            reason: None,
            claims: Some(claims),
        },
        Outcome::Rejected(rejection) => Decision {
            allow: false,
            status_hint: if rejection.is_transient() {
                StatusHint::ServiceUnavailable
            } else {
                StatusHint::Unauthorized
            },
            reason: Some(rejection.reason_code()),
            claims: None,
        },
    }
}
