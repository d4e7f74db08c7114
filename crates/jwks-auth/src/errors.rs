//! Error types for token verification.
//!
//! - [`KeyError`] - signing key resolution failures (cache, rate limit, fetch)
//! - [`Rejection`] - why a token was not authorized
//! - [`AuthError`] - the HTTP-facing error returned by the middleware
//!
//! `AuthError` maps to HTTP responses via its `IntoResponse` impl. Messages
//! returned to clients are intentionally generic; the structured reason code
//! is logged and counted server-side.

use crate::auth::decision::{ReasonCode, StatusHint};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failure to resolve a signing key for a `kid`.
///
/// `Clone` because a single JWKS refresh result is shared by every request
/// waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The key ID is absent from the issuer's key set even after a refresh.
    #[error("key id is not published by the issuer")]
    UnknownKeyId,

    /// The JWKS fetch budget for the current window is exhausted.
    #[error("JWKS fetch rate limit exceeded")]
    RateLimitExceeded,

    /// Network failure, timeout, non-2xx status, or malformed JWKS document.
    #[error("JWKS fetch failed: {0}")]
    Fetch(String),
}

impl KeyError {
    /// Reason code for this failure.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            KeyError::UnknownKeyId => ReasonCode::UnknownKeyId,
            KeyError::RateLimitExceeded => ReasonCode::RateLimitExceeded,
            KeyError::Fetch(_) => ReasonCode::FetchError,
        }
    }
}

/// Why a token was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    /// Wrong segment count, bad base64url, bad JSON, oversized, or no `kid`.
    #[error("token is not a well-formed JWT")]
    MalformedToken,

    /// Header `alg` is unknown or not in the allow-list.
    #[error("token algorithm is not allowed")]
    UnsupportedAlgorithm,

    /// The signing key could not be resolved.
    #[error("signing key could not be resolved: {0}")]
    KeyResolutionFailed(#[from] KeyError),

    /// Signature does not verify with the resolved key.
    #[error("token signature is invalid")]
    InvalidSignature,

    /// `exp` is missing or not in the future.
    #[error("token has expired")]
    TokenExpired,

    /// `nbf` is in the future.
    #[error("token is not yet valid")]
    TokenNotYetValid,

    /// `iss` does not equal the configured issuer.
    #[error("token issuer does not match")]
    IssuerMismatch,

    /// `aud` does not contain the configured audience.
    #[error("token audience does not match")]
    AudienceMismatch,
}

impl Rejection {
    /// Stable reason code for logs and metrics.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            Rejection::MalformedToken => ReasonCode::MalformedToken,
            Rejection::UnsupportedAlgorithm => ReasonCode::UnsupportedAlgorithm,
            Rejection::KeyResolutionFailed(e) => e.reason_code(),
            Rejection::InvalidSignature => ReasonCode::InvalidSignature,
            Rejection::TokenExpired => ReasonCode::TokenExpired,
            Rejection::TokenNotYetValid => ReasonCode::TokenNotYetValid,
            Rejection::IssuerMismatch => ReasonCode::IssuerMismatch,
            Rejection::AudienceMismatch => ReasonCode::AudienceMismatch,
        }
    }

    /// True for infrastructure faults (fetch failure, exhausted fetch budget)
    /// as opposed to problems with the token itself.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Rejection::KeyResolutionFailed(KeyError::RateLimitExceeded | KeyError::Fetch(_))
        )
    }
}

/// HTTP-facing authentication error.
///
/// Maps to HTTP status codes:
/// - MissingToken, InvalidToken: 401 Unauthorized
/// - ServiceUnavailable: 503 Service Unavailable
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing or malformed Authorization header")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(ReasonCode),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(ReasonCode),
}

impl AuthError {
    /// Build the error for a denied decision.
    pub fn from_denial(status_hint: StatusHint, reason: ReasonCode) -> Self {
        match status_hint {
            StatusHint::ServiceUnavailable => AuthError::ServiceUnavailable(reason),
            StatusHint::Ok | StatusHint::Unauthorized => AuthError::InvalidToken(reason),
        }
    }

    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken(_) => 401,
            AuthError::ServiceUnavailable(_) => 503,
        }
    }

    /// Internal reason code. Never sent to the client.
    pub fn reason(&self) -> ReasonCode {
        match self {
            AuthError::MissingToken => ReasonCode::MissingToken,
            AuthError::InvalidToken(reason) | AuthError::ServiceUnavailable(reason) => *reason,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AuthError::MissingToken | AuthError::InvalidToken(_) => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "Invalid token")
            }
            AuthError::ServiceUnavailable(reason) => {
                // Log actual reason server-side
                tracing::warn!(target: "auth.availability", reason = %reason, "Token verification unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable",
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.to_string(),
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer error=\"invalid_token\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}
