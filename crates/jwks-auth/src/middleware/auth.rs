//! Authentication middleware for protected routes.
//!
//! Extracts the Bearer token from the Authorization header, verifies it,
//! maps the outcome to a decision, and either injects the claims into
//! request extensions or rejects the request.

use crate::auth::decision::{decide, Decision, ReasonCode, StatusHint};
use crate::auth::{Claims, JwtValidator, KeyCache, ValidationPolicy};
use crate::config::{Config, TransientFailureStatus};
use crate::errors::AuthError;
use crate::observability::metrics::record_token_validation;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// JWT validator with its key cache.
    pub jwt_validator: Arc<JwtValidator>,

    /// Status used when a rejection is caused by a transient fault.
    pub transient_failure_status: TransientFailureStatus,
}

impl AuthState {
    pub fn new(
        jwt_validator: Arc<JwtValidator>,
        transient_failure_status: TransientFailureStatus,
    ) -> Self {
        Self {
            jwt_validator,
            transient_failure_status,
        }
    }

    /// Build the full verification stack (HTTP key store client, key cache,
    /// validator) from configuration.
    pub fn from_config(config: &Config) -> Self {
        let key_cache = Arc::new(KeyCache::from_config(config));
        let validator = JwtValidator::new(key_cache, ValidationPolicy::from_config(config));
        Self::new(Arc::new(validator), config.transient_failure_status)
    }

    /// Apply the transient failure policy to a denied decision's hint.
    fn effective_status(&self, status_hint: StatusHint) -> StatusHint {
        match (status_hint, self.transient_failure_status) {
            (StatusHint::ServiceUnavailable, TransientFailureStatus::Unauthorized) => {
                StatusHint::Unauthorized
            }
            (hint, _) => hint,
        }
    }

    /// Claims of an allowed decision, or the client error for a denied one.
    fn admit(&self, decision: Decision) -> Result<Claims, AuthError> {
        match (decision.claims, decision.reason) {
            (Some(claims), None) => Ok(claims),
            (_, Some(reason)) => {
                let status = self.effective_status(decision.status_hint);
                tracing::debug!(
                    target: "auth.middleware",
                    reason = %reason,
                    status = ?status,
                    "Request denied"
                );
                Err(AuthError::from_denial(status, reason))
            }
            (None, None) => {
                tracing::error!(
                    target: "auth.middleware",
                    "Decision carries neither claims nor a reason"
                );
                Err(AuthError::from_denial(
                    StatusHint::Unauthorized,
                    ReasonCode::MalformedToken,
                ))
            }
        }
    }
}

/// Authentication middleware that validates JWT tokens.
///
/// Use with `axum::middleware::from_fn_with_state`.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - Returns 401 Unauthorized with WWW-Authenticate header if the token is
///   missing or rejected
/// - Returns 503 for transient faults when configured to
/// - Continues to next handler with claims in extensions if the token is valid
#[instrument(skip(state, req, next), name = "auth.middleware")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, AuthError> {
    let token = bearer_token(&req)
        .ok_or_else(|| {
            record_token_validation("rejected", Some(ReasonCode::MissingToken));
            AuthError::MissingToken
        })?
        .to_string();

    let decision = decide(state.jwt_validator.verify(&token).await);
    let claims = state.admit(decision)?;

    // Store claims in request extensions for downstream handlers
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Token from an `Authorization: Bearer <token>` header, if present.
///
/// The scheme name is matched case-insensitively.
fn bearer_token(req: &Request) -> Option<&str> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        tracing::debug!(target: "auth.middleware", "Invalid Authorization header format");
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

/// Extension trait for extracting claims from request.
///
/// Provides a convenient method for handlers to get the authenticated claims.
pub trait ClaimsExt {
    /// Get the authenticated claims from request extensions.
    ///
    /// Returns `None` if auth middleware was not applied to this request.
    fn claims(&self) -> Option<&Claims>;
}

impl<B> ClaimsExt for axum::extract::Request<B> {
    fn claims(&self) -> Option<&Claims> {
        self.extensions().get::<Claims>()
    }
}
