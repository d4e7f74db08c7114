//! JWT verification against keys resolved from the issuer's JWKS.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The header `alg` is checked against an allow-list before any key is
//!   resolved, so `none` and HMAC algorithms are never accepted when only
//!   asymmetric algorithms are configured
//! - A JWK that declares an algorithm is only used with that algorithm
//! - Claims are validated only after the signature has been verified

use crate::auth::claims::Claims;
use crate::auth::decision::Outcome;
use crate::auth::key_cache::KeyCache;
use crate::config::Config;
use crate::errors::Rejection;
use crate::observability::metrics::record_token_validation;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical tokens are well under 1KB; anything larger is rejected before
/// base64 decoding or signature verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// What a token must satisfy besides a valid signature.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    /// Exact expected `iss`.
    pub issuer: String,
    /// Audience that `aud` must equal or contain.
    pub audience: String,
    /// Accepted header algorithms.
    pub allowed_algorithms: Vec<Algorithm>,
    /// Tolerance applied to `exp` and `nbf`.
    pub clock_skew: Duration,
}

impl ValidationPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            issuer: config.issuer(),
            audience: config.audience.clone(),
            allowed_algorithms: config.allowed_algorithms.clone(),
            clock_skew: config.clock_skew,
        }
    }
}

/// Parsed JWT header fields needed before verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: String,
    pub kid: Option<String>,
}

/// JWT validator using keys from the [`KeyCache`].
pub struct JwtValidator {
    key_cache: Arc<KeyCache>,
    policy: ValidationPolicy,
}

impl JwtValidator {
    /// Create a new JWT validator.
    ///
    /// # Arguments
    ///
    /// * `key_cache` - Shared cache that resolves signing keys by `kid`
    /// * `policy` - Issuer, audience, algorithm and clock skew requirements
    pub fn new(key_cache: Arc<KeyCache>, policy: ValidationPolicy) -> Self {
        Self { key_cache, policy }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Verify a token and return the outcome.
    pub async fn verify(&self, token: &str) -> Outcome {
        Outcome::from(self.validate(token).await)
    }

    /// Validate a JWT and return its claims.
    ///
    /// # Checks, in order
    ///
    /// 1. Size and structure (three base64url segments, JSON header)
    /// 2. Header `alg` is allow-listed; header has a `kid`
    /// 3. Signing key resolved by `kid`
    /// 4. Signature verifies with that key and algorithm
    /// 5. `exp`, `nbf`, `iss`, `aud`
    ///
    /// # Errors
    ///
    /// Returns the first failing check as a [`Rejection`].
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<Claims, Rejection> {
        let result = self.validate_inner(token).await;

        match &result {
            Ok(_) => {
                tracing::debug!(target: "auth.jwt", "Token validated successfully");
                record_token_validation("success", None);
            }
            Err(rejection) => {
                tracing::debug!(
                    target: "auth.jwt",
                    reason = %rejection.reason_code(),
                    "Token rejected"
                );
                record_token_validation("rejected", Some(rejection.reason_code()));
            }
        }

        result
    }

    async fn validate_inner(&self, token: &str) -> Result<Claims, Rejection> {
        // 1. Structure
        let header = parse_token(token)?;

        // 2. Algorithm allow-list, then kid
        let alg = allowed_algorithm(&header.alg, &self.policy.allowed_algorithms)?;
        let kid = header.kid.ok_or_else(|| {
            tracing::debug!(target: "auth.jwt", "Token header missing kid");
            Rejection::MalformedToken
        })?;

        // 3. Key resolution
        let key = self.key_cache.resolve_key(&kid).await?;

        if let Some(key_alg) = key.algorithm() {
            if key_alg != alg {
                tracing::warn!(
                    target: "auth.jwt",
                    kid = %kid,
                    key_alg = ?key_alg,
                    token_alg = ?alg,
                    "Token algorithm does not match JWK algorithm"
                );
                return Err(Rejection::InvalidSignature);
            }
        }

        // 4. Signature
        let claims = verify_signature(token, key.decoding_key(), alg)?;

        // 5. Claims
        let now = chrono::Utc::now().timestamp();
        validate_claims(&claims, &self.policy, now)?;

        Ok(claims)
    }
}

/// Split a token into its segments and decode the header.
///
/// The signature segment may be empty (unsigned `alg: none` tokens are
/// rejected by the algorithm check, not here).
pub fn parse_token(token: &str) -> Result<TokenHeader, Rejection> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "auth.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(Rejection::MalformedToken);
    }

    // JWT format: header.payload.signature
    let mut parts = token.split('.');
    let (Some(header_part), Some(payload_part), Some(signature_part), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "auth.jwt", "Token rejected: invalid JWT format");
        return Err(Rejection::MalformedToken);
    };

    if header_part.is_empty() || payload_part.is_empty() {
        return Err(Rejection::MalformedToken);
    }

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "auth.jwt", error = %e, "Failed to decode JWT header base64");
        Rejection::MalformedToken
    })?;

    if URL_SAFE_NO_PAD.decode(payload_part).is_err()
        || URL_SAFE_NO_PAD.decode(signature_part).is_err()
    {
        tracing::debug!(target: "auth.jwt", "Failed to decode JWT payload or signature base64");
        return Err(Rejection::MalformedToken);
    }

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "auth.jwt", error = %e, "Failed to parse JWT header JSON");
        Rejection::MalformedToken
    })?;

    let alg = header
        .get("alg")
        .and_then(|v| v.as_str())
        .ok_or(Rejection::MalformedToken)?
        .to_string();

    // Extract kid as string, rejecting empty values
    let kid = match header.get("kid") {
        None => None,
        Some(value) => Some(
            value
                .as_str()
                .filter(|s| !s.is_empty())
                .ok_or(Rejection::MalformedToken)?
                .to_string(),
        ),
    };

    Ok(TokenHeader { alg, kid })
}

/// Map the header `alg` to an allow-listed algorithm.
pub fn allowed_algorithm(alg: &str, allowed: &[Algorithm]) -> Result<Algorithm, Rejection> {
    let algorithm = Algorithm::from_str(alg).map_err(|_| {
        tracing::debug!(target: "auth.jwt", alg = %alg, "Token rejected: unknown algorithm");
        Rejection::UnsupportedAlgorithm
    })?;

    if !allowed.contains(&algorithm) {
        tracing::debug!(target: "auth.jwt", alg = %alg, "Token rejected: algorithm not allowed");
        return Err(Rejection::UnsupportedAlgorithm);
    }

    Ok(algorithm)
}

/// Verify the signature and decode the payload.
///
/// Registered claims are not checked here; [`validate_claims`] owns that so
/// the expiry boundary is pinned in one place.
fn verify_signature(
    token: &str,
    key: &jsonwebtoken::DecodingKey,
    alg: Algorithm,
) -> Result<Claims, Rejection> {
    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let token_data = decode::<serde_json::Value>(token, key, &validation).map_err(|e| {
        tracing::debug!(target: "auth.jwt", error = %e, "Token verification failed");
        match e.kind() {
            ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) | ErrorKind::InvalidToken => {
                Rejection::MalformedToken
            }
            _ => Rejection::InvalidSignature,
        }
    })?;

    serde_json::from_value(token_data.claims).map_err(|e| {
        tracing::debug!(target: "auth.jwt", error = %e, "Token claims have unexpected types");
        Rejection::MalformedToken
    })
}

/// Validate registered claims against `policy` at time `now` (Unix seconds).
///
/// Expiry policy: a token is expired once `exp + clock_skew <= now`, so with
/// zero skew a token whose `exp` equals `now` is already expired. A token
/// without `exp` is treated as expired.
pub fn validate_claims(
    claims: &Claims,
    policy: &ValidationPolicy,
    now: i64,
) -> Result<(), Rejection> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds) by config
    #[allow(clippy::cast_possible_wrap)]
    let skew = policy.clock_skew.as_secs() as i64;

    let exp = claims.exp.ok_or_else(|| {
        tracing::debug!(target: "auth.jwt", "Token rejected: missing exp");
        Rejection::TokenExpired
    })?;
    if exp.saturating_add(skew) <= now {
        tracing::debug!(target: "auth.jwt", exp = exp, now = now, "Token rejected: expired");
        return Err(Rejection::TokenExpired);
    }

    if let Some(nbf) = claims.nbf {
        if nbf.saturating_sub(skew) > now {
            tracing::debug!(target: "auth.jwt", nbf = nbf, now = now, "Token rejected: not yet valid");
            return Err(Rejection::TokenNotYetValid);
        }
    }

    if claims.iss.as_deref() != Some(policy.issuer.as_str()) {
        tracing::debug!(target: "auth.jwt", iss = ?claims.iss, "Token rejected: issuer mismatch");
        return Err(Rejection::IssuerMismatch);
    }

    if !claims.has_audience(&policy.audience) {
        tracing::debug!(target: "auth.jwt", aud = ?claims.aud, "Token rejected: audience mismatch");
        return Err(Rejection::AudienceMismatch);
    }

    Ok(())
}
