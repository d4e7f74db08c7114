//! JWKS client for fetching public keys from the issuer.
//!
//! The JWKS (JSON Web Key Set) client fetches the issuer's
//! `/.well-known/jwks.json` document and turns it into a [`KeySet`] of
//! verification keys indexed by `kid`. It performs exactly one HTTP GET per
//! call and never retries; caching and rate limiting live in
//! [`KeyCache`](crate::auth::key_cache::KeyCache).
//!
//! # Security
//!
//! - Fetches are bounded by a timeout
//! - Entries that are not signing keys or cannot be decoded are skipped
//! - HTTPS should be used in production (the default URI is always HTTPS)

use crate::errors::KeyError;
use crate::observability::metrics::record_jwks_fetch;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::instrument;

/// JSON Web Key from a JWKS endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is intended for.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name for EC/OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Why a JWK could not be turned into a verification key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyMaterialError {
    #[error("missing kid")]
    MissingKid,

    #[error("key use '{0}' is not 'sig'")]
    NotSigningKey(String),

    #[error("unsupported key type '{0}'")]
    UnsupportedKeyType(String),

    #[error("unsupported algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("missing key parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("invalid key material: {0}")]
    InvalidMaterial(String),
}

/// A verification key resolved from a JWK.
#[derive(Clone)]
pub struct PublicKey {
    kid: String,
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl PublicKey {
    /// Build a verification key from a JWK.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyMaterialError> {
        let kid = jwk
            .kid
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(KeyMaterialError::MissingKid)?
            .to_string();

        if let Some(key_use) = &jwk.key_use {
            if key_use != "sig" {
                return Err(KeyMaterialError::NotSigningKey(key_use.clone()));
            }
        }

        let algorithm = jwk
            .alg
            .as_deref()
            .map(|alg| {
                Algorithm::from_str(alg)
                    .map_err(|_| KeyMaterialError::UnsupportedAlgorithm(alg.to_string()))
            })
            .transpose()?;

        let decoding_key = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref().ok_or(KeyMaterialError::MissingParameter("n"))?;
                let e = jwk.e.as_deref().ok_or(KeyMaterialError::MissingParameter("e"))?;
                DecodingKey::from_rsa_components(n, e)
            }
            "EC" => {
                let x = jwk.x.as_deref().ok_or(KeyMaterialError::MissingParameter("x"))?;
                let y = jwk.y.as_deref().ok_or(KeyMaterialError::MissingParameter("y"))?;
                DecodingKey::from_ec_components(x, y)
            }
            "OKP" => {
                if jwk.crv.as_deref() != Some("Ed25519") {
                    return Err(KeyMaterialError::UnsupportedKeyType(format!(
                        "OKP/{}",
                        jwk.crv.as_deref().unwrap_or("?")
                    )));
                }
                let x = jwk.x.as_deref().ok_or(KeyMaterialError::MissingParameter("x"))?;
                DecodingKey::from_ed_components(x)
            }
            other => return Err(KeyMaterialError::UnsupportedKeyType(other.to_string())),
        }
        .map_err(|e| KeyMaterialError::InvalidMaterial(e.to_string()))?;

        Ok(Self {
            kid,
            algorithm,
            decoding_key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm declared by the JWK, if any.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Verification keys from one JWKS document, indexed by `kid`.
///
/// Immutable once built; a later fetch produces a new set that supersedes
/// this one wholesale.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, Arc<PublicKey>>,
}

impl KeySet {
    /// Build a key set from a JWKS document, skipping unusable entries.
    ///
    /// If a `kid` appears more than once, the first usable entry wins.
    pub fn from_jwks(jwks: &JwksResponse) -> Self {
        let mut keys = HashMap::with_capacity(jwks.keys.len());

        for jwk in &jwks.keys {
            match PublicKey::from_jwk(jwk) {
                Ok(key) => {
                    if keys.contains_key(key.kid()) {
                        tracing::warn!(target: "auth.jwks", kid = %key.kid(), "Duplicate kid in JWKS, keeping first");
                        continue;
                    }
                    keys.insert(key.kid().to_string(), Arc::new(key));
                }
                Err(e) => {
                    tracing::warn!(
                        target: "auth.jwks",
                        kid = ?jwk.kid,
                        kty = %jwk.kty,
                        error = %e,
                        "Skipping unusable JWK"
                    );
                }
            }
        }

        Self { keys }
    }

    pub fn get(&self, kid: &str) -> Option<Arc<PublicKey>> {
        self.keys.get(kid).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<PublicKey>)> {
        self.keys.iter().map(|(kid, key)| (kid.as_str(), key))
    }
}

/// Source of JWKS documents.
///
/// Implemented by [`JwksClient`]; tests substitute counting or failing
/// sources.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Fetch the complete current key set.
    async fn fetch_key_set(&self) -> Result<KeySet, KeyError>;
}

/// HTTP JWKS client.
pub struct JwksClient {
    /// URL to the JWKS endpoint.
    jwks_uri: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,

    /// Upper bound for one fetch, also set on every request.
    timeout: Duration,
}

impl JwksClient {
    /// Create a new JWKS client.
    ///
    /// # Arguments
    ///
    /// * `jwks_uri` - URL of the issuer's JWKS endpoint
    /// * `timeout` - Upper bound for one fetch, connection included
    pub fn new(jwks_uri: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_uri,
            http_client,
            timeout,
        }
    }

    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch and parse the JWKS document.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::Fetch` on network failure, timeout, non-2xx status,
    /// or a body that is not a JWKS document.
    #[instrument(skip(self), fields(jwks_uri = %self.jwks_uri))]
    pub async fn fetch(&self) -> Result<KeySet, KeyError> {
        let start = Instant::now();
        let result = self.fetch_inner().await;
        record_jwks_fetch(
            if result.is_ok() { "success" } else { "error" },
            start.elapsed(),
        );
        result
    }

    async fn fetch_inner(&self) -> Result<KeySet, KeyError> {
        tracing::debug!(target: "auth.jwks", "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_uri)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "auth.jwks", error = %e, timeout = e.is_timeout(), "Failed to fetch JWKS");
                KeyError::Fetch(if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    "request failed".to_string()
                })
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(target: "auth.jwks", status = %status, "JWKS endpoint returned error");
            return Err(KeyError::Fetch(format!("unexpected status {}", status.as_u16())));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "auth.jwks", error = %e, "Failed to parse JWKS response");
            KeyError::Fetch("malformed JWKS document".to_string())
        })?;

        let key_set = KeySet::from_jwks(&jwks);

        tracing::info!(
            target: "auth.jwks",
            published = jwks.keys.len(),
            usable = key_set.len(),
            "JWKS fetched"
        );

        Ok(key_set)
    }
}

#[async_trait]
impl KeySetSource for JwksClient {
    async fn fetch_key_set(&self) -> Result<KeySet, KeyError> {
        self.fetch().await
    }
}
