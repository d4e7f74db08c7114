//! Builder patterns for test tokens
//!
//! Provides a fluent API for creating signed (and deliberately mis-signed)
//! JWTs.

use crate::crypto_fixtures::{TestEd25519Key, TestRsaKey};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Builder for creating test JWTs
///
/// Defaults: subject `test-subject`, issued now, expires in one hour.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new("https://auth.example.com/", "my-api")
///     .for_subject("alice")
///     .with_scope("read write")
///     .expires_in(300)
///     .sign_rs256(&TestRsaKey::primary(), "abc123");
/// ```
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new token builder for `issuer` and a single `audience`.
    pub fn new(issuer: &str, audience: &str) -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!("test-subject"));
        claims.insert("iss".to_string(), json!(issuer));
        claims.insert("aud".to_string(), json!(audience));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(3600)).timestamp()),
        );
        Self { claims }
    }

    /// Set the subject
    pub fn for_subject(self, subject: &str) -> Self {
        self.with_claim("sub", json!(subject))
    }

    /// Replace `aud` with an array
    pub fn with_audiences(self, audiences: &[&str]) -> Self {
        self.with_claim("aud", json!(audiences))
    }

    /// Set the scope (space-separated)
    pub fn with_scope(self, scope: &str) -> Self {
        self.with_claim("scope", json!(scope))
    }

    /// Set expiration in seconds from now (negative for the past)
    pub fn expires_in(self, seconds: i64) -> Self {
        self.expires_at((Utc::now() + Duration::seconds(seconds)).timestamp())
    }

    /// Set an absolute expiration timestamp
    pub fn expires_at(self, timestamp: i64) -> Self {
        self.with_claim("exp", json!(timestamp))
    }

    /// Remove the `exp` claim
    pub fn without_exp(mut self) -> Self {
        self.claims.remove("exp");
        self
    }

    /// Set the not-before timestamp
    pub fn not_before(self, timestamp: i64) -> Self {
        self.with_claim("nbf", json!(timestamp))
    }

    /// Set any claim, replacing an existing value
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(&self) -> Value {
        Value::Object(self.claims.clone())
    }

    /// Sign with an RSA key using `alg`, with an optional `kid` header
    pub fn sign_rsa(&self, key: &TestRsaKey, alg: Algorithm, kid: Option<&str>) -> String {
        self.sign_with(alg, kid, &key.encoding_key())
    }

    /// Sign with RS256 and the given `kid`
    pub fn sign_rs256(&self, key: &TestRsaKey, kid: &str) -> String {
        self.sign_rsa(key, Algorithm::RS256, Some(kid))
    }

    /// Sign with RS256 and no `kid` header
    pub fn sign_rs256_without_kid(&self, key: &TestRsaKey) -> String {
        self.sign_rsa(key, Algorithm::RS256, None)
    }

    /// Sign with EdDSA and the given `kid`
    pub fn sign_eddsa(&self, key: &TestEd25519Key, kid: &str) -> String {
        self.sign_with(Algorithm::EdDSA, Some(kid), &key.encoding_key())
    }

    /// Sign with HS256 using a shared secret (algorithm confusion tests)
    pub fn sign_hs256(&self, secret: &[u8], kid: &str) -> String {
        self.sign_with(Algorithm::HS256, Some(kid), &EncodingKey::from_secret(secret))
    }

    /// Unsigned token with `alg: none` and an empty signature segment
    pub fn unsigned(&self, kid: &str) -> String {
        let header = json!({ "alg": "none", "typ": "JWT", "kid": kid });
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(self.build().to_string())
        )
    }

    fn sign_with(&self, alg: Algorithm, kid: Option<&str>, key: &EncodingKey) -> String {
        let mut header = Header::new(alg);
        header.typ = Some("JWT".to_string());
        header.kid = kid.map(str::to_string);

        encode(&header, &self.claims, key).expect("Failed to sign test token")
    }
}
