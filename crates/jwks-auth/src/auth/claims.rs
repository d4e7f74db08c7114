//! JWT claims structure.
//!
//! Contains the claims extracted from verified tokens. The `sub` field is
//! redacted in Debug output to prevent exposure in logs. Claims are never
//! modified after extraction.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// The `aud` claim, which may be a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// True if `audience` equals the single value or is one of the values.
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(value) => value == audience,
            Audience::Multiple(values) => values.iter().any(|v| v == audience),
        }
    }
}

/// Claims of a verified token.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Expiration timestamp (Unix epoch seconds).
    #[serde(
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<i64>,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub nbf: Option<i64>,

    /// Any other claims, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Deserialize a NumericDate, which may be an integer or a fractional
/// number of seconds. Fractions are floored to whole seconds.
fn numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let Some(number) = Option::<serde_json::Number>::deserialize(deserializer)? else {
        return Ok(None);
    };

    if let Some(seconds) = number.as_i64() {
        return Ok(Some(seconds));
    }

    // Safe casts: the range is checked before converting
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let floored = number
        .as_f64()
        .filter(|s| s.is_finite() && *s >= i64::MIN as f64 && *s < i64::MAX as f64)
        .map(|s| s.floor() as i64);

    floored
        .map(Some)
        .ok_or_else(|| D::Error::custom(format!("NumericDate out of range: {}", number)))
}

/// Custom Debug implementation that redacts the `sub` field and omits
/// custom claim values.
impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Claims {
    /// True if the `aud` claim equals or contains `audience`.
    pub fn has_audience(&self, audience: &str) -> bool {
        self.aud.as_ref().is_some_and(|aud| aud.contains(audience))
    }

    /// Look up a custom claim by name.
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }

    /// Space-separated `scope` claim as a list, empty if absent.
    pub fn scopes(&self) -> Vec<&str> {
        self.get("scope")
            .and_then(serde_json::Value::as_str)
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Check if the token has a specific scope.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().contains(&scope)
    }
}
