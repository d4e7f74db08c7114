//! Verifier configuration.
//!
//! `Config` is an explicit struct constructed once by the host process and
//! passed into the key cache and validator constructors. The verification
//! core never reads the environment itself; [`Config::from_env`] exists only
//! as a convenience for the embedding process.

use jsonwebtoken::Algorithm;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default JWKS fetch budget per window (requests per minute).
pub const DEFAULT_JWKS_REQUESTS_PER_MINUTE: u32 = 5;

/// Maximum JWKS fetch budget per window.
///
/// The issuer's key set changes rarely; a larger budget only amplifies
/// unknown-`kid` floods onto the JWKS endpoint.
pub const MAX_JWKS_REQUESTS_PER_MINUTE: u32 = 1000;

/// Default rolling window for the JWKS fetch budget.
pub const DEFAULT_JWKS_FETCH_WINDOW: Duration = Duration::from_secs(60);

/// Default timeout for a single JWKS fetch.
pub const DEFAULT_JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default clock skew tolerance for `exp`/`nbf` checks.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(0);

/// Maximum allowed clock skew tolerance (10 minutes).
///
/// Prevents misconfiguration that would keep expired tokens usable for long.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// Path of the JWKS document relative to the issuer.
pub const JWKS_WELL_KNOWN_PATH: &str = ".well-known/jwks.json";

/// HTTP status used when a rejection is caused by a transient fault
/// (JWKS fetch failure or exhausted fetch budget).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransientFailureStatus {
    /// Report transient faults as 401, like any other rejection.
    #[default]
    Unauthorized,
    /// Report transient faults as 503 so clients can retry later.
    ServiceUnavailable,
}

impl FromStr for TransientFailureStatus {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unauthorized" | "401" => Ok(Self::Unauthorized),
            "unavailable" | "service_unavailable" | "503" => Ok(Self::ServiceUnavailable),
            other => Err(ConfigError::InvalidTransientFailureStatus(format!(
                "expected 'unauthorized' or 'unavailable', got '{}'",
                other
            ))),
        }
    }
}

/// Verifier configuration.
#[derive(Clone)]
pub struct Config {
    /// Issuer domain, e.g. `auth.example.com`.
    pub issuer_domain: String,

    /// Audience every accepted token must carry.
    pub audience: String,

    /// Signing algorithms accepted in token headers (default: RS256 only).
    pub allowed_algorithms: Vec<Algorithm>,

    /// Maximum number of JWKS fetches per `jwks_fetch_window`.
    pub jwks_fetch_rate_limit: u32,

    /// Rolling window for `jwks_fetch_rate_limit`.
    pub jwks_fetch_window: Duration,

    /// Whether resolved keys are retained between requests.
    pub cache_enabled: bool,

    /// Optional maximum age of cached keys. `None` keeps keys until the next
    /// refresh or an explicit invalidation.
    pub key_ttl: Option<Duration>,

    /// Timeout for a single JWKS fetch.
    pub jwks_fetch_timeout: Duration,

    /// Clock skew tolerance for `exp` and `nbf`.
    pub clock_skew: Duration,

    /// Status reported for transient (infrastructure) rejections.
    pub transient_failure_status: TransientFailureStatus,

    /// Explicit JWKS location, replacing `{issuer}.well-known/jwks.json`.
    pub jwks_uri_override: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("issuer_domain", &self.issuer_domain)
            .field("audience", &self.audience)
            .field("allowed_algorithms", &self.allowed_algorithms)
            .field("jwks_fetch_rate_limit", &self.jwks_fetch_rate_limit)
            .field("jwks_fetch_window", &self.jwks_fetch_window)
            .field("cache_enabled", &self.cache_enabled)
            .field("key_ttl", &self.key_ttl)
            .field("jwks_fetch_timeout", &self.jwks_fetch_timeout)
            .field("clock_skew", &self.clock_skew)
            .field("transient_failure_status", &self.transient_failure_status)
            .field("jwks_uri", &self.jwks_uri())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid issuer domain: {0}")]
    InvalidIssuerDomain(String),

    #[error("Invalid allowed algorithms: {0}")]
    InvalidAlgorithms(String),

    #[error("Invalid JWKS rate limit configuration: {0}")]
    InvalidRateLimit(String),

    #[error("Invalid JWKS cache configuration: {0}")]
    InvalidCache(String),

    #[error("Invalid JWKS fetch timeout configuration: {0}")]
    InvalidFetchTimeout(String),

    #[error("Invalid clock skew configuration: {0}")]
    InvalidClockSkew(String),

    #[error("Invalid transient failure status: {0}")]
    InvalidTransientFailureStatus(String),
}

impl Config {
    /// Create a configuration with defaults for everything except the
    /// issuer domain and audience.
    pub fn new(issuer_domain: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer_domain: issuer_domain.into(),
            audience: audience.into(),
            allowed_algorithms: vec![Algorithm::RS256],
            jwks_fetch_rate_limit: DEFAULT_JWKS_REQUESTS_PER_MINUTE,
            jwks_fetch_window: DEFAULT_JWKS_FETCH_WINDOW,
            cache_enabled: true,
            key_ttl: None,
            jwks_fetch_timeout: DEFAULT_JWKS_FETCH_TIMEOUT,
            clock_skew: DEFAULT_CLOCK_SKEW,
            transient_failure_status: TransientFailureStatus::default(),
            jwks_uri_override: None,
        }
    }

    /// Expected `iss` claim: `https://{issuer_domain}/`.
    pub fn issuer(&self) -> String {
        format!("https://{}/", self.issuer_domain)
    }

    /// JWKS endpoint: `{issuer}.well-known/jwks.json` unless overridden.
    pub fn jwks_uri(&self) -> String {
        match &self.jwks_uri_override {
            Some(uri) => uri.clone(),
            None => format!("{}{}", self.issuer(), JWKS_WELL_KNOWN_PATH),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing and explicit wiring).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let issuer_domain = vars
            .get("AUTH_ISSUER_DOMAIN")
            .ok_or_else(|| ConfigError::MissingEnvVar("AUTH_ISSUER_DOMAIN".to_string()))?
            .trim()
            .trim_end_matches('/')
            .to_string();

        if issuer_domain.is_empty() || issuer_domain.contains("://") {
            return Err(ConfigError::InvalidIssuerDomain(format!(
                "AUTH_ISSUER_DOMAIN must be a bare host name, got '{}'",
                issuer_domain
            )));
        }

        let audience = vars
            .get("AUTH_AUDIENCE")
            .ok_or_else(|| ConfigError::MissingEnvVar("AUTH_AUDIENCE".to_string()))?
            .clone();

        let mut config = Self::new(issuer_domain, audience);

        if let Some(value_str) = vars.get("AUTH_ALLOWED_ALGORITHMS") {
            config.allowed_algorithms = parse_algorithms(value_str)?;
        }

        if let Some(value_str) = vars.get("AUTH_JWKS_REQUESTS_PER_MINUTE") {
            let value: u32 = value_str.parse().map_err(|e| {
                ConfigError::InvalidRateLimit(format!(
                    "AUTH_JWKS_REQUESTS_PER_MINUTE must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidRateLimit(
                    "AUTH_JWKS_REQUESTS_PER_MINUTE must be positive".to_string(),
                ));
            }

            if value > MAX_JWKS_REQUESTS_PER_MINUTE {
                return Err(ConfigError::InvalidRateLimit(format!(
                    "AUTH_JWKS_REQUESTS_PER_MINUTE must be at most {}, got {}",
                    MAX_JWKS_REQUESTS_PER_MINUTE, value
                )));
            }

            config.jwks_fetch_rate_limit = value;
        }

        if let Some(value_str) = vars.get("AUTH_JWKS_CACHE_ENABLED") {
            config.cache_enabled = match value_str.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                other => {
                    return Err(ConfigError::InvalidCache(format!(
                        "AUTH_JWKS_CACHE_ENABLED must be a boolean, got '{}'",
                        other
                    )))
                }
            };
        }

        if let Some(value_str) = vars.get("AUTH_JWKS_CACHE_TTL_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidCache(format!(
                    "AUTH_JWKS_CACHE_TTL_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidCache(
                    "AUTH_JWKS_CACHE_TTL_SECONDS must be positive".to_string(),
                ));
            }

            config.key_ttl = Some(Duration::from_secs(value));
        }

        if let Some(value_str) = vars.get("AUTH_JWKS_FETCH_TIMEOUT_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidFetchTimeout(format!(
                    "AUTH_JWKS_FETCH_TIMEOUT_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidFetchTimeout(
                    "AUTH_JWKS_FETCH_TIMEOUT_SECONDS must be positive".to_string(),
                ));
            }

            config.jwks_fetch_timeout = Duration::from_secs(value);
        }

        if let Some(value_str) = vars.get("AUTH_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidClockSkew(format!(
                    "AUTH_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            let skew = Duration::from_secs(value);
            if skew > MAX_CLOCK_SKEW {
                return Err(ConfigError::InvalidClockSkew(format!(
                    "AUTH_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            config.clock_skew = skew;
        }

        if let Some(value_str) = vars.get("AUTH_TRANSIENT_FAILURE_STATUS") {
            config.transient_failure_status = value_str.parse()?;
        }

        if let Some(value_str) = vars.get("AUTH_JWKS_URI") {
            config.jwks_uri_override = Some(value_str.clone());
        }

        Ok(config)
    }
}

/// Parse a comma-separated algorithm list such as `RS256,RS384`.
fn parse_algorithms(value: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let algorithms = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Algorithm::from_str(s).map_err(|_| {
                ConfigError::InvalidAlgorithms(format!("unknown algorithm '{}'", s))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if algorithms.is_empty() {
        return Err(ConfigError::InvalidAlgorithms(
            "AUTH_ALLOWED_ALGORITHMS must name at least one algorithm".to_string(),
        ));
    }

    Ok(algorithms)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "AUTH_ISSUER_DOMAIN".to_string(),
                "auth.example.com".to_string(),
            ),
            ("AUTH_AUDIENCE".to_string(), "my-api".to_string()),
        ])
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&base_vars()).unwrap();

        assert_eq!(config.issuer_domain, "auth.example.com");
        assert_eq!(config.audience, "my-api");
        assert_eq!(config.allowed_algorithms, vec![Algorithm::RS256]);
        assert_eq!(config.jwks_fetch_rate_limit, 5);
        assert_eq!(config.jwks_fetch_window, Duration::from_secs(60));
        assert!(config.cache_enabled);
        assert!(config.key_ttl.is_none());
        assert_eq!(config.jwks_fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.clock_skew, Duration::from_secs(0));
        assert_eq!(
            config.transient_failure_status,
            TransientFailureStatus::Unauthorized
        );
    }

    #[test]
    fn test_issuer_and_jwks_uri_derivation() {
        let config = Config::new("auth.example.com", "my-api");

        assert_eq!(config.issuer(), "https://auth.example.com/");
        assert_eq!(
            config.jwks_uri(),
            "https://auth.example.com/.well-known/jwks.json"
        );
    }

    #[test]
    fn test_jwks_uri_override() {
        let mut vars = base_vars();
        vars.insert(
            "AUTH_JWKS_URI".to_string(),
            "http://127.0.0.1:9999/keys".to_string(),
        );

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.jwks_uri(), "http://127.0.0.1:9999/keys");
        // Issuer is unaffected by the override
        assert_eq!(config.issuer(), "https://auth.example.com/");
    }

    #[test]
    fn test_trailing_slash_stripped_from_domain() {
        let mut vars = base_vars();
        vars.insert(
            "AUTH_ISSUER_DOMAIN".to_string(),
            "auth.example.com/".to_string(),
        );

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.issuer(), "https://auth.example.com/");
    }

    #[test]
    fn test_domain_with_scheme_rejected() {
        let mut vars = base_vars();
        vars.insert(
            "AUTH_ISSUER_DOMAIN".to_string(),
            "https://auth.example.com".to_string(),
        );

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidIssuerDomain(_))));
    }

    #[test]
    fn test_missing_required_vars() {
        let vars = HashMap::from([("AUTH_AUDIENCE".to_string(), "my-api".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == "AUTH_ISSUER_DOMAIN")
        );

        let vars = HashMap::from([(
            "AUTH_ISSUER_DOMAIN".to_string(),
            "auth.example.com".to_string(),
        )]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == "AUTH_AUDIENCE"));
    }

    #[test]
    fn test_allowed_algorithms_parsing() {
        let mut vars = base_vars();
        vars.insert(
            "AUTH_ALLOWED_ALGORITHMS".to_string(),
            "RS256, RS512,EdDSA".to_string(),
        );

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(
            config.allowed_algorithms,
            vec![Algorithm::RS256, Algorithm::RS512, Algorithm::EdDSA]
        );
    }

    #[test]
    fn test_allowed_algorithms_rejects_unknown_and_empty() {
        let mut vars = base_vars();
        vars.insert("AUTH_ALLOWED_ALGORITHMS".to_string(), "none".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidAlgorithms(_))
        ));

        vars.insert("AUTH_ALLOWED_ALGORITHMS".to_string(), " , ".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidAlgorithms(_))
        ));
    }

    #[test]
    fn test_rate_limit_parsing() {
        let mut vars = base_vars();
        vars.insert(
            "AUTH_JWKS_REQUESTS_PER_MINUTE".to_string(),
            "10".to_string(),
        );
        assert_eq!(Config::from_vars(&vars).unwrap().jwks_fetch_rate_limit, 10);

        vars.insert("AUTH_JWKS_REQUESTS_PER_MINUTE".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidRateLimit(_))
        ));

        vars.insert(
            "AUTH_JWKS_REQUESTS_PER_MINUTE".to_string(),
            "lots".to_string(),
        );
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidRateLimit(_))
        ));
    }

    #[test]
    fn test_rate_limit_upper_bound() {
        let mut vars = base_vars();
        vars.insert(
            "AUTH_JWKS_REQUESTS_PER_MINUTE".to_string(),
            MAX_JWKS_REQUESTS_PER_MINUTE.to_string(),
        );
        assert_eq!(
            Config::from_vars(&vars).unwrap().jwks_fetch_rate_limit,
            MAX_JWKS_REQUESTS_PER_MINUTE
        );

        vars.insert(
            "AUTH_JWKS_REQUESTS_PER_MINUTE".to_string(),
            "4000000000".to_string(),
        );
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidRateLimit(_))
        ));
    }

    #[test]
    fn test_cache_options_parsing() {
        let mut vars = base_vars();
        vars.insert("AUTH_JWKS_CACHE_ENABLED".to_string(), "false".to_string());
        vars.insert("AUTH_JWKS_CACHE_TTL_SECONDS".to_string(), "3600".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert!(!config.cache_enabled);
        assert_eq!(config.key_ttl, Some(Duration::from_secs(3600)));

        vars.insert("AUTH_JWKS_CACHE_ENABLED".to_string(), "maybe".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidCache(_))
        ));
    }

    #[test]
    fn test_clock_skew_bounds() {
        let mut vars = base_vars();
        vars.insert("AUTH_CLOCK_SKEW_SECONDS".to_string(), "600".to_string());
        assert_eq!(
            Config::from_vars(&vars).unwrap().clock_skew,
            Duration::from_secs(600)
        );

        vars.insert("AUTH_CLOCK_SKEW_SECONDS".to_string(), "601".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidClockSkew(_))
        ));

        vars.insert("AUTH_CLOCK_SKEW_SECONDS".to_string(), "-5".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidClockSkew(_))
        ));
    }

    #[test]
    fn test_fetch_timeout_parsing() {
        let mut vars = base_vars();
        vars.insert(
            "AUTH_JWKS_FETCH_TIMEOUT_SECONDS".to_string(),
            "3".to_string(),
        );
        assert_eq!(
            Config::from_vars(&vars).unwrap().jwks_fetch_timeout,
            Duration::from_secs(3)
        );

        vars.insert(
            "AUTH_JWKS_FETCH_TIMEOUT_SECONDS".to_string(),
            "0".to_string(),
        );
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidFetchTimeout(_))
        ));
    }

    #[test]
    fn test_transient_failure_status_parsing() {
        assert_eq!(
            "unavailable".parse::<TransientFailureStatus>().unwrap(),
            TransientFailureStatus::ServiceUnavailable
        );
        assert_eq!(
            "503".parse::<TransientFailureStatus>().unwrap(),
            TransientFailureStatus::ServiceUnavailable
        );
        assert_eq!(
            "Unauthorized".parse::<TransientFailureStatus>().unwrap(),
            TransientFailureStatus::Unauthorized
        );
        assert!("teapot".parse::<TransientFailureStatus>().is_err());
    }
}
