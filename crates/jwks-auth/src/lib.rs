//! Dynamic-key JWT verification.
//!
//! Verifies bearer tokens signed by an external identity provider whose
//! public keys are published as a JWKS document and rotate over time:
//!
//! - Keys are fetched on demand and cached by `kid`
//! - Concurrent misses share one in-flight refresh
//! - Outbound fetches are capped by a rolling-window budget
//! - Tokens are checked for algorithm, signature, expiry, issuer and audience
//! - Each outcome maps to an allow/deny decision with a stable reason code
//!
//! # Modules
//!
//! - `auth` - Key store client, key cache, token verifier, decision mapper
//! - `config` - Verifier configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `middleware` - Axum middleware that guards routes
//! - `observability` - Metrics
//!
//! # Example
//!
//! ```no_run
//! use jwks_auth::{config::Config, middleware::AuthState};
//!
//! # fn build() -> Result<(), jwks_auth::config::ConfigError> {
//! let config = Config::from_env()?;
//! let state = AuthState::from_config(&config);
//! # let _ = state;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod observability;
