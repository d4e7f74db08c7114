//! Token verification.
//!
//! # Components
//!
//! - `jwks` - JWKS document types, key material and the HTTP key store client
//! - `rate_limit` - Rolling-window budget for JWKS fetches
//! - `key_cache` - `kid` resolution with single-flight refresh
//! - `jwt` - Token parsing, signature and claim validation
//! - `claims` - Verified claim set
//! - `decision` - Outcome to allow/deny mapping

pub mod claims;
pub mod decision;
pub mod jwks;
pub mod jwt;
pub mod key_cache;
pub mod rate_limit;

pub use claims::{Audience, Claims};
pub use decision::{decide, Decision, Outcome, ReasonCode, StatusHint};
pub use jwks::{JwksClient, KeySet, KeySetSource, PublicKey};
pub use jwt::{JwtValidator, ValidationPolicy};
pub use key_cache::KeyCache;
pub use rate_limit::FetchRateLimiter;
