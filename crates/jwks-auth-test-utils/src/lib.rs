//! # JWKS Auth Test Utilities
//!
//! Shared test utilities for the `jwks-auth` crate.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed RSA keys, seeded Ed25519 keys)
//! - A token builder that signs with any of them
//! - A wiremock-backed JWKS endpoint harness
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jwks_auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = TestRsaKey::primary();
//!     let server = TestJwksServer::start(vec![key.jwk_json("abc123")]).await;
//!
//!     let token = TestTokenBuilder::new("https://auth.example.com/", "my-api")
//!         .for_subject("alice")
//!         .sign_rs256(&key, "abc123");
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_server;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_server::*;
pub use token_builders::*;
