//! Token verification integration tests.
//!
//! Runs the full pipeline (HTTP key store client, key cache, verifier,
//! decision mapper) against a mocked JWKS endpoint.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use futures::future::join_all;
use jsonwebtoken::Algorithm;
use jwks_auth::auth::decision::{decide, ReasonCode, StatusHint};
use jwks_auth::auth::{JwtValidator, KeyCache, ValidationPolicy};
use jwks_auth::config::Config;
use jwks_auth_test_utils::{
    JwksMockResponse, TestEd25519Key, TestJwksServer, TestRsaKey, TestTokenBuilder,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

const ISSUER: &str = "https://auth.example.com/";
const AUDIENCE: &str = "my-api";
const KID: &str = "abc123";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("auth=debug,jwks_auth=debug")
        .with_test_writer()
        .try_init();
}

fn config_for(server: &TestJwksServer) -> Config {
    let mut config = Config::new("auth.example.com", AUDIENCE);
    config.jwks_uri_override = Some(server.jwks_uri());
    config
}

fn validator_for(config: &Config) -> (JwtValidator, Arc<KeyCache>) {
    let key_cache = Arc::new(KeyCache::from_config(config));
    let validator = JwtValidator::new(Arc::clone(&key_cache), ValidationPolicy::from_config(config));
    (validator, key_cache)
}

fn token(kid: &str) -> String {
    TestTokenBuilder::new(ISSUER, AUDIENCE)
        .for_subject("user-42")
        .sign_rs256(&TestRsaKey::primary(), kid)
}

// =============================================================================
// Happy path and claim checks
// =============================================================================

#[tokio::test]
async fn test_valid_token_is_authorized() -> Result<()> {
    init_tracing();
    let server = TestJwksServer::start_expecting(vec![TestRsaKey::primary().jwk_json(KID)], 1).await;
    let (validator, key_cache) = validator_for(&config_for(&server));

    let decision = decide(validator.verify(&token(KID)).await);

    assert!(decision.allow);
    assert_eq!(decision.status_hint, StatusHint::Ok);
    assert_eq!(decision.reason, None);
    let claims = decision.claims.expect("claims on allow");
    assert_eq!(claims.sub.as_deref(), Some("user-42"));
    assert_eq!(claims.iss.as_deref(), Some(ISSUER));
    assert_eq!(key_cache.cached_key_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_wrong_audience_is_rejected() -> Result<()> {
    let server = TestJwksServer::start(vec![TestRsaKey::primary().jwk_json(KID)]).await;
    let (validator, _) = validator_for(&config_for(&server));

    let token = TestTokenBuilder::new(ISSUER, "other-api").sign_rs256(&TestRsaKey::primary(), KID);
    let decision = decide(validator.verify(&token).await);

    assert!(!decision.allow);
    assert_eq!(decision.reason, Some(ReasonCode::AudienceMismatch));
    assert_eq!(decision.status_hint, StatusHint::Unauthorized);
    assert!(decision.claims.is_none());

    Ok(())
}

#[tokio::test]
async fn test_audience_array_containing_expected_value_is_accepted() -> Result<()> {
    let server = TestJwksServer::start(vec![TestRsaKey::primary().jwk_json(KID)]).await;
    let (validator, _) = validator_for(&config_for(&server));

    let token = TestTokenBuilder::new(ISSUER, AUDIENCE)
        .with_audiences(&["other-api", AUDIENCE])
        .sign_rs256(&TestRsaKey::primary(), KID);

    assert!(decide(validator.verify(&token).await).allow);

    Ok(())
}

#[tokio::test]
async fn test_wrong_issuer_is_rejected() -> Result<()> {
    let server = TestJwksServer::start(vec![TestRsaKey::primary().jwk_json(KID)]).await;
    let (validator, _) = validator_for(&config_for(&server));

    let token = TestTokenBuilder::new("https://evil.example.com/", AUDIENCE)
        .sign_rs256(&TestRsaKey::primary(), KID);
    let decision = decide(validator.verify(&token).await);

    assert_eq!(decision.reason, Some(ReasonCode::IssuerMismatch));

    Ok(())
}

#[tokio::test]
async fn test_expiry() -> Result<()> {
    let server = TestJwksServer::start(vec![TestRsaKey::primary().jwk_json(KID)]).await;
    let (validator, _) = validator_for(&config_for(&server));
    let builder = TestTokenBuilder::new(ISSUER, AUDIENCE);

    let expired = builder.clone().expires_in(-1).sign_rs256(&TestRsaKey::primary(), KID);
    assert_eq!(
        decide(validator.verify(&expired).await).reason,
        Some(ReasonCode::TokenExpired)
    );

    let no_exp = builder.clone().without_exp().sign_rs256(&TestRsaKey::primary(), KID);
    assert_eq!(
        decide(validator.verify(&no_exp).await).reason,
        Some(ReasonCode::TokenExpired)
    );

    let valid = builder.expires_in(30).sign_rs256(&TestRsaKey::primary(), KID);
    assert!(decide(validator.verify(&valid).await).allow);

    Ok(())
}

#[tokio::test]
async fn test_not_yet_valid_token_is_rejected() -> Result<()> {
    let server = TestJwksServer::start(vec![TestRsaKey::primary().jwk_json(KID)]).await;
    let (validator, _) = validator_for(&config_for(&server));

    let token = TestTokenBuilder::new(ISSUER, AUDIENCE)
        .not_before(chrono::Utc::now().timestamp() + 600)
        .sign_rs256(&TestRsaKey::primary(), KID);

    assert_eq!(
        decide(validator.verify(&token).await).reason,
        Some(ReasonCode::TokenNotYetValid)
    );

    Ok(())
}

#[tokio::test]
async fn test_custom_claims_are_passed_through() -> Result<()> {
    let server = TestJwksServer::start(vec![TestRsaKey::primary().jwk_json(KID)]).await;
    let (validator, _) = validator_for(&config_for(&server));

    let token = TestTokenBuilder::new(ISSUER, AUDIENCE)
        .with_scope("read:items write:items")
        .with_claim("tenant", serde_json::json!("acme"))
        .sign_rs256(&TestRsaKey::primary(), KID);

    let claims = validator.validate(&token).await?;
    assert!(claims.has_scope("write:items"));
    assert_eq!(claims.get("tenant"), Some(&serde_json::json!("acme")));

    Ok(())
}

// =============================================================================
// Algorithm allow-list
// =============================================================================

#[tokio::test]
async fn test_disallowed_algorithms_rejected_without_fetch() -> Result<()> {
    let server = TestJwksServer::start_expecting(vec![TestRsaKey::primary().jwk_json(KID)], 0).await;
    let (validator, _) = validator_for(&config_for(&server));
    let builder = TestTokenBuilder::new(ISSUER, AUDIENCE);

    for token in [builder.sign_hs256(b"shared-secret", KID), builder.unsigned(KID)] {
        let decision = decide(validator.verify(&token).await);
        assert_eq!(decision.reason, Some(ReasonCode::UnsupportedAlgorithm));
        assert_eq!(decision.status_hint, StatusHint::Unauthorized);
    }

    Ok(())
}

#[tokio::test]
async fn test_rs512_rejected_when_only_rs256_allowed() -> Result<()> {
    let server = TestJwksServer::start_expecting(vec![TestRsaKey::primary().jwk_json(KID)], 0).await;
    let (validator, _) = validator_for(&config_for(&server));

    let token = TestTokenBuilder::new(ISSUER, AUDIENCE).sign_rsa(
        &TestRsaKey::primary(),
        Algorithm::RS512,
        Some(KID),
    );

    assert_eq!(
        decide(validator.verify(&token).await).reason,
        Some(ReasonCode::UnsupportedAlgorithm)
    );

    Ok(())
}

#[tokio::test]
async fn test_rs512_accepted_with_alg_free_jwk_when_allowed() -> Result<()> {
    let server =
        TestJwksServer::start(vec![TestRsaKey::primary().jwk_json_without_alg(KID)]).await;
    let mut config = config_for(&server);
    config.allowed_algorithms = vec![Algorithm::RS256, Algorithm::RS512];
    let (validator, _) = validator_for(&config);

    let token = TestTokenBuilder::new(ISSUER, AUDIENCE).sign_rsa(
        &TestRsaKey::primary(),
        Algorithm::RS512,
        Some(KID),
    );

    assert!(decide(validator.verify(&token).await).allow);

    Ok(())
}

#[tokio::test]
async fn test_eddsa_token_accepted_when_allowed() -> Result<()> {
    let ed_key = TestEd25519Key::from_seed(1)?;
    let server = TestJwksServer::start(vec![
        TestRsaKey::primary().jwk_json(KID),
        ed_key.jwk_json("ed-key-01"),
    ])
    .await;
    let mut config = config_for(&server);
    config.allowed_algorithms = vec![Algorithm::RS256, Algorithm::EdDSA];
    let (validator, key_cache) = validator_for(&config);

    let token = TestTokenBuilder::new(ISSUER, AUDIENCE).sign_eddsa(&ed_key, "ed-key-01");

    assert!(decide(validator.verify(&token).await).allow);
    assert_eq!(key_cache.cached_key_count(), 2);

    Ok(())
}

// =============================================================================
// Key resolution
// =============================================================================

#[tokio::test]
async fn test_cached_key_reused_across_verifications() -> Result<()> {
    let server = TestJwksServer::start_expecting(vec![TestRsaKey::primary().jwk_json(KID)], 1).await;
    let (validator, key_cache) = validator_for(&config_for(&server));

    for _ in 0..10 {
        assert!(decide(validator.verify(&token(KID)).await).allow);
    }
    assert_eq!(key_cache.remaining_fetch_budget(), 4);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_verifications_share_one_fetch() -> Result<()> {
    init_tracing();
    let server = TestJwksServer::start_with(
        JwksMockResponse::keys(vec![TestRsaKey::primary().jwk_json(KID)])
            .with_delay(Duration::from_millis(200))
            .expect_fetches(1),
    )
    .await;
    let (validator, key_cache) = validator_for(&config_for(&server));
    let token = token(KID);

    let decisions = join_all((0..50).map(|_| validator.verify(&token))).await;

    assert!(decisions.into_iter().map(decide).all(|d| d.allow));
    assert_eq!(server.fetch_count().await, 1);
    assert_eq!(key_cache.remaining_fetch_budget(), 4);

    Ok(())
}

#[tokio::test]
async fn test_unknown_kid_refreshes_then_rejects() -> Result<()> {
    let server = TestJwksServer::start_expecting(vec![TestRsaKey::primary().jwk_json(KID)], 2).await;
    let (validator, _) = validator_for(&config_for(&server));

    assert!(decide(validator.verify(&token(KID)).await).allow);

    let decision = decide(validator.verify(&token("not-published")).await);
    assert_eq!(decision.reason, Some(ReasonCode::UnknownKeyId));
    assert_eq!(decision.status_hint, StatusHint::Unauthorized);

    Ok(())
}

#[tokio::test]
async fn test_rotated_key_picked_up_on_miss() -> Result<()> {
    let server = TestJwksServer::start(vec![TestRsaKey::primary().jwk_json("key-1")]).await;
    let (validator, _) = validator_for(&config_for(&server));

    assert!(decide(validator.verify(&token("key-1")).await).allow);

    // Issuer rotates: key-2 is published alongside key-1
    server.mock_server().reset().await;
    let rotated = serde_json::json!({
        "keys": [
            TestRsaKey::primary().jwk_json("key-1"),
            TestRsaKey::secondary().jwk_json("key-2"),
        ]
    });
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&rotated))
        .expect(1)
        .mount(server.mock_server())
        .await;

    let token = TestTokenBuilder::new(ISSUER, AUDIENCE).sign_rs256(&TestRsaKey::secondary(), "key-2");
    assert!(decide(validator.verify(&token).await).allow);

    Ok(())
}

#[tokio::test]
async fn test_signature_from_unpublished_key_rejected() -> Result<()> {
    let server = TestJwksServer::start(vec![TestRsaKey::primary().jwk_json(KID)]).await;
    let (validator, _) = validator_for(&config_for(&server));

    let token = TestTokenBuilder::new(ISSUER, AUDIENCE).sign_rs256(&TestRsaKey::secondary(), KID);

    assert_eq!(
        decide(validator.verify(&token).await).reason,
        Some(ReasonCode::InvalidSignature)
    );

    Ok(())
}

// =============================================================================
// Rate limit and fetch failures
// =============================================================================

#[tokio::test]
async fn test_fetch_budget_exhaustion_fails_fast() -> Result<()> {
    let server = TestJwksServer::start_expecting(vec![TestRsaKey::primary().jwk_json(KID)], 2).await;
    let mut config = config_for(&server);
    config.jwks_fetch_rate_limit = 2;
    let (validator, key_cache) = validator_for(&config);

    for kid in ["unknown-1", "unknown-2"] {
        assert_eq!(
            decide(validator.verify(&token(kid)).await).reason,
            Some(ReasonCode::UnknownKeyId)
        );
    }
    assert_eq!(key_cache.remaining_fetch_budget(), 0);

    let decision = decide(validator.verify(&token("unknown-3")).await);
    assert_eq!(decision.reason, Some(ReasonCode::RateLimitExceeded));
    assert_eq!(decision.status_hint, StatusHint::ServiceUnavailable);

    // Cached keys keep working while the budget is exhausted
    assert!(decide(validator.verify(&token(KID)).await).allow);

    Ok(())
}

#[tokio::test]
async fn test_endpoint_error_is_transient() -> Result<()> {
    let server = TestJwksServer::start_with(JwksMockResponse::error(500).expect_fetches(2)).await;
    let (validator, key_cache) = validator_for(&config_for(&server));

    let decision = decide(validator.verify(&token(KID)).await);
    assert_eq!(decision.reason, Some(ReasonCode::FetchError));
    assert_eq!(decision.status_hint, StatusHint::ServiceUnavailable);
    assert_eq!(key_cache.cached_key_count(), 0);

    // Failures are not cached; the next miss fetches again
    let decision = decide(validator.verify(&token(KID)).await);
    assert_eq!(decision.reason, Some(ReasonCode::FetchError));

    Ok(())
}

#[tokio::test]
async fn test_malformed_jwks_is_fetch_error() -> Result<()> {
    let server = TestJwksServer::start_with(JwksMockResponse::malformed()).await;
    let (validator, _) = validator_for(&config_for(&server));

    assert_eq!(
        decide(validator.verify(&token(KID)).await).reason,
        Some(ReasonCode::FetchError)
    );

    Ok(())
}

#[tokio::test]
async fn test_fetch_timeout_is_fetch_error() -> Result<()> {
    let server = TestJwksServer::start_with(
        JwksMockResponse::keys(vec![TestRsaKey::primary().jwk_json(KID)])
            .with_delay(Duration::from_secs(2)),
    )
    .await;
    let mut config = config_for(&server);
    config.jwks_fetch_timeout = Duration::from_millis(100);
    let (validator, _) = validator_for(&config);

    assert_eq!(
        decide(validator.verify(&token(KID)).await).reason,
        Some(ReasonCode::FetchError)
    );

    Ok(())
}

#[tokio::test]
async fn test_unreachable_endpoint_is_fetch_error() -> Result<()> {
    let mut config = Config::new("auth.example.com", AUDIENCE);
    // Port 9 (discard) on localhost is not expected to accept connections
    config.jwks_uri_override = Some("http://127.0.0.1:9/.well-known/jwks.json".to_string());
    config.jwks_fetch_timeout = Duration::from_secs(2);
    let (validator, _) = validator_for(&config);

    let decision = decide(validator.verify(&token(KID)).await);
    assert_eq!(decision.reason, Some(ReasonCode::FetchError));
    assert_eq!(decision.status_hint, StatusHint::ServiceUnavailable);

    Ok(())
}

#[tokio::test]
async fn test_malformed_token_never_fetches() -> Result<()> {
    let server = TestJwksServer::start_expecting(vec![TestRsaKey::primary().jwk_json(KID)], 0).await;
    let (validator, _) = validator_for(&config_for(&server));

    for token in ["", "not-a-jwt", "a.b", "a.b.c.d", "!!!.???.###"] {
        assert_eq!(
            decide(validator.verify(token).await).reason,
            Some(ReasonCode::MalformedToken),
            "{:?}",
            token
        );
    }

    let without_kid =
        TestTokenBuilder::new(ISSUER, AUDIENCE).sign_rs256_without_kid(&TestRsaKey::primary());
    assert_eq!(
        decide(validator.verify(&without_kid).await).reason,
        Some(ReasonCode::MalformedToken)
    );

    Ok(())
}
