//! Mock JWKS endpoint
//!
//! Wraps a wiremock `MockServer` serving `/.well-known/jwks.json`. Fetch
//! count expectations are verified when the server is dropped.

use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves the key set on.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Mock JWKS endpoint for integration tests.
pub struct TestJwksServer {
    mock_server: MockServer,
}

impl TestJwksServer {
    /// Serve `keys` with no expectation on the number of fetches.
    pub async fn start(keys: Vec<Value>) -> Self {
        Self::start_with(JwksMockResponse::keys(keys)).await
    }

    /// Serve `keys`, expecting exactly `fetches` requests.
    pub async fn start_expecting(keys: Vec<Value>, fetches: u64) -> Self {
        Self::start_with(JwksMockResponse::keys(keys).expect_fetches(fetches)).await
    }

    /// Serve the given response.
    pub async fn start_with(response: JwksMockResponse) -> Self {
        let mock_server = MockServer::start().await;

        let mut template = ResponseTemplate::new(response.status);
        template = match &response.body {
            Some(body) => template.set_body_json(body),
            None => template.set_body_string("not a key set"),
        };
        if let Some(delay) = response.delay {
            template = template.set_delay(delay);
        }

        let mut mock = Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(template);
        if let Some(fetches) = response.expected_fetches {
            mock = mock.expect(fetches);
        }
        mock.mount(&mock_server).await;

        Self { mock_server }
    }

    /// Base URI of the mock server.
    pub fn uri(&self) -> String {
        self.mock_server.uri()
    }

    /// Full JWKS URI, suitable for `Config::jwks_uri_override`.
    pub fn jwks_uri(&self) -> String {
        format!("{}{}", self.mock_server.uri(), JWKS_PATH)
    }

    /// Number of requests received so far.
    pub async fn fetch_count(&self) -> usize {
        self.mock_server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// The underlying wiremock server, for additional mounts.
    pub fn mock_server(&self) -> &MockServer {
        &self.mock_server
    }
}

/// What the mock endpoint returns.
#[derive(Debug, Clone)]
pub struct JwksMockResponse {
    status: u16,
    body: Option<Value>,
    delay: Option<Duration>,
    expected_fetches: Option<u64>,
}

impl JwksMockResponse {
    /// 200 with `{"keys": keys}`.
    pub fn keys(keys: Vec<Value>) -> Self {
        Self {
            status: 200,
            body: Some(json!({ "keys": keys })),
            delay: None,
            expected_fetches: None,
        }
    }

    /// Error status with a non-JSON body.
    pub fn error(status: u16) -> Self {
        Self {
            status,
            body: None,
            delay: None,
            expected_fetches: None,
        }
    }

    /// 200 with a body that is not a key set.
    pub fn malformed() -> Self {
        Self::error(200)
    }

    /// Delay every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Expect exactly `fetches` requests.
    pub fn expect_fetches(mut self, fetches: u64) -> Self {
        self.expected_fetches = Some(fetches);
        self
    }
}
