//! Rate-limited HTTP client for the workspace and enrichment APIs.
//!
//! Wraps every outbound call with retry/backoff and error classification.
//! Transient failures (429, 5xx, timeouts) are retried with capped,
//! jittered exponential backoff — honoring a `Retry-After` header when the
//! server sends one — while auth, not-found, and malformed-request failures
//! surface immediately. The client holds no workspace-scoped state and no
//! cache: every call reflects current remote state.

pub mod retry;

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use zenrag_shared::config::ClientConfig;
use zenrag_shared::{Result, ZenragError};

pub use retry::{RetryPolicy, RetryStep, Sleeper, TokioSleeper};

/// User-Agent string for outbound requests.
const USER_AGENT: &str = concat!("zenrag/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

/// HTTP client for one remote API (base URL + bearer token).
///
/// Stateless per call and safe to share; build one per API endpoint.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
}

impl ApiClient {
    /// Create a client for `api_base`, authenticated with `token`.
    pub fn new(api_base: &str, token: &str, config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ZenragError::Network(format!("failed to build HTTP client: {e}")))?;

        // A trailing slash keeps Url::join from clobbering the base path.
        let mut base = api_base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| ZenragError::config(format!("invalid API base URL '{api_base}': {e}")))?;

        Ok(Self {
            http,
            base_url,
            token: token.to_string(),
            policy: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.base_delay_ms),
                Duration::from_millis(config.max_delay_ms),
            ),
            sleeper: Box::new(TokioSleeper),
        })
    }

    /// Replace the retry policy (the enrichment processor sets its own budget).
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the sleeper (tests inject a recording no-op).
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// GET `path` with query parameters, returning the parsed JSON payload.
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        self.request(Method::GET, path, query, None).await
    }

    /// POST a JSON body to `path`, returning the parsed JSON payload.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    /// Perform a request with retry/backoff.
    ///
    /// The loop is the `Attempting → Waiting → Attempting | GivenUp` state
    /// machine from [`RetryPolicy::next_step`]; every retry is logged with
    /// its attempt count and delay.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ZenragError::config(format!("invalid request path '{path}': {e}")))?;

        let mut attempt: u32 = 0;
        loop {
            match self.attempt(method.clone(), url.clone(), query, body).await {
                Ok(payload) => return Ok(payload),
                Err(error) => match self.policy.next_step(attempt, &error) {
                    RetryStep::Wait(delay) => {
                        warn!(
                            %url,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            %error,
                            "transient API failure, backing off"
                        );
                        self.sleeper.sleep(delay).await;
                        attempt += 1;
                    }
                    RetryStep::GiveUp => return Err(error),
                },
            }
        }
    }

    /// One attempt: send, classify the status, parse the JSON body.
    async fn attempt(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        debug!(%url, ?method, "sending request");

        let mut builder = self
            .http
            .request(method, url.clone())
            .bearer_auth(&self.token);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ZenragError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(&response);
            let snippet = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &snippet));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ZenragError::MalformedResponse(format!("{url}: {e}")))
    }
}

/// Map an HTTP error status to the error taxonomy.
fn classify_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> ZenragError {
    let snippet: String = body.chars().take(200).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ZenragError::Auth(format!("HTTP {status}: {snippet}"))
        }
        StatusCode::NOT_FOUND => ZenragError::NotFound(snippet),
        StatusCode::TOO_MANY_REQUESTS => ZenragError::RateLimited {
            retry_after_secs: retry_after,
        },
        s if s.is_server_error() => ZenragError::Network(format!("HTTP {status}: {snippet}")),
        // Remaining 4xx: the request itself was malformed; never retried.
        _ => ZenragError::MalformedResponse(format!("HTTP {status}: {snippet}")),
    }
}

/// Parse the `Retry-After` header as whole seconds, if present.
fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Sleeper that records requested delays and returns immediately.
    struct RecordingSleeper {
        delays: Arc<Mutex<Vec<Duration>>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(
            &self,
            delay: Duration,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
            self.delays.lock().unwrap().push(delay);
            Box::pin(std::future::ready(()))
        }
    }

    fn test_client(server: &MockServer) -> (ApiClient, Arc<Mutex<Vec<Duration>>>) {
        let delays = Arc::new(Mutex::new(Vec::new()));
        let config = ClientConfig {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
            timeout_secs: 5,
        };
        let client = ApiClient::new(&server.uri(), "test-token", &config)
            .unwrap()
            .with_sleeper(Box::new(RecordingSleeper {
                delays: delays.clone(),
            }));
        (client, delays)
    }

    #[tokio::test]
    async fn get_sends_bearer_token_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workspaces/ws1/issues"))
            .and(header("authorization", "Bearer test-token"))
            .and(query_param("cursor", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [],
                "next_cursor": null,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = test_client(&server);
        let payload = client
            .get("workspaces/ws1/issues", &[("cursor", "abc".into())])
            .await
            .unwrap();
        assert!(payload["items"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let (client, delays) = test_client(&server);
        let payload = client.get("flaky", &[]).await.unwrap();
        assert_eq!(payload["ok"], true);
        assert_eq!(delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn honors_retry_after_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let (client, delays) = test_client(&server);
        client.get("limited", &[]).await.unwrap();
        assert_eq!(delays.lock().unwrap()[0], Duration::from_secs(7));
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/private"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let (client, delays) = test_client(&server);
        let err = client.get("private", &[]).await.unwrap_err();
        assert!(matches!(err, ZenragError::Auth(_)));
        assert!(delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workspaces/missing/issues"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = test_client(&server);
        let err = client.get("workspaces/missing/issues", &[]).await.unwrap_err();
        assert!(matches!(err, ZenragError::NotFound(_)));
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_classified_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .expect(4) // initial attempt + 3 retries
            .mount(&server)
            .await;

        let (client, delays) = test_client(&server);
        let err = client.get("down", &[]).await.unwrap_err();
        assert!(matches!(err, ZenragError::Network(_)));
        assert_eq!(delays.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn non_json_success_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
            .mount(&server)
            .await;

        let (client, _) = test_client(&server);
        let err = client.get("html", &[]).await.unwrap_err();
        assert!(matches!(err, ZenragError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "cmpl-1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = test_client(&server);
        let payload = client
            .post(
                "chat/completions",
                &serde_json::json!({"model": "gpt-4o-mini"}),
            )
            .await
            .unwrap();
        assert_eq!(payload["id"], "cmpl-1");
    }

    #[test]
    fn classify_maps_statuses_to_taxonomy() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, None, ""),
            ZenragError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, None, "no such workspace"),
            ZenragError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some(12), ""),
            ZenragError::RateLimited {
                retry_after_secs: Some(12)
            }
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None, ""),
            ZenragError::Network(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, None, "bad cursor"),
            ZenragError::MalformedResponse(_)
        ));
    }

    #[test]
    fn parse_retry_after_header_values() {
        let with_header = reqwest::Response::from(
            ::http::Response::builder()
                .status(429)
                .header("Retry-After", "120")
                .body("")
                .unwrap(),
        );
        assert_eq!(parse_retry_after(&with_header), Some(120));

        let missing = reqwest::Response::from(
            ::http::Response::builder().status(429).body("").unwrap(),
        );
        assert_eq!(parse_retry_after(&missing), None);

        let garbage = reqwest::Response::from(
            ::http::Response::builder()
                .status(429)
                .header("Retry-After", "soon")
                .body("")
                .unwrap(),
        );
        assert_eq!(parse_retry_after(&garbage), None);
    }
}
