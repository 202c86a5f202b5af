//! The rate-limited client proper.
//!
//! Before each request the route's bucket and the global deadline are
//! honored; after each response the bucket is refreshed from quota headers.
//! 429s retry after the advertised delay, 5xx retry with exponential
//! backoff, both up to the same bounded attempt count. Everything else
//! fails immediately. Uploads share the pre-flight discipline but are sent
//! exactly once.

use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::rate_limit::{RateLimiter, normalize_route};
use crate::transport::{
    ApiRequest, ApiResponse, AuthScheme, HttpTransport, RequestBody, Transport, UploadPart,
};

/// Retry discipline for transient failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries on top of the initial attempt.
    pub max_retries: u32,
    /// 5xx backoff: `base_delay * 2^attempt`, capped at `max_delay`.
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // Checked shift so absurd attempt numbers saturate instead of wrapping.
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// One credential's view of a platform API.
pub struct ApiClient<T: Transport = HttpTransport> {
    transport: T,
    base_url: String,
    auth: AuthScheme,
    limiter: Mutex<RateLimiter>,
    retry: RetryConfig,
}

impl ApiClient<HttpTransport> {
    pub fn new(base_url: impl Into<String>, auth: AuthScheme) -> Self {
        Self::with_transport(HttpTransport::new(), base_url, auth)
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn with_transport(transport: T, base_url: impl Into<String>, auth: AuthScheme) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            limiter: Mutex::new(RateLimiter::default()),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// JSON request. `Ok(None)` is a 204/empty-body success; other 2xx
    /// bodies deserialize into `R`, with shape mismatches surfacing as
    /// [`ApiError::Payload`] rather than being trusted downstream.
    pub async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Option<R>, ApiError> {
        let body = match body {
            Some(value) => RequestBody::Json(value),
            None => RequestBody::Empty,
        };
        let response = self.execute(method, path, body, true).await?;
        Self::parse_success(&response)
    }

    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<Option<R>, ApiError> {
        self.request("GET", path, None).await
    }

    pub async fn post<R: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Option<R>, ApiError> {
        self.request("POST", path, Some(body)).await
    }

    /// Multipart upload. Waits for quota like any request but is sent
    /// exactly once: re-sending a large body on every retry is undesirable,
    /// so 429/5xx surface directly instead of re-entering the retry loop.
    pub async fn upload<R: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        parts: Vec<UploadPart>,
    ) -> Result<Option<R>, ApiError> {
        let response = self
            .execute(method, path, RequestBody::Multipart(parts), false)
            .await?;
        Self::parse_success(&response)
    }

    fn parse_success<R: DeserializeOwned>(response: &ApiResponse) -> Result<Option<R>, ApiError> {
        if response.status == 204 || response.body.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&response.body)
            .map(Some)
            .map_err(|e| ApiError::Payload(e.to_string()))
    }

    async fn execute(
        &self,
        method: &str,
        path: &str,
        body: RequestBody,
        retry_transient: bool,
    ) -> Result<ApiResponse, ApiError> {
        let route = normalize_route(method, path);
        let request = ApiRequest {
            method: method.to_ascii_uppercase(),
            url: format!("{}{}", self.base_url, path),
            auth: self.auth.header_value(),
            body,
        };

        let mut attempt: u32 = 0;
        loop {
            self.wait_for_quota(&route).await;

            let response = self.transport.execute(request.clone()).await?;
            self.limiter.lock().record(&route, &response);

            match response.status {
                429 => {
                    let (retry_after, global) = parse_rate_limit(&response);
                    self.limiter
                        .lock()
                        .note_rate_limited(&route, retry_after, global);
                    if !retry_transient || attempt >= self.retry.max_retries {
                        warn!(route = %route, attempts = attempt + 1, "rate limit retries exhausted");
                        return Err(ApiError::RateLimited {
                            attempts: attempt + 1,
                            retry_after,
                        });
                    }
                    debug!(route = %route, retry_after, global, "rate limited, retrying");
                    tokio::time::sleep(Duration::from_secs_f64(retry_after.max(0.0))).await;
                    attempt += 1;
                }
                status if status >= 500 => {
                    if !retry_transient || attempt >= self.retry.max_retries {
                        return Err(ApiError::Server {
                            status,
                            attempts: attempt + 1,
                        });
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    debug!(route = %route, status, delay_ms = delay.as_millis() as u64, "server error, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                401 | 403 => return Err(ApiError::Unauthorized),
                status if !(200..300).contains(&status) => {
                    return Err(ApiError::Status {
                        status,
                        body: response.body_snippet(),
                    });
                }
                _ => return Ok(response),
            }
        }
    }

    /// Sleep out the global deadline and the route's bucket, re-checking
    /// after each wait. The limiter lock is never held across a sleep.
    async fn wait_for_quota(&self, route: &str) {
        loop {
            let wait = self.limiter.lock().delay_before(route);
            match wait {
                Some(delay) => {
                    debug!(route, delay_ms = delay.as_millis() as u64, "waiting for quota");
                    tokio::time::sleep(delay).await;
                }
                None => return,
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn limiter(&self) -> &Mutex<RateLimiter> {
        &self.limiter
    }
}

/// Retry delay and global flag from a 429, header first, body fallback.
fn parse_rate_limit(response: &ApiResponse) -> (f64, bool) {
    let body = response.json();
    let retry_after = response
        .header("retry-after")
        .and_then(|v| v.parse::<f64>().ok())
        .or_else(|| {
            body.as_ref()
                .and_then(|b| b.get("retry_after"))
                .and_then(serde_json::Value::as_f64)
        })
        .unwrap_or(1.0);
    let global = response
        .header("x-ratelimit-global")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        || body
            .as_ref()
            .and_then(|b| b.get("global"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
    (retry_after, global)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{RouteBucket, now_epoch};
    use crate::transport::testing::{FakeTransport, json_response, response_with_headers};
    use std::time::Instant;

    fn client(responses: Vec<ApiResponse>) -> ApiClient<FakeTransport> {
        ApiClient::with_transport(
            FakeTransport::new(responses),
            "https://api.example.com",
            AuthScheme::Bearer("token".into()),
        )
        .with_retry(RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        })
    }

    #[tokio::test]
    async fn exhausted_bucket_defers_the_request() {
        let api = client(vec![json_response(200, "{}")]);
        api.limiter().lock().set_bucket(
            "GET /users/@me",
            RouteBucket {
                remaining: 0,
                reset_at: now_epoch() + 0.15,
                bucket_hash: None,
            },
        );

        let started = Instant::now();
        let result: Option<serde_json::Value> = api.get("/users/@me").await.unwrap();
        assert!(result.is_some());
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(api.transport.call_count(), 1);
    }

    #[tokio::test]
    async fn global_deadline_defers_every_route() {
        let api = client(vec![json_response(200, "{}")]);
        api.limiter()
            .lock()
            .set_global_deadline(Instant::now() + Duration::from_millis(150));

        let started = Instant::now();
        let _: Option<serde_json::Value> = api.get("/anything").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn recovers_after_consecutive_429s() {
        let limited = response_with_headers(429, r#"{"retry_after":0.01}"#, &[]);
        let api = client(vec![
            limited.clone(),
            limited.clone(),
            limited.clone(),
            json_response(200, r#"{"id":"1"}"#),
        ]);

        let result: Option<serde_json::Value> = api.get("/users/@me").await.unwrap();
        assert_eq!(result.unwrap()["id"], "1");
        assert_eq!(api.transport.call_count(), 4);
    }

    #[tokio::test]
    async fn rate_limit_error_after_retries_exhausted() {
        let limited = response_with_headers(429, r#"{"retry_after":0.01}"#, &[]);
        let api = client(vec![limited; 6]);

        let err = api.get::<serde_json::Value>("/users/@me").await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { attempts: 4, .. }));
        // Initial attempt plus max_retries, never more.
        assert_eq!(api.transport.call_count(), 4);
    }

    #[tokio::test]
    async fn server_errors_back_off_exponentially() {
        let api = client(vec![
            json_response(500, "oops"),
            json_response(200, r#"{"ok":true}"#),
        ]);

        let started = Instant::now();
        let result: Option<serde_json::Value> = api.get("/x").await.unwrap();
        assert!(result.is_some());
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(api.transport.call_count(), 2);

        let calls = api.transport.calls.lock();
        assert!(calls[1] - calls[0] >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn persistent_server_error_surfaces_typed() {
        let api = client(vec![json_response(502, "bad"); 6]);
        let err = api.get::<serde_json::Value>("/x").await.unwrap_err();
        assert!(matches!(err, ApiError::Server { status: 502, attempts: 4 }));
        assert_eq!(api.transport.call_count(), 4);
    }

    #[tokio::test]
    async fn client_errors_fail_immediately() {
        let api = client(vec![json_response(404, "missing")]);
        let err = api.get::<serde_json::Value>("/x").await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 404, .. }));
        assert_eq!(api.transport.call_count(), 1);
    }

    #[tokio::test]
    async fn unauthorized_is_its_own_kind() {
        let api = client(vec![json_response(401, r#"{"message":"401"}"#)]);
        let err = api.get::<serde_json::Value>("/x").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[tokio::test]
    async fn no_content_resolves_to_empty_success() {
        let api = client(vec![json_response(204, "")]);
        let result: Option<serde_json::Value> = api.get("/x").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn malformed_payload_is_a_distinct_error() {
        let api = client(vec![json_response(200, "<html>not json</html>")]);
        let err = api.get::<serde_json::Value>("/x").await.unwrap_err();
        assert!(matches!(err, ApiError::Payload(_)));
    }

    #[tokio::test]
    async fn uploads_are_sent_exactly_once() {
        let limited = response_with_headers(429, r#"{"retry_after":0.01}"#, &[]);
        let api = client(vec![limited]);
        let parts = vec![UploadPart {
            name: "file".into(),
            file_name: "notes.txt".into(),
            bytes: b"hello".to_vec(),
        }];

        let err = api
            .upload::<serde_json::Value>("POST", "/files", parts)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { attempts: 1, .. }));
        assert_eq!(api.transport.call_count(), 1);
    }

    #[tokio::test]
    async fn global_429_sets_the_shared_deadline() {
        let limited = response_with_headers(
            429,
            r#"{"retry_after":0.05,"global":true}"#,
            &[("x-ratelimit-global", "true")],
        );
        let api = client(vec![limited, json_response(200, "{}")]);

        let _: Option<serde_json::Value> = api.get("/a").await.unwrap();
        assert_eq!(api.transport.call_count(), 2);
        // Second call had to clear the global deadline set by the first.
        let calls = api.transport.calls.lock();
        assert!(calls[1] - calls[0] >= Duration::from_millis(40));
    }

    #[test]
    fn backoff_delay_doubles_and_caps() {
        let retry = RetryConfig {
            max_retries: 8,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(retry.delay_for_attempt(10), Duration::from_secs(1));
    }
}
