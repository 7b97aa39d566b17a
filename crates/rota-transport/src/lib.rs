//! Shared HTTP transport helpers for the roster and chat API clients.
//!
//! Both clients issue JSON requests through [`request_json`], which retries
//! rate limits, server errors and transient transport failures with
//! exponential backoff. Application-level failures reported inside a
//! successful HTTP response are left to the caller and never retried.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;

/// Header carrying the zero-based retry attempt on every outgoing request.
pub const RETRY_ATTEMPT_HEADER: &str = "x-rota-retry-attempt";

const MAX_BACKOFF_EXPONENT: usize = 6;

/// Retry budget applied to a single logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: base_delay_ms.max(1),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 500)
    }
}

/// Builds a `reqwest::Client` with JSON accept headers and a request timeout.
pub fn build_http_client(user_agent: &'static str, request_timeout_ms: u64) -> Result<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_static(user_agent),
    );
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_millis(request_timeout_ms.max(1)))
        .build()
        .with_context(|| format!("failed to create {user_agent} http client"))
}

/// Sends the request produced by `builder`, retrying retryable failures, and
/// decodes a successful body as `T`.
///
/// `service` and `operation` only label errors and logs. `describe_error_body`
/// renders a non-success body into the final error message.
pub async fn request_json<T, F>(
    service: &str,
    operation: &str,
    policy: RetryPolicy,
    mut builder: F,
    describe_error_body: fn(&str) -> String,
) -> Result<T>
where
    T: DeserializeOwned,
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut attempt = 0_usize;
    loop {
        attempt = attempt.saturating_add(1);
        let response = builder()
            .header(RETRY_ATTEMPT_HEADER, attempt.saturating_sub(1).to_string())
            .send()
            .await;
        match response {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let parsed = response
                        .json::<T>()
                        .await
                        .with_context(|| format!("failed to decode {service} {operation}"))?;
                    return Ok(parsed);
                }

                let retry_after = parse_retry_after(response.headers());
                let body = response.text().await.unwrap_or_default();
                if attempt < policy.max_attempts && is_retryable_status(status.as_u16()) {
                    let delay = retry_delay(policy.base_delay_ms, attempt, retry_after);
                    tracing::warn!(
                        service,
                        operation,
                        status = status.as_u16(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying api request"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }

                bail!(
                    "{service} api {operation} failed with status {}: {}",
                    status.as_u16(),
                    describe_error_body(&body)
                );
            }
            Err(error) => {
                if attempt < policy.max_attempts && is_retryable_transport_error(&error) {
                    let delay = retry_delay(policy.base_delay_ms, attempt, None);
                    tracing::warn!(
                        service,
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying api request after transport error"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(error)
                    .with_context(|| format!("{service} api {operation} request failed"));
            }
        }
    }
}

pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

pub fn retry_delay(base_delay_ms: u64, attempt: usize, retry_after_seconds: Option<u64>) -> Duration {
    if let Some(retry_after_seconds) = retry_after_seconds {
        return Duration::from_secs(retry_after_seconds);
    }
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT) as u32;
    let scale = 2_u64.pow(exponent);
    Duration::from_millis(base_delay_ms.max(1).saturating_mul(scale))
}

pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

pub fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

pub fn truncate_for_error(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::{
        build_http_client, is_retryable_status, parse_retry_after, request_json, retry_delay,
        truncate_for_error, RetryPolicy, RETRY_ATTEMPT_HEADER,
    };
    use httpmock::prelude::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
    use serde_json::{json, Value};
    use std::time::Duration;

    fn plain_body(body: &str) -> String {
        truncate_for_error(body, 200)
    }

    #[test]
    fn unit_parse_retry_after_accepts_numeric_and_rejects_invalid_values() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("15"));
        assert_eq!(parse_retry_after(&headers), Some(15));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn unit_retry_delay_prefers_retry_after_and_caps_exponent() {
        assert_eq!(retry_delay(100, 4, Some(2)), Duration::from_secs(2));
        assert_eq!(retry_delay(100, 1, None), Duration::from_millis(100));
        assert_eq!(retry_delay(100, 3, None), Duration::from_millis(400));
        assert_eq!(retry_delay(100, 50, None), Duration::from_millis(6_400));
    }

    #[test]
    fn unit_retryable_status_covers_rate_limits_and_server_errors() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn regression_truncate_for_error_respects_char_boundaries() {
        assert_eq!(truncate_for_error("résumé", 3), "rés...");
        assert_eq!(truncate_for_error("ok", 10), "ok");
    }

    #[tokio::test]
    async fn functional_request_json_retries_server_errors_then_succeeds() {
        let server = MockServer::start();
        let failing = server.mock(|when, then| {
            when.method(GET)
                .path("/ping")
                .header(RETRY_ATTEMPT_HEADER, "0");
            then.status(503).body("busy");
        });
        let succeeding = server.mock(|when, then| {
            when.method(GET)
                .path("/ping")
                .header(RETRY_ATTEMPT_HEADER, "1");
            then.status(200).json_body(json!({"ok": true}));
        });

        let http = build_http_client("rota-test", 2_000).expect("client");
        let url = format!("{}/ping", server.base_url());
        let body: Value = request_json(
            "test",
            "ping",
            RetryPolicy::new(3, 1),
            || http.get(&url),
            plain_body,
        )
        .await
        .expect("retried request");

        assert_eq!(body["ok"], true);
        failing.assert_calls(1);
        succeeding.assert_calls(1);
    }

    #[tokio::test]
    async fn regression_request_json_does_not_retry_client_errors() {
        let server = MockServer::start();
        let rejected = server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404).body("not here");
        });

        let http = build_http_client("rota-test", 2_000).expect("client");
        let url = format!("{}/missing", server.base_url());
        let error = request_json::<Value, _>(
            "test",
            "missing",
            RetryPolicy::new(3, 1),
            || http.get(&url),
            plain_body,
        )
        .await
        .expect_err("404 should fail");

        assert!(error.to_string().contains("status 404: not here"));
        rejected.assert_calls(1);
    }
}
