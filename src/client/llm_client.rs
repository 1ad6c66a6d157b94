//! HTTP client shared by all models on one endpoint.
//!
//! Owns the connection pool, provider auth headers, pacing and the retry
//! loop. Only capacity signals are retried: HTTP 429, HTTP 529 and bodies
//! mentioning `RESOURCE_EXHAUSTED`. Everything else fails on first sight.

use crate::client::RateLimiter;
use crate::models::{ApiError, ConfigError, CpsEvalError, EndpointConfig, Provider, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Anthropic API version pinned in every request.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Marker some providers put in the body instead of a 429.
const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

/// Message in a chat-style request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// API error body (OpenAI, Anthropic and Gemini all nest `error.message`).
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Fixed-backoff retry for capacity signals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Sleep between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_endpoint(endpoint: &EndpointConfig) -> Self {
        Self {
            max_retries: endpoint.max_retries,
            backoff: Duration::from_secs_f64(endpoint.retry_backoff_secs.max(0.0)),
        }
    }
}

/// Client for one configured endpoint.
#[derive(Debug)]
pub struct LLMClient {
    client: reqwest::Client,
    /// Endpoint name (for logging and auth errors)
    name: String,
    provider: Provider,
    base_url: String,
    headers: HeaderMap,
    timeout: Duration,
    retry: RetryPolicy,
    rate_limiter: Arc<RateLimiter>,
}

impl LLMClient {
    /// Create a client.
    ///
    /// Auth headers are derived from `provider`; `custom_headers` are added
    /// on top and may override them.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        provider: Provider,
        api_key: Option<String>,
        base_url: impl Into<String>,
        custom_headers: &HashMap<String, String>,
        timeout: Duration,
        retry: RetryPolicy,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self> {
        let name = name.into();
        let headers = build_headers(&name, provider, api_key.as_deref(), custom_headers)?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CpsEvalError::Network)?;

        Ok(Self {
            client,
            name,
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers,
            timeout,
            retry,
            rate_limiter,
        })
    }

    /// Create a client from an endpoint section and its resolved key.
    pub fn from_endpoint(
        name: &str,
        endpoint: &EndpointConfig,
        api_key: Option<String>,
        custom_headers: &HashMap<String, String>,
    ) -> Result<Self> {
        Self::new(
            name,
            endpoint.provider,
            api_key,
            endpoint.base_url.clone(),
            custom_headers,
            Duration::from_secs(endpoint.timeout_secs),
            RetryPolicy::from_endpoint(endpoint),
            Arc::new(RateLimiter::new(Duration::from_millis(endpoint.min_interval_ms))),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// POST `body` to `{base_url}{path}` on behalf of `model_id`.
    ///
    /// Retries capacity signals with a fixed sleep up to the policy's
    /// ceiling, then fails with `ApiError::RetriesExhausted`.
    pub async fn post_json(
        &self,
        model_id: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let attempts = self.retry.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            self.rate_limiter.acquire(model_id).await;

            let response = self
                .client
                .post(&url)
                .headers(self.headers.clone())
                .json(body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        CpsEvalError::Timeout(self.timeout)
                    } else {
                        CpsEvalError::Network(e)
                    }
                })?;

            let status = response.status().as_u16();
            if response.status().is_success() {
                return response.json::<serde_json::Value>().await.map_err(|e| {
                    ApiError::InvalidResponse(format!("{} returned malformed JSON: {e}", self.name))
                        .into()
                });
            }

            let error_body = response.text().await.unwrap_or_default();
            if is_capacity_signal(status, &error_body) {
                self.rate_limiter.record_exhausted(model_id);
                if attempt < attempts {
                    warn!(
                        endpoint = %self.name,
                        model = model_id,
                        status = status,
                        attempt = attempt,
                        backoff_secs = self.retry.backoff.as_secs_f64(),
                        "Resource exhausted, retrying"
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
                continue;
            }

            debug!(endpoint = %self.name, status = status, "Request failed");
            return Err(self.map_error(model_id, status, error_body).into());
        }

        Err(ApiError::RetriesExhausted {
            model: model_id.to_string(),
            attempts,
        }
        .into())
    }

    fn map_error(&self, model_id: &str, status: u16, body: String) -> ApiError {
        match status {
            401 | 403 => ApiError::AuthenticationFailed(self.name.clone()),
            404 => ApiError::ModelNotFound(model_id.to_string()),
            _ => {
                let message = serde_json::from_str::<ApiErrorResponse>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                ApiError::Api { status, message }
            }
        }
    }
}

fn is_capacity_signal(status: u16, body: &str) -> bool {
    status == 429 || status == 529 || body.contains(RESOURCE_EXHAUSTED)
}

fn build_headers(
    endpoint: &str,
    provider: Provider,
    api_key: Option<&str>,
    custom_headers: &HashMap<String, String>,
) -> Result<HeaderMap> {
    let invalid = |what: &str| {
        CpsEvalError::Config(ConfigError::Invalid(format!(
            "endpoint '{endpoint}': invalid {what} header value"
        )))
    };

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(key) = api_key {
        match provider {
            Provider::OpenAi => {
                let value = HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|_| invalid("authorization"))?;
                headers.insert(AUTHORIZATION, value);
            }
            Provider::Anthropic => {
                let value = HeaderValue::from_str(key).map_err(|_| invalid("x-api-key"))?;
                headers.insert("x-api-key", value);
            }
            Provider::Gemini => {
                let value = HeaderValue::from_str(key).map_err(|_| invalid("x-goog-api-key"))?;
                headers.insert("x-goog-api-key", value);
            }
        }
    }

    if provider == Provider::Anthropic {
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
    }

    for (key, value) in custom_headers {
        let name = HeaderName::try_from(key.as_str()).map_err(|_| invalid(key.as_str()))?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid(key.as_str()))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &mockito::Server, provider: Provider, max_retries: u32) -> LLMClient {
        LLMClient::new(
            "test",
            provider,
            Some("secret".to_string()),
            server.url(),
            &HashMap::new(),
            Duration::from_secs(5),
            RetryPolicy {
                max_retries,
                backoff: Duration::ZERO,
            },
            Arc::new(RateLimiter::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_provider_auth_headers() {
        let none = HashMap::new();
        let openai = build_headers("e", Provider::OpenAi, Some("k"), &none).unwrap();
        assert_eq!(openai[AUTHORIZATION], "Bearer k");

        let anthropic = build_headers("e", Provider::Anthropic, Some("k"), &none).unwrap();
        assert_eq!(anthropic["x-api-key"], "k");
        assert_eq!(anthropic["anthropic-version"], ANTHROPIC_VERSION);
        assert!(anthropic.get(AUTHORIZATION).is_none());

        let gemini = build_headers("e", Provider::Gemini, Some("k"), &none).unwrap();
        assert_eq!(gemini["x-goog-api-key"], "k");

        let local = build_headers("e", Provider::OpenAi, None, &none).unwrap();
        assert!(local.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_invalid_custom_header_is_config_error() {
        let mut custom = HashMap::new();
        custom.insert("bad header".to_string(), "v".to_string());
        let err = build_headers("e", Provider::OpenAi, None, &custom).unwrap_err();
        assert!(matches!(err, CpsEvalError::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_capacity_signals() {
        assert!(is_capacity_signal(429, ""));
        assert!(is_capacity_signal(529, ""));
        assert!(is_capacity_signal(400, r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#));
        assert!(!is_capacity_signal(500, "internal"));
    }

    #[tokio::test]
    async fn test_post_json_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": true}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server, Provider::OpenAi, 3);
        let body = serde_json::json!({"model": "m"});
        let value = client.post_json("m", "/chat/completions", &body).await.unwrap();

        assert_eq!(value["ok"], true);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_capacity_retries_exhaust() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .expect(3)
            .create_async()
            .await;

        let client = client(&server, Provider::OpenAi, 2);
        let err = client
            .post_json("m", "/chat/completions", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CpsEvalError::Api(ApiError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(client.rate_limiter().model_counts("m"), (3, 3));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .with_status(401)
            .with_body(r#"{"error": {"message": "bad key"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server, Provider::Anthropic, 5);
        let err = client
            .post_json("m", "/messages", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CpsEvalError::Api(ApiError::AuthenticationFailed(ref e)) if e == "test"
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_message_extracted() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body(r#"{"error": {"message": "boom"}}"#)
            .create_async()
            .await;

        let client = client(&server, Provider::OpenAi, 5);
        let err = client
            .post_json("m", "/chat/completions", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CpsEvalError::Api(ApiError::Api { status: 500, ref message }) if message == "boom"
        ));
    }
}
