//! HTTP client transport for the platform API.
//!
//! Every call is one `POST {api_url}/bot{token}/{method}` with a JSON body.
//! The response envelope is `{ok, result, error_code?, description?,
//! parameters?}`; classification into the core error taxonomy happens here
//! so the sender's retry loop never needs to know about HTTP:
//!
//! | Observation | Classified as |
//! |-------------|---------------|
//! | network error / request timeout | `ApiError::Transient` |
//! | HTTP 5xx | `ApiError::Transient` |
//! | HTTP 429 or `error_code: 429` | `ApiError::RateLimited` (hint from `parameters.retry_after` or the `Retry-After` header) |
//! | other `ok: false` / 4xx | `ApiError::Api` (permanent) |
//! | `ok: true` | the `result` payload |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode, header};
use serde_json::Value;
use tracing::{debug, trace};

use filament_core::{ApiError, ApiResult, ApiTransport};

use crate::{TransportError, TransportResult};

/// Public endpoint of the hosted platform API.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Settings for the HTTP API client.
#[derive(Debug, Clone)]
pub struct HttpApiConfig {
    /// Base URL of the platform API.
    pub api_url: String,
    /// Hard cap on a single request. Must exceed the long-poll fetch
    /// timeout or every quiet poll turns into a transient failure.
    pub request_timeout: Duration,
}

impl Default for HttpApiConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(90),
        }
    }
}

/// Reqwest-backed [`ApiTransport`].
pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    /// Creates a client for the hosted platform API.
    pub fn new(token: &str) -> TransportResult<Self> {
        Self::with_config(token, HttpApiConfig::default())
    }

    /// Creates a client with explicit settings (self-hosted API, tests).
    pub fn with_config(token: &str, config: HttpApiConfig) -> TransportResult<Self> {
        let client = ClientBuilder::new()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{token}", config.api_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ApiTransport for HttpApi {
    async fn execute(&self, method: &str, params: Value) -> ApiResult<Value> {
        let url = format!("{}/{method}", self.base_url);
        debug!(method, "sending API request");
        trace!(method, params = %params, "request body");

        let response = self
            .client
            .post(&url)
            .json(&params)
            .send()
            .await
            .map_err(ApiError::transient)?;

        let status = response.status();
        let header_hint = retry_after_header(&response);

        if status.is_server_error() {
            return Err(ApiError::Transient(format!("server returned {status}")));
        }

        // Success and client-error responses both carry the JSON envelope.
        let body: Value = match response.json().await {
            Ok(body) => body,
            // some proxies answer 429 with a non-JSON body
            Err(_) if status == StatusCode::TOO_MANY_REQUESTS => {
                return Err(ApiError::RateLimited {
                    retry_after: header_hint,
                });
            }
            Err(error) => return Err(ApiError::InvalidResponse(error.to_string())),
        };

        classify_envelope(status, header_hint, body)
    }
}

/// Parses the `Retry-After` header, when present and numeric.
fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Classifies a decoded response envelope.
fn classify_envelope(
    status: StatusCode,
    header_hint: Option<Duration>,
    body: Value,
) -> ApiResult<Value> {
    let ok = body.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if ok {
        return Ok(body.get("result").cloned().unwrap_or(Value::Null));
    }

    let code = body
        .get("error_code")
        .and_then(Value::as_i64)
        .unwrap_or_else(|| i64::from(status.as_u16()));
    let description = body
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();

    if code == 429 || status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = body
            .pointer("/parameters/retry_after")
            .and_then(Value::as_u64)
            .map(Duration::from_secs)
            .or(header_hint);
        return Err(ApiError::RateLimited { retry_after });
    }

    Err(ApiError::Api { code, description })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_envelope_yields_the_result_payload() {
        let result = classify_envelope(
            StatusCode::OK,
            None,
            json!({"ok": true, "result": [1, 2, 3]}),
        )
        .unwrap();
        assert_eq!(result, json!([1, 2, 3]));
    }

    #[test]
    fn in_band_rate_limit_carries_the_hint() {
        let err = classify_envelope(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(99)),
            json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 7",
                "parameters": {"retry_after": 7},
            }),
        )
        .unwrap_err();
        // the in-band hint wins over the header
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn header_hint_is_the_fallback() {
        let err = classify_envelope(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(11)),
            json!({"ok": false, "error_code": 429, "description": "slow down"}),
        )
        .unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(11)));
    }

    #[test]
    fn other_client_errors_are_permanent() {
        let err = classify_envelope(
            StatusCode::BAD_REQUEST,
            None,
            json!({"ok": false, "error_code": 400, "description": "chat not found"}),
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Api { code: 400, .. }));
        assert!(!err.is_retryable());
    }
}
