//! Rate-limited request sender.
//!
//! [`ApiSender`] wraps every outbound platform call with classification-
//! driven retries:
//!
//! - rate-limited responses wait the server-mandated delay (or the policy
//!   fallback) and try again;
//! - transient failures wait an exponentially growing delay, capped at the
//!   policy maximum;
//! - permanent failures return to the caller immediately.
//!
//! Each call owns its own [`RetryState`]; nothing is serialized globally,
//! so concurrent callers back off independently.
//!
//! The actual wire exchange is behind the [`ApiTransport`] trait, so the
//! engine sees "send JSON request, receive JSON response" and stays
//! testable without a network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};

// =============================================================================
// Transport seam
// =============================================================================

/// One-shot platform call, without retries.
///
/// Implementations classify every failure into the [`ApiError`] taxonomy;
/// on success they return the response's result payload.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Executes `method` with the given JSON parameters.
    async fn execute(&self, method: &str, params: Value) -> ApiResult<Value>;
}

// =============================================================================
// Retry policy and state
// =============================================================================

/// Retry/backoff parameters for outbound calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first failure; `None` retries
    /// forever. Long-poll fetches use `None`; the poller must never give
    /// up, only back off.
    pub max_attempts: Option<u32>,
    /// Delay before the first transient retry.
    pub initial_delay: Duration,
    /// Ceiling for the exponential backoff.
    pub max_delay: Duration,
    /// Backoff growth factor.
    pub multiplier: f64,
    /// Wait applied to a rate-limit response that carries no hint.
    pub rate_limit_fallback: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(3),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            rate_limit_fallback: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy that never gives up, for the long-poll fetch loop.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            ..Self::default()
        }
    }
}

/// Per-call retry bookkeeping: attempt counter and the next transient
/// delay. Created for each outbound call, dropped on success or once the
/// attempt budget is spent.
#[derive(Debug)]
struct RetryState {
    attempts: u32,
    next_delay: Duration,
}

impl RetryState {
    fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempts: 0,
            next_delay: policy.initial_delay,
        }
    }

    /// How long to wait before retrying after `error`, or `None` when the
    /// error is not retryable or the attempt budget is spent.
    fn backoff(&mut self, error: &ApiError, policy: &RetryPolicy) -> Option<Duration> {
        if !error.is_retryable() {
            return None;
        }
        self.attempts += 1;
        if let Some(max) = policy.max_attempts
            && self.attempts > max
        {
            return None;
        }
        match error {
            ApiError::RateLimited { retry_after } => {
                Some(retry_after.unwrap_or(policy.rate_limit_fallback))
            }
            _ => {
                let wait = self.next_delay;
                self.next_delay = std::cmp::min(
                    Duration::from_secs_f64(self.next_delay.as_secs_f64() * policy.multiplier),
                    policy.max_delay,
                );
                Some(wait)
            }
        }
    }
}

// =============================================================================
// ApiSender
// =============================================================================

/// Platform API sender with retry and rate-limit handling.
///
/// Cheap to clone; clones share the transport but every call still carries
/// independent retry state.
#[derive(Clone)]
pub struct ApiSender {
    transport: Arc<dyn ApiTransport>,
    policy: RetryPolicy,
}

impl ApiSender {
    /// Creates a sender over the given transport.
    pub fn new(transport: Arc<dyn ApiTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// The default policy applied by [`call`](Self::call).
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Calls a platform method with the sender's default (bounded) policy.
    pub async fn call(&self, method: &str, params: Value) -> ApiResult<Value> {
        self.call_with_policy(method, params, &self.policy).await
    }

    /// Calls a platform method under an explicit retry policy.
    pub async fn call_with_policy(
        &self,
        method: &str,
        params: Value,
        policy: &RetryPolicy,
    ) -> ApiResult<Value> {
        let mut state = RetryState::new(policy);
        loop {
            match self.transport.execute(method, params.clone()).await {
                Ok(result) => {
                    debug!(method, "API call succeeded");
                    return Ok(result);
                }
                Err(error) => match state.backoff(&error, policy) {
                    Some(wait) => {
                        warn!(
                            method,
                            error = %error,
                            wait_ms = wait.as_millis() as u64,
                            attempt = state.attempts,
                            "API call failed, backing off"
                        );
                        sleep(wait).await;
                    }
                    None => return Err(error),
                },
            }
        }
    }
}

impl std::fmt::Debug for ApiSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSender")
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Transport that replays a scripted sequence of outcomes and records
    /// every call it saw.
    struct ScriptedTransport {
        script: Mutex<VecDeque<ApiResult<Value>>>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedTransport {
        fn new(script: impl IntoIterator<Item = ApiResult<Value>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ApiTransport for ScriptedTransport {
        async fn execute(&self, method: &str, params: Value) -> ApiResult<Value> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params));
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(outcome) => outcome,
                // script exhausted: hang, letting callers race cancellation
                None => std::future::pending().await,
            }
        }
    }

    fn rate_limited(secs: u64) -> ApiError {
        ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(secs)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_hints_are_honored() {
        let transport = ScriptedTransport::new([
            Err(rate_limited(1)),
            Err(rate_limited(2)),
            Err(rate_limited(1)),
            Ok(json!([])),
        ]);
        let sender = ApiSender::new(transport.clone(), RetryPolicy::default());

        let started = Instant::now();
        let result = sender
            .call_with_policy("getUpdates", json!({}), &RetryPolicy::unbounded())
            .await;

        assert!(result.is_ok());
        // three rate-limit waits: 1s + 2s + 1s
        assert!(started.elapsed() >= Duration::from_secs(4));
        // three failed attempts plus the successful one
        assert_eq!(transport.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_never_retried() {
        let transport = ScriptedTransport::new([Err(ApiError::Api {
            code: 400,
            description: "chat not found".to_string(),
        })]);
        let sender = ApiSender::new(transport.clone(), RetryPolicy::default());

        let started = Instant::now();
        let err = sender.call("sendMessage", json!({})).await.unwrap_err();

        assert!(matches!(err, ApiError::Api { code: 400, .. }));
        assert_eq!(transport.call_count(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_backoff_grows_and_gives_up() {
        let transport = ScriptedTransport::new([
            Err(ApiError::transient("connection reset")),
            Err(ApiError::transient("connection reset")),
            Err(ApiError::transient("connection reset")),
            Err(ApiError::transient("connection reset")),
        ]);
        let sender = ApiSender::new(transport.clone(), RetryPolicy::default());

        let started = Instant::now();
        let err = sender.call("sendMessage", json!({})).await.unwrap_err();

        assert!(matches!(err, ApiError::Transient(_)));
        // default policy: three retries waiting 1s, 2s, 4s
        assert_eq!(transport.call_count(), 4);
        assert!(started.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: Some(4),
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(15),
            ..RetryPolicy::default()
        };
        let transport = ScriptedTransport::new([
            Err(ApiError::transient("i/o")),
            Err(ApiError::transient("i/o")),
            Err(ApiError::transient("i/o")),
            Ok(json!({"ok": true})),
        ]);
        let sender = ApiSender::new(transport.clone(), RetryPolicy::default());

        let started = Instant::now();
        sender
            .call_with_policy("getUpdates", json!({}), &policy)
            .await
            .unwrap();

        // waits are 10s, 15s, 15s; the cap keeps the third from growing
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(40));
        assert!(elapsed < Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn each_call_gets_fresh_retry_state() {
        let transport = ScriptedTransport::new([
            Err(ApiError::transient("first call, first try")),
            Ok(json!(1)),
            Err(ApiError::transient("second call, first try")),
            Ok(json!(2)),
        ]);
        let sender = ApiSender::new(transport.clone(), RetryPolicy::default());

        let started = Instant::now();
        sender.call("a", json!({})).await.unwrap();
        sender.call("b", json!({})).await.unwrap();

        // both calls waited the initial delay, not a compounded one
        assert_eq!(transport.call_count(), 4);
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
