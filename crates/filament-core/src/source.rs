//! Update sources: long-polling and webhook push.
//!
//! Both variants end in the same place, the [`Dispatcher`], but differ in
//! how updates arrive:
//!
//! - [`Poller`] drives an unbounded long-poll loop against the platform,
//!   tracking the offset cursor so no update is fetched twice within a
//!   session.
//! - [`WebhookReceiver`] accepts updates pushed by an external HTTP server
//!   and hands them off without blocking the caller; the platform
//!   guarantees order and uniqueness in push mode, so there is no offset
//!   bookkeeping.
//!
//! # Offset discipline
//!
//! The poller requests updates strictly greater than its offset and only
//! advances the offset after a fetched batch has been fully handed to the
//! dispatcher. A crash between hand-off and advancement may redeliver
//! updates on restart, but never skips one (at-most-once accounting per
//! session, never-lost overall).

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::{ApiError, ApiResult};
use crate::sender::{ApiSender, RetryPolicy};
use crate::update::Update;

/// Default server-side wait for a long-poll fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// Poller
// =============================================================================

/// Long-polling update source.
///
/// The loop never terminates on rate limits or transient transport
/// failures; those are absorbed inside the fetch call, which runs under an
/// unbounded retry policy. The only error that surfaces from [`run`](Self::run)
/// is a permanent one (e.g. an invalid token), where retrying cannot help.
pub struct Poller {
    api: ApiSender,
    dispatcher: Arc<Dispatcher>,
    fetch_timeout: Duration,
    fetch_policy: RetryPolicy,
    offset: i64,
    cancel: CancellationToken,
}

impl Poller {
    /// Creates a poller feeding the given dispatcher.
    ///
    /// Fetches reuse the sender's backoff parameters but drop the attempt
    /// bound.
    pub fn new(api: ApiSender, dispatcher: Arc<Dispatcher>, fetch_timeout: Duration) -> Self {
        let fetch_policy = RetryPolicy {
            max_attempts: None,
            ..api.policy().clone()
        };
        Self {
            api,
            dispatcher,
            fetch_timeout,
            fetch_policy,
            offset: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the cancellation token, tying this poller to an external
    /// shutdown signal.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the loop at its next checkpoint.
    ///
    /// Cancelling never interrupts handler tasks already in flight; only
    /// new fetches cease.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The identifier of the last update handed to the dispatcher.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Runs the polling loop until cancelled or a permanent API error.
    pub async fn run(mut self) -> ApiResult<()> {
        info!(
            timeout_secs = self.fetch_timeout.as_secs(),
            "starting long-poll loop"
        );
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let batch = tokio::select! {
                _ = self.cancel.cancelled() => break,
                fetched = self.fetch() => fetched?,
            };

            let mut delivered_max: Option<i64> = None;
            for update in batch {
                let id = update.update_id;
                self.dispatcher.dispatch(update).await;
                delivered_max = Some(delivered_max.map_or(id, |max| max.max(id)));
            }
            // Advance only after the whole batch has been handed off, so a
            // crash mid-batch redelivers instead of skipping.
            if let Some(max_id) = delivered_max {
                self.offset = self.offset.max(max_id);
                debug!(offset = self.offset, "offset advanced");
            }
        }
        info!(offset = self.offset, "long-poll loop stopped");
        Ok(())
    }

    /// One long-poll fetch for updates strictly greater than the offset.
    ///
    /// A server-side timeout with no new data comes back as an empty batch;
    /// the loop then retries immediately without backoff.
    async fn fetch(&self) -> ApiResult<Vec<Update>> {
        let params = json!({
            "offset": self.offset + 1,
            "timeout": self.fetch_timeout.as_secs(),
        });
        let result = self
            .api
            .call_with_policy("getUpdates", params, &self.fetch_policy)
            .await?;

        let Value::Array(raw) = result else {
            return Err(ApiError::InvalidResponse(format!(
                "getUpdates result is not an array: {result}"
            )));
        };

        let mut batch = Vec::with_capacity(raw.len());
        for item in raw {
            match Update::from_value(item) {
                Ok(update) => batch.push(update),
                Err(error) => warn!(error = %error, "skipping unusable update envelope"),
            }
        }
        // The platform sends batches in ascending id order already; sorting
        // keeps the delivery invariant even if it ever does not.
        batch.sort_by_key(|update| update.update_id);
        Ok(batch)
    }
}

// =============================================================================
// Webhook receiver
// =============================================================================

/// Push-mode update source fed by an external HTTP server.
///
/// [`on_update`](Self::on_update) returns as soon as the update is queued,
/// independent of handler completion, so the HTTP collaborator can
/// acknowledge promptly. A pump task owned by the receiver drains the queue
/// into the dispatcher in arrival order.
#[derive(Clone)]
pub struct WebhookReceiver {
    queue: mpsc::UnboundedSender<Update>,
}

impl WebhookReceiver {
    /// Creates the receiver and spawns its pump task.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let (queue, mut updates) = mpsc::unbounded_channel::<Update>();
        tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                dispatcher.dispatch(update).await;
            }
            debug!("webhook pump stopped");
        });
        Self { queue }
    }

    /// Hands one pushed update to the dispatch engine. Never blocks.
    pub fn on_update(&self, update: Update) {
        if self.queue.send(update).is_err() {
            warn!("webhook pump is gone, dropping update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Router;
    use crate::sender::ApiTransport;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

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

        fn requested_offsets(&self) -> Vec<i64> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(method, _)| method == "getUpdates")
                .map(|(_, params)| params["offset"].as_i64().unwrap())
                .collect()
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
                None => std::future::pending().await,
            }
        }
    }

    fn raw_update(id: i64) -> Value {
        json!({
            "update_id": id,
            "message": {
                "message_id": id,
                "chat": {"id": 10, "type": "private"},
                "text": format!("msg {id}"),
            }
        })
    }

    /// Router with a catch-all command recording delivered update texts.
    fn recording_router(seen: Arc<Mutex<Vec<String>>>) -> Router {
        let mut router = Router::new();
        router
            .command(r".*", move |_, m| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(m.text().to_string());
                    Ok(())
                }
            })
            .unwrap();
        router
    }

    // Sleep-based wait: under paused time the runtime auto-advances the
    // clock once every task is blocked, which also lets the sender's
    // backoff sleeps elapse.
    async fn wait_until(condition: impl Fn() -> bool) {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn poller_requests_strictly_greater_than_delivered() {
        let transport = ScriptedTransport::new([
            Ok(json!([raw_update(1), raw_update(2), raw_update(3)])),
            Ok(json!([])),
            Ok(json!([raw_update(7)])),
        ]);
        let api = ApiSender::new(transport.clone(), RetryPolicy::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Arc::new(Dispatcher::new(
            recording_router(Arc::clone(&seen)),
            api.clone(),
            8,
        ));

        let poller = Poller::new(api, dispatcher, Duration::from_secs(1));
        let cancel = poller.cancel_token();
        let loop_task = tokio::spawn(poller.run());

        // fourth fetch hangs on the exhausted script, so all batches are in
        {
            let transport = Arc::clone(&transport);
            wait_until(move || transport.call_count() == 4).await;
        }

        // offsets requested: initial 1, then 4 (after max id 3), then 4
        // again (empty batch does not advance), then 8
        assert_eq!(transport.requested_offsets(), vec![1, 4, 4, 8]);

        {
            let seen = Arc::clone(&seen);
            wait_until(move || seen.lock().unwrap().len() == 4).await;
        }
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["msg 1", "msg 2", "msg 3", "msg 7"]
        );

        cancel.cancel();
        assert!(loop_task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn poller_surfaces_permanent_errors() {
        let transport = ScriptedTransport::new([Err(ApiError::Api {
            code: 401,
            description: "Unauthorized".to_string(),
        })]);
        let api = ApiSender::new(transport, RetryPolicy::default());
        let dispatcher = Arc::new(Dispatcher::new(
            Router::new(),
            api.clone(),
            4,
        ));

        let err = Poller::new(api, dispatcher, Duration::from_secs(1))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Api { code: 401, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn poller_absorbs_rate_limits_and_continues() {
        let transport = ScriptedTransport::new([
            Err(ApiError::RateLimited {
                retry_after: Some(Duration::from_secs(2)),
            }),
            Err(ApiError::transient("gateway timeout")),
            Ok(json!([raw_update(5)])),
        ]);
        let api = ApiSender::new(transport.clone(), RetryPolicy::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Arc::new(Dispatcher::new(
            recording_router(Arc::clone(&seen)),
            api.clone(),
            4,
        ));

        let poller = Poller::new(api, dispatcher, Duration::from_secs(1));
        let cancel = poller.cancel_token();
        let loop_task = tokio::spawn(poller.run());

        {
            let seen = Arc::clone(&seen);
            wait_until(move || !seen.lock().unwrap().is_empty()).await;
        }
        assert_eq!(*seen.lock().unwrap(), vec!["msg 5"]);

        cancel.cancel();
        assert!(loop_task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_poller_stops_cleanly() {
        // script exhausted immediately: the first fetch hangs forever
        let transport = ScriptedTransport::new([]);
        let api = ApiSender::new(transport, RetryPolicy::default());
        let dispatcher = Arc::new(Dispatcher::new(Router::new(), api.clone(), 4));

        let poller = Poller::new(api, dispatcher, Duration::from_secs(1));
        let cancel = poller.cancel_token();
        let loop_task = tokio::spawn(poller.run());

        tokio::task::yield_now().await;
        cancel.cancel();
        assert!(loop_task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn webhook_handoff_returns_before_handler_completes() {
        let gate = Arc::new(Notify::new());
        let finished = Arc::new(AtomicBool::new(false));

        let mut router = Router::new();
        {
            let gate = Arc::clone(&gate);
            let finished = Arc::clone(&finished);
            router
                .command(r".*", move |_, _| {
                    let gate = Arc::clone(&gate);
                    let finished = Arc::clone(&finished);
                    async move {
                        gate.notified().await;
                        finished.store(true, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .unwrap();
        }

        let transport = ScriptedTransport::new([]);
        let api = ApiSender::new(transport, RetryPolicy::default());
        let receiver = WebhookReceiver::new(Arc::new(Dispatcher::new(router, api, 4)));

        let update = Update::from_value(raw_update(1)).unwrap();
        receiver.on_update(update);
        // the hand-off returned while the handler is still gated
        assert!(!finished.load(Ordering::SeqCst));

        gate.notify_one();
        let finished_probe = Arc::clone(&finished);
        wait_until(move || finished_probe.load(Ordering::SeqCst)).await;
    }

    #[tokio::test]
    async fn webhook_preserves_arrival_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport::new([]);
        let api = ApiSender::new(transport, RetryPolicy::default());
        let receiver = WebhookReceiver::new(Arc::new(Dispatcher::new(
            recording_router(Arc::clone(&seen)),
            api,
            4,
        )));

        for id in [3, 1, 8] {
            receiver.on_update(Update::from_value(raw_update(id)).unwrap());
        }

        {
            let seen = Arc::clone(&seen);
            wait_until(move || seen.lock().unwrap().len() == 3).await;
        }
        // push mode trusts the platform's ordering: no reordering by id
        assert_eq!(*seen.lock().unwrap(), vec!["msg 3", "msg 1", "msg 8"]);
    }
}
