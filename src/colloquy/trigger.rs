//! External trigger dispatch.
//!
//! A [`TriggerEvent`] is a request from the outside world to start a topic
//! run. The [`Dispatcher`] gates events on an expected channel, spawns
//! accepted runs fire-and-forget, and hands back a [`DispatchAck`] carrying
//! the run id and a [`CancelToken`] so the caller can stop the run later.
//! Run failures are logged, never surfaced to the trigger source.
//!
//! With the `webhook-server` feature enabled, [`webhook::router`] exposes the
//! dispatcher over HTTP in the shape the upstream messaging webhook sends.

use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::colloquy::orchestrator::Orchestrator;

/// Cooperative cancellation handle shared between a dispatcher and the run
/// it spawned. Cloning yields another handle to the same flag.
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request cancellation. Idempotent; the run stops at its next turn
    /// boundary.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// An external request to start a run.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerEvent {
    /// Topic text the run substitutes into role and task templates.
    pub topic: String,
    /// Identifier of whoever triggered the event.
    pub user: String,
    /// Channel the event arrived on; filtered against the dispatcher's
    /// expected channel.
    pub channel: String,
}

/// The dispatcher's immediate answer to a trigger.
#[derive(Debug, Clone)]
pub enum DispatchAck {
    /// A run was spawned; it continues in the background.
    Accepted { run_id: Uuid, cancel: CancelToken },
    /// The event did not pass the channel gate.
    Ignored,
}

/// Gates trigger events and spawns runs fire-and-forget.
pub struct Dispatcher {
    orchestrator: Arc<Orchestrator>,
    /// Events from any other channel are ignored. `None` accepts everything.
    expected_channel: Option<String>,
}

impl Dispatcher {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            expected_channel: None,
        }
    }

    /// Only accept events arriving on the given channel.
    pub fn with_channel_filter(mut self, channel: impl Into<String>) -> Self {
        self.expected_channel = Some(channel.into());
        self
    }

    /// Handle one trigger event. Returns immediately; the run itself is
    /// spawned onto the runtime and its outcome is only logged.
    pub fn dispatch(&self, event: TriggerEvent) -> DispatchAck {
        if let Some(expected) = &self.expected_channel {
            if &event.channel != expected {
                log::info!(
                    "ignoring trigger from channel '{}' (expected '{}')",
                    event.channel,
                    expected
                );
                return DispatchAck::Ignored;
            }
        }

        let run_id = Uuid::new_v4();
        let cancel = CancelToken::new();
        let orchestrator = self.orchestrator.clone();
        let topic = event.topic.clone();
        let token = cancel.clone();
        log::info!(
            "accepted trigger from '{}' on '{}'; spawning run {} for topic '{}'",
            event.user,
            event.channel,
            run_id,
            topic
        );
        tokio::spawn(async move {
            match orchestrator.run_tagged(run_id, &topic, &token).await {
                Ok(result) if result.cancelled => {
                    log::info!(
                        "run {} cancelled after {} conversation(s)",
                        run_id,
                        result.conversations.len()
                    );
                }
                Ok(result) => {
                    log::info!(
                        "run {} completed with {} conversation(s)",
                        run_id,
                        result.conversations.len()
                    );
                }
                Err(err) => {
                    log::error!("run {} failed: {}", run_id, err);
                }
            }
        });

        DispatchAck::Accepted { run_id, cancel }
    }
}

#[cfg(feature = "webhook-server")]
pub mod webhook {
    //! HTTP surface for the dispatcher, shaped after the upstream messaging
    //! webhook: `GET /` answers a health probe, `POST /` carries the event
    //! inside a `payload` envelope with the topic in its `text` field.

    use axum::extract::State;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde::Deserialize;
    use std::sync::Arc;

    use super::{DispatchAck, Dispatcher, TriggerEvent};

    #[derive(Debug, Deserialize)]
    struct WebhookEnvelope {
        payload: WebhookPayload,
    }

    #[derive(Debug, Deserialize)]
    struct WebhookPayload {
        text: String,
        user: String,
        channel: String,
    }

    /// Build the webhook router over a shared dispatcher.
    pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
        Router::new()
            .route("/", get(health).post(receive))
            .with_state(dispatcher)
    }

    async fn health() -> Json<serde_json::Value> {
        Json(serde_json::json!({ "status": "ok" }))
    }

    async fn receive(
        State(dispatcher): State<Arc<Dispatcher>>,
        Json(envelope): Json<WebhookEnvelope>,
    ) -> Json<serde_json::Value> {
        let event = TriggerEvent {
            topic: envelope.payload.text,
            user: envelope.payload.user,
            channel: envelope.payload.channel,
        };
        match dispatcher.dispatch(event) {
            DispatchAck::Accepted { run_id, .. } => Json(serde_json::json!({
                "status": "accepted",
                "run_id": run_id.to_string(),
            })),
            DispatchAck::Ignored => Json(serde_json::json!({ "status": "ignored" })),
        }
    }
}
