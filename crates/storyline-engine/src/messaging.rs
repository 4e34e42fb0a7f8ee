//! Messages and the event aggregator.
//!
//! Every side of the isolation boundary owns one [`EventAggregator`]. A single
//! dispatcher task delivers each message to every subscribed listener, in
//! send order, at most once. Only JSON text crosses the boundary: host
//! commands arrive through [`EventAggregator::send_json`] and events leave
//! through a [`RemoteListener`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use storyline_model::{FixtureModel, Specification, StepResult};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::batch::BatchRecord;
use crate::results::SpecResults;

/// Outcome of starting (or failing to start) the isolated engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemRecycled {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_name: Option<String>,
    #[serde(default)]
    pub fixtures: Vec<FixtureModel>,
}

impl SystemRecycled {
    pub fn started(system_name: impl Into<String>, fixtures: Vec<FixtureModel>) -> Self {
        Self {
            success: true,
            error: None,
            system_name: Some(system_name.into()),
            fixtures,
        }
    }

    pub fn failed(error: impl Into<String>, system_name: Option<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            system_name,
            fixtures: Vec::new(),
        }
    }
}

/// Commands from the host and events from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    SystemRecycled(SystemRecycled),

    /// Run one specification interactively.
    RunSpec { specification: Specification },

    CancelAll,

    BatchRunRequest { specifications: Vec<Specification> },

    SpecQueued { id: String, name: String },

    SpecExecutionStarted { id: String, attempt: u32 },

    StepProgress { id: String, step: StepResult },

    SpecExecutionCompleted { id: String, results: SpecResults },

    SpecRequeued { id: String, attempts: u32, results: SpecResults },

    SpecHandled { id: String, results: SpecResults },

    BatchRunResponse { records: Vec<BatchRecord> },

    EngineStopped,
}

impl Message {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Variant name, as used by the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::SystemRecycled(_) => "SystemRecycled",
            Message::RunSpec { .. } => "RunSpec",
            Message::CancelAll => "CancelAll",
            Message::BatchRunRequest { .. } => "BatchRunRequest",
            Message::SpecQueued { .. } => "SpecQueued",
            Message::SpecExecutionStarted { .. } => "SpecExecutionStarted",
            Message::StepProgress { .. } => "StepProgress",
            Message::SpecExecutionCompleted { .. } => "SpecExecutionCompleted",
            Message::SpecRequeued { .. } => "SpecRequeued",
            Message::SpecHandled { .. } => "SpecHandled",
            Message::BatchRunResponse { .. } => "BatchRunResponse",
            Message::EngineStopped => "EngineStopped",
        }
    }
}

/// Receives every message sent on an aggregator after it subscribed.
///
/// Handlers run on the dispatcher task; long work belongs in a spawned task.
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn handle(&self, message: &Message);
}

enum Dispatch {
    Message(Message),
    Subscribe(Arc<dyn MessageListener>),
    Flush(oneshot::Sender<()>),
}

/// Ordered publish/subscribe channel for one side of the boundary.
#[derive(Clone)]
pub struct EventAggregator {
    tx: mpsc::UnboundedSender<Dispatch>,
}

impl EventAggregator {
    /// Start the dispatcher task on the current runtime.
    pub fn start() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Dispatch>();

        tokio::spawn(async move {
            let mut listeners: Vec<Arc<dyn MessageListener>> = Vec::new();
            while let Some(dispatch) = rx.recv().await {
                match dispatch {
                    Dispatch::Message(message) => {
                        debug!(kind = message.kind(), listeners = listeners.len(), "dispatching");
                        for listener in &listeners {
                            listener.handle(&message).await;
                        }
                    }
                    Dispatch::Subscribe(listener) => listeners.push(listener),
                    Dispatch::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        Self { tx }
    }

    pub fn subscribe(&self, listener: Arc<dyn MessageListener>) {
        if self.tx.send(Dispatch::Subscribe(listener)).is_err() {
            warn!("event aggregator closed, subscription dropped");
        }
    }

    pub fn send(&self, message: Message) {
        if let Err(e) = self.tx.send(Dispatch::Message(message)) {
            if let Dispatch::Message(message) = e.0 {
                warn!(kind = message.kind(), "event aggregator closed, message dropped");
            }
        }
    }

    /// Parse a serialized message and send it.
    pub fn send_json(&self, json: &str) -> serde_json::Result<()> {
        let message = Message::from_json(json)?;
        self.send(message);
        Ok(())
    }

    /// Resolve once every message sent before this call was delivered. Must
    /// not be awaited from inside a listener.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Dispatch::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

impl std::fmt::Debug for EventAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventAggregator")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Host-side handle the isolated engine writes serialized events to.
#[derive(Debug, Clone)]
pub struct RemoteListener {
    tx: mpsc::UnboundedSender<String>,
}

impl RemoteListener {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// A listener and the receiver the host reads JSON events from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Serialize and forward one message.
    pub fn send(&self, message: &Message) {
        match message.to_json() {
            Ok(json) => {
                if self.tx.send(json).is_err() {
                    debug!(kind = message.kind(), "host stopped listening");
                }
            }
            Err(e) => warn!(kind = message.kind(), error = %e, "message could not be serialized"),
        }
    }
}

#[async_trait]
impl MessageListener for RemoteListener {
    async fn handle(&self, message: &Message) {
        self.send(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        kinds: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageListener for Recording {
        async fn handle(&self, message: &Message) {
            self.kinds.lock().await.push(message.kind().to_string());
        }
    }

    #[test]
    fn test_system_recycled_wire_shape() {
        let message = Message::SystemRecycled(SystemRecycled::failed(
            "boom",
            Some("WebSystem".into()),
        ));
        let json: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "SystemRecycled");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
        assert_eq!(json["system_name"], "WebSystem");

        let back = Message::from_json(&message.to_json().unwrap()).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn test_unit_and_struct_variants_round_trip() {
        for message in [
            Message::CancelAll,
            Message::EngineStopped,
            Message::SpecQueued {
                id: "s1".into(),
                name: "Spec".into(),
            },
        ] {
            let json = message.to_json().unwrap();
            assert!(json.contains(&format!("\"type\":\"{}\"", message.kind())));
            assert_eq!(Message::from_json(&json).unwrap(), message);
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(Message::from_json(r#"{"type":"Reboot"}"#).is_err());
    }

    #[tokio::test]
    async fn test_delivery_in_send_order_to_every_listener() {
        let bus = EventAggregator::start();
        let first = Arc::new(Recording::default());
        let second = Arc::new(Recording::default());
        bus.subscribe(first.clone());
        bus.subscribe(second.clone());

        bus.send(Message::CancelAll);
        bus.send_json(r#"{"type":"SpecQueued","id":"s1","name":"Spec"}"#)
            .unwrap();
        bus.send(Message::EngineStopped);
        bus.flush().await;

        let expected = vec!["CancelAll", "SpecQueued", "EngineStopped"];
        assert_eq!(*first.kinds.lock().await, expected);
        assert_eq!(*second.kinds.lock().await, expected);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_only_later_messages() {
        let bus = EventAggregator::start();
        bus.send(Message::CancelAll);
        let late = Arc::new(Recording::default());
        bus.subscribe(late.clone());
        bus.send(Message::EngineStopped);
        bus.flush().await;
        assert_eq!(*late.kinds.lock().await, vec!["EngineStopped"]);
    }

    #[tokio::test]
    async fn test_remote_listener_forwards_json() {
        let bus = EventAggregator::start();
        let (listener, mut rx) = RemoteListener::channel();
        bus.subscribe(Arc::new(listener));
        bus.send(Message::EngineStopped);
        let json = rx.recv().await.unwrap();
        assert_eq!(json, r#"{"type":"EngineStopped"}"#);
    }
}
