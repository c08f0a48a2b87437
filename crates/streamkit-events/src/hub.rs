use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use streamkit_protocol::{ConnectionError, ConnectionHandle, ConnectionPort, SubscribeRequest};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum HubPayload {
    Chunks(Vec<Value>),
    State(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HubMessage {
    pub channel: String,
    pub payload: HubPayload,
}

/// In-process fan-out of raw realtime chunks, keyed by channel name.
#[derive(Clone, Debug)]
pub struct ChunkHub {
    sender: broadcast::Sender<HubMessage>,
}

impl ChunkHub {
    /// `buffer` is the per-receiver backlog; zero is raised to one.
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self { sender }
    }

    /// Publish a batch of raw chunks. Returns the number of live receivers.
    pub fn publish(&self, channel: impl Into<String>, chunks: Vec<Value>) -> usize {
        self.send(HubMessage {
            channel: channel.into(),
            payload: HubPayload::Chunks(chunks),
        })
    }

    /// Publish an opaque connection-state value.
    pub fn publish_state(&self, channel: impl Into<String>, state: Value) -> usize {
        self.send(HubMessage {
            channel: channel.into(),
            payload: HubPayload::State(state),
        })
    }

    fn send(&self, message: HubMessage) -> usize {
        self.sender.send(message).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubMessage> {
        self.sender.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<HubMessage> {
        BroadcastStream::new(self.sender.subscribe())
    }
}

/// Connection port backed by a [`ChunkHub`].
///
/// Each subscription runs a forwarding task on the current tokio runtime.
/// The task reports `"Active"` through `on_state_change` once it starts.
#[derive(Clone, Debug)]
pub struct BroadcastConnection {
    hub: ChunkHub,
}

impl BroadcastConnection {
    pub fn new(hub: ChunkHub) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &ChunkHub {
        &self.hub
    }
}

impl ConnectionPort for BroadcastConnection {
    fn subscribe(
        &self,
        request: SubscribeRequest,
    ) -> Result<Box<dyn ConnectionHandle>, ConnectionError> {
        let SubscribeRequest {
            channel,
            on_message,
            on_state_change,
            debug,
        } = request;

        let runtime = Handle::try_current().map_err(|error| ConnectionError::SubscribeFailed {
            channel: channel.clone(),
            reason: error.to_string(),
        })?;

        // Subscribe before spawning so nothing published after this call is missed.
        let mut stream = self.hub.subscribe_stream();
        let task_channel = channel.clone();
        let task = runtime.spawn(async move {
            if let Some(on_state_change) = &on_state_change {
                on_state_change(json!("Active"));
            }
            while let Some(item) = stream.next().await {
                match item {
                    Ok(message) if message.channel == task_channel => match message.payload {
                        HubPayload::Chunks(chunks) => {
                            if debug {
                                debug!(channel = %task_channel, count = chunks.len(), "chunks received");
                            }
                            on_message(chunks);
                        }
                        HubPayload::State(state) => {
                            if let Some(on_state_change) = &on_state_change {
                                on_state_change(state);
                            }
                        }
                    },
                    Ok(_) => {}
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(channel = %task_channel, skipped, "subscriber lagged; chunks dropped");
                    }
                }
            }
        });

        debug!(channel = %channel, "broadcast subscription started");
        Ok(Box::new(BroadcastHandle {
            channel,
            task: Mutex::new(Some(task.abort_handle())),
        }))
    }
}

struct BroadcastHandle {
    channel: String,
    task: Mutex<Option<AbortHandle>>,
}

impl ConnectionHandle for BroadcastHandle {
    fn unsubscribe(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!(channel = %self.channel, "broadcast subscription stopped");
        }
    }
}

impl Drop for BroadcastHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn request(
        channel: &str,
        chunks_tx: mpsc::UnboundedSender<Vec<Value>>,
        states_tx: mpsc::UnboundedSender<Value>,
    ) -> SubscribeRequest {
        SubscribeRequest {
            channel: channel.to_owned(),
            on_message: Arc::new(move |chunks| {
                let _ = chunks_tx.send(chunks);
            }),
            on_state_change: Some(Arc::new(move |state| {
                let _ = states_tx.send(state);
            })),
            debug: true,
        }
    }

    #[tokio::test]
    async fn subscription_forwards_only_its_channel() {
        let hub = ChunkHub::new(16);
        let connection = BroadcastConnection::new(hub.clone());
        let (chunks_tx, mut chunks_rx) = mpsc::unbounded_channel();
        let (states_tx, mut states_rx) = mpsc::unbounded_channel();
        let handle = connection
            .subscribe(request("user:u1", chunks_tx, states_tx))
            .unwrap();

        let active = timeout(Duration::from_secs(1), states_rx.recv()).await.unwrap();
        assert_eq!(active, Some(json!("Active")));

        hub.publish("user:u2", vec![json!({"ignored": true})]);
        hub.publish("user:u1", vec![json!({"n": 1})]);
        let batch = timeout(Duration::from_secs(1), chunks_rx.recv()).await.unwrap();
        assert_eq!(batch, Some(vec![json!({"n": 1})]));

        hub.publish_state("user:u1", json!("Closed"));
        let closed = timeout(Duration::from_secs(1), states_rx.recv()).await.unwrap();
        assert_eq!(closed, Some(json!("Closed")));

        handle.unsubscribe();
        handle.unsubscribe();
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = ChunkHub::new(16);
        let connection = BroadcastConnection::new(hub.clone());
        let (chunks_tx, mut chunks_rx) = mpsc::unbounded_channel();
        let (states_tx, _states_rx) = mpsc::unbounded_channel();
        let handle = connection
            .subscribe(request("user:u1", chunks_tx, states_tx))
            .unwrap();
        handle.unsubscribe();
        tokio::task::yield_now().await;

        hub.publish("user:u1", vec![json!({"n": 1})]);
        // The aborted task drops its sender, so the channel closes without a batch.
        let next = timeout(Duration::from_secs(1), chunks_rx.recv()).await.unwrap();
        assert_eq!(next, None);
    }

    #[test]
    fn subscribe_outside_runtime_fails() {
        let connection = BroadcastConnection::new(ChunkHub::new(4));
        let (chunks_tx, _chunks_rx) = mpsc::unbounded_channel();
        let (states_tx, _states_rx) = mpsc::unbounded_channel();
        let result = connection.subscribe(request("user:u1", chunks_tx, states_tx));
        assert!(matches!(
            result,
            Err(ConnectionError::SubscribeFailed { .. })
        ));
    }

    #[test]
    fn publish_without_receivers_reports_zero() {
        let hub = ChunkHub::new(4);
        assert_eq!(hub.publish("c", vec![]), 0);
    }

    #[tokio::test]
    async fn zero_capacity_hub_still_delivers() {
        let hub = ChunkHub::new(0);
        let mut receiver = hub.subscribe();
        assert_eq!(hub.publish("c", vec![serde_json::json!({"n": 1})]), 1);
        let message = receiver.recv().await.unwrap();
        assert_eq!(message.channel, "c");
    }
}
