//! # streamkit-engine
//!
//! [`StreamingEngine`] owns the current [`StreamingState`] and is its only
//! mutator. Every change goes through [`StreamingEngine::dispatch`], which runs
//! the reducer and notifies listeners only when the state reference changed.
//!
//! The engine also wires one external connection at a time into its realtime
//! ingestion path, and drives the send/history flows against a transport.

use std::sync::{Arc, Weak};

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use streamkit_events::{SubscriptionFilter, map_to_network_event, should_process_event};
use streamkit_protocol::{
    AgentKitEvent, ApproveToolCallRequest, ConnectionError, ConnectionHandle, ConnectionPort,
    MessageCallback, SendMessageRequest, SendMessageResponse, StateChangeCallback,
    StreamingAction, StreamingState, SubscribeRequest, ThreadId, TransportPort, TransportResult,
};
use streamkit_reducer::reduce;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_STATE_CHANNEL_LABEL: &str = "streamkit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Enables per-event reducer diagnostics.
    pub debug: bool,
    pub current_thread_id: Option<ThreadId>,
    /// Label attached to this engine's log spans.
    pub state_channel_label: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debug: false,
            current_thread_id: None,
            state_channel_label: DEFAULT_STATE_CHANNEL_LABEL.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamingEngineBuilder {
    config: EngineConfig,
    initial_state: Option<StreamingState>,
}

impl StreamingEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn current_thread(mut self, thread_id: impl Into<ThreadId>) -> Self {
        self.config.current_thread_id = Some(thread_id.into());
        self
    }

    pub fn state_channel_label(mut self, label: impl Into<String>) -> Self {
        self.config.state_channel_label = label.into();
        self
    }

    /// Start from a previously captured state instead of an empty one.
    pub fn initial_state(mut self, state: StreamingState) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn build(self) -> StreamingEngine {
        let mut state = self.initial_state.unwrap_or_default();
        if let Some(thread_id) = &self.config.current_thread_id {
            state.current_thread_id = Some(thread_id.clone());
        }
        StreamingEngine::new(self.config, state)
    }
}

/// Parameters for [`StreamingEngine::subscribe_with_connection`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams {
    pub channel: String,
    pub debug: bool,
    /// Events failing this filter are skipped before dispatch.
    pub filter: SubscriptionFilter,
}

impl ConnectionParams {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ..Self::default()
        }
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn filter(mut self, filter: SubscriptionFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Callback invoked with the new state after every effective dispatch.
pub type StateListener = Arc<dyn Fn(&Arc<StreamingState>) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: IndexMap<u64, StateListener>,
}

/// Returned by [`StreamingEngine::subscribe`].
///
/// Dropping it does not unsubscribe; call [`ListenerHandle::unsubscribe`].
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct ListenerHandle {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl ListenerHandle {
    /// Remove the listener. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().entries.shift_remove(&self.id);
        }
    }
}

struct ActiveSubscription {
    channel: String,
    handle: Box<dyn ConnectionHandle>,
}

pub struct StreamingEngine {
    config: EngineConfig,
    state: RwLock<Arc<StreamingState>>,
    listeners: Arc<Mutex<Listeners>>,
    watch: watch::Sender<Arc<StreamingState>>,
    active: Mutex<Option<ActiveSubscription>>,
}

impl StreamingEngine {
    pub fn new(config: EngineConfig, state: StreamingState) -> Self {
        let state = Arc::new(state);
        let (watch, _) = watch::channel(Arc::clone(&state));
        Self {
            config,
            state: RwLock::new(state),
            listeners: Arc::new(Mutex::new(Listeners::default())),
            watch,
            active: Mutex::new(None),
        }
    }

    pub fn builder() -> StreamingEngineBuilder {
        StreamingEngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current state snapshot.
    pub fn state(&self) -> Arc<StreamingState> {
        Arc::clone(&self.state.read())
    }

    /// Run the reducer and publish the result if the state reference changed.
    pub fn dispatch(&self, action: StreamingAction) -> Arc<StreamingState> {
        let action_type = self
            .config
            .debug
            .then(|| action.action_type().to_owned());
        let next = {
            let mut current = self.state.write();
            let next = reduce(&current, action, self.config.debug);
            if Arc::ptr_eq(&current, &next) {
                if let Some(action_type) = action_type {
                    debug!(engine = %self.config.state_channel_label, %action_type, "dispatch left state unchanged");
                }
                return next;
            }
            *current = Arc::clone(&next);
            // Published under the write lock so the watch never lags `state()`.
            self.watch.send_replace(Arc::clone(&next));
            next
        };

        // Listeners run outside the lock so they may dispatch or unsubscribe.
        let listeners: Vec<StateListener> =
            self.listeners.lock().entries.values().cloned().collect();
        for listener in &listeners {
            listener(&next);
        }
        next
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&Arc<StreamingState>) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.insert(id, Arc::new(listener));
        ListenerHandle {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().entries.len()
    }

    /// Receiver that always holds the latest state.
    pub fn watch_state(&self) -> watch::Receiver<Arc<StreamingState>> {
        self.watch.subscribe()
    }

    /// Stream of states, starting with the current one.
    pub fn state_stream(&self) -> WatchStream<Arc<StreamingState>> {
        WatchStream::new(self.watch.subscribe())
    }

    /// Dispatch a batch of already-mapped events.
    pub fn handle_realtime_messages(&self, events: Vec<AgentKitEvent>) -> Arc<StreamingState> {
        self.dispatch(StreamingAction::realtime(events))
    }

    /// Map and filter a batch of raw chunks, then dispatch it. Every chunk
    /// counts toward `last_processed_index`, including dropped ones.
    pub fn handle_raw_chunks(
        &self,
        chunks: &[Value],
        filter: &SubscriptionFilter,
    ) -> Arc<StreamingState> {
        if chunks.is_empty() {
            return self.state();
        }
        let messages: Vec<AgentKitEvent> = chunks
            .iter()
            .filter_map(map_to_network_event)
            .filter(|event| should_process_event(event, filter))
            .collect();
        if self.config.debug && messages.len() < chunks.len() {
            debug!(
                engine = %self.config.state_channel_label,
                received = chunks.len(),
                kept = messages.len(),
                "realtime chunks filtered"
            );
        }
        self.dispatch(StreamingAction::RealtimeMessagesReceived {
            messages,
            cursor_advance: chunks.len(),
        })
    }

    /// Subscribe `connection` and route its chunks and state changes into this
    /// engine. Any previous subscription is torn down first.
    ///
    /// Callbacks hold a weak reference, so a live subscription never keeps the
    /// engine alive.
    #[instrument(
        skip(self, connection, params),
        fields(engine = %self.config.state_channel_label, channel = %params.channel)
    )]
    pub fn subscribe_with_connection(
        self: &Arc<Self>,
        connection: &dyn ConnectionPort,
        params: ConnectionParams,
    ) -> Result<(), ConnectionError> {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            debug!(previous = %previous.channel, "replacing active subscription");
            previous.handle.unsubscribe();
        }

        let ConnectionParams {
            channel,
            debug,
            filter,
        } = params;

        let engine = Arc::downgrade(self);
        let on_message: MessageCallback = Arc::new(move |chunks: Vec<Value>| {
            if let Some(engine) = engine.upgrade() {
                engine.handle_raw_chunks(&chunks, &filter);
            }
        });
        let engine = Arc::downgrade(self);
        let on_state_change: StateChangeCallback = Arc::new(move |state: Value| {
            if let Some(engine) = engine.upgrade() {
                engine.dispatch(StreamingAction::ConnectionStateChanged { state });
            }
        });

        let request = SubscribeRequest {
            channel: channel.clone(),
            on_message,
            on_state_change: Some(on_state_change),
            debug,
        };
        match connection.subscribe(request) {
            Ok(handle) => {
                info!("realtime subscription active");
                *active = Some(ActiveSubscription { channel, handle });
                Ok(())
            }
            Err(error) => {
                warn!(%error, "realtime subscription failed");
                drop(active);
                self.dispatch(StreamingAction::ConnectionFailed {
                    error: error.to_string(),
                    at: Utc::now(),
                });
                Err(error)
            }
        }
    }

    /// Channel of the active subscription, if any.
    pub fn active_channel(&self) -> Option<String> {
        self.active
            .lock()
            .as_ref()
            .map(|subscription| subscription.channel.clone())
    }

    /// Unsubscribe the active connection, if any.
    pub fn teardown(&self) {
        let previous = self.active.lock().take();
        if let Some(previous) = previous {
            previous.handle.unsubscribe();
            debug!(engine = %self.config.state_channel_label, channel = %previous.channel, "subscription torn down");
        }
    }

    /// Optimistically record a user message, send it, and record the outcome.
    /// Failures are surfaced on the thread rather than returned.
    #[instrument(
        skip(self, transport, request),
        fields(
            engine = %self.config.state_channel_label,
            thread_id = %request.thread_id,
            message_id = %request.message_id
        )
    )]
    pub async fn send_message(
        &self,
        transport: &dyn TransportPort,
        request: SendMessageRequest,
    ) -> Option<SendMessageResponse> {
        let thread_id = request.thread_id.clone();
        let message_id = request.message_id.clone();
        self.dispatch(StreamingAction::MessageSent {
            thread_id: thread_id.clone(),
            message_id: message_id.clone(),
            message: request.content.clone(),
            client_state: request.client_state.clone(),
            timestamp: Utc::now(),
        });

        match transport.send_message(request).await {
            Ok(response) => {
                debug!(run_id = ?response.run_id, "message accepted");
                self.dispatch(StreamingAction::MessageSendSuccess {
                    thread_id,
                    message_id,
                });
                Some(response)
            }
            Err(error) => {
                warn!(%error, recoverable = error.is_recoverable(), "message send failed");
                self.dispatch(StreamingAction::MessageSendFailed {
                    thread_id,
                    message_id,
                    error: error.to_string(),
                    at: Utc::now(),
                });
                None
            }
        }
    }

    /// Replace a thread's messages with its stored history. Returns the number
    /// of messages loaded.
    #[instrument(
        skip(self, transport),
        fields(engine = %self.config.state_channel_label, thread_id = %thread_id)
    )]
    pub async fn load_history(
        &self,
        transport: &dyn TransportPort,
        thread_id: &ThreadId,
    ) -> TransportResult<usize> {
        let messages = transport.fetch_history(thread_id).await.inspect_err(|error| {
            warn!(%error, recoverable = error.is_recoverable(), "history fetch failed");
        })?;
        let count = messages.len();
        self.dispatch(StreamingAction::ReplaceThreadMessages {
            thread_id: thread_id.clone(),
            messages,
            at: Utc::now(),
        });
        debug!(count, "history loaded");
        Ok(count)
    }

    /// Forward an approval decision and, once accepted, resolve the gated tool
    /// call locally.
    #[instrument(
        skip(self, transport, request),
        fields(
            engine = %self.config.state_channel_label,
            thread_id = %request.thread_id,
            tool_call_id = %request.tool_call_id,
            approved = request.approved
        )
    )]
    pub async fn approve_tool_call(
        &self,
        transport: &dyn TransportPort,
        request: ApproveToolCallRequest,
    ) -> TransportResult<()> {
        let thread_id = request.thread_id.clone();
        let tool_call_id = request.tool_call_id.clone();
        let approved = request.approved;
        transport
            .approve_tool_call(request)
            .await
            .inspect_err(|error| warn!(%error, "approval rejected by transport"))?;
        self.dispatch(StreamingAction::ToolApprovalResolved {
            thread_id,
            tool_call_id,
            approved,
        });
        Ok(())
    }
}

impl Drop for StreamingEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}
