//! Boundary ports implemented outside the core.
//!
//! - [`ConnectionPort`] delivers raw realtime chunks and opaque connection
//!   state values through callbacks. It is synchronous: subscribing returns a
//!   handle immediately and delivery happens on the implementation's own task.
//! - [`TransportPort`] is the request/response API used by the send and
//!   history flows. Traits use `async-trait` for dyn-dispatch.

use crate::error::{ConnectionError, TransportResult};
use crate::ids::{MessageId, PartId, RunId, ThreadId};
use crate::message::ConversationMessage;
use crate::thread::Thread;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Receives a batch of raw, possibly-enveloped chunks.
pub type MessageCallback = Arc<dyn Fn(Vec<Value>) + Send + Sync>;
/// Receives an opaque connection-state value.
pub type StateChangeCallback = Arc<dyn Fn(Value) + Send + Sync>;

pub struct SubscribeRequest {
    pub channel: String,
    pub on_message: MessageCallback,
    pub on_state_change: Option<StateChangeCallback>,
    pub debug: bool,
}

/// Handle to a live subscription. `unsubscribe` must be idempotent.
pub trait ConnectionHandle: Send + Sync {
    fn unsubscribe(&self);
}

pub trait ConnectionPort: Send + Sync {
    fn subscribe(
        &self,
        request: SubscribeRequest,
    ) -> Result<Box<dyn ConnectionHandle>, ConnectionError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub thread_id: ThreadId,
    pub message_id: MessageId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_state: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub thread_id: ThreadId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchThreadsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl Default for FetchThreadsRequest {
    fn default() -> Self {
        Self {
            user_id: None,
            limit: 20,
            cursor: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadPage {
    pub threads: Vec<Thread>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateThreadRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveToolCallRequest {
    pub thread_id: ThreadId,
    pub tool_call_id: PartId,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[async_trait]
pub trait TransportPort: Send + Sync {
    async fn send_message(&self, request: SendMessageRequest)
    -> TransportResult<SendMessageResponse>;
    async fn fetch_threads(&self, request: FetchThreadsRequest) -> TransportResult<ThreadPage>;
    async fn fetch_history(&self, thread_id: &ThreadId)
    -> TransportResult<Vec<ConversationMessage>>;
    async fn create_thread(&self, request: CreateThreadRequest) -> TransportResult<Thread>;
    async fn delete_thread(&self, thread_id: &ThreadId) -> TransportResult<()>;
    async fn approve_tool_call(&self, request: ApproveToolCallRequest) -> TransportResult<()>;

    async fn cancel_message(&self, _thread_id: &ThreadId) -> TransportResult<()> {
        Ok(())
    }
}
