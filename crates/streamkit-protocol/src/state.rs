//! Per-thread and root streaming state.
//!
//! State is treated as an immutable value. Threads are held behind `Arc` so a
//! reducer step only reallocates the threads it actually touched; consumers
//! detect change with `Arc::ptr_eq`.

use crate::event::AgentKitEvent;
use crate::ids::{MessageId, SeqNo, ThreadId};
use crate::message::ConversationMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Agent activity as seen by one thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Idle.
    #[default]
    Ready,
    /// Run started (or message sent), no output yet.
    Submitted,
    /// Output is arriving.
    Streaming,
    /// Halted on an error.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateError {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub recoverable: bool,
}

impl StateError {
    pub fn recoverable(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            timestamp,
            recoverable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadState {
    pub messages: Vec<ConversationMessage>,
    /// Events that arrived ahead of `next_expected_sequence`.
    pub event_buffer: BTreeMap<SeqNo, AgentKitEvent>,
    pub next_expected_sequence: SeqNo,
    /// The `run.started` that opened the current sequence epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch_anchor: Option<AgentKitEvent>,
    pub agent_status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_agent: Option<String>,
    pub has_new_messages: bool,
    pub last_activity: DateTime<Utc>,
    pub history_loaded: bool,
    pub run_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StateError>,
}

impl ThreadState {
    pub fn new(last_activity: DateTime<Utc>) -> Self {
        Self {
            messages: Vec::new(),
            event_buffer: BTreeMap::new(),
            next_expected_sequence: 0,
            epoch_anchor: None,
            agent_status: AgentStatus::Ready,
            current_agent: None,
            has_new_messages: false,
            last_activity,
            history_loaded: false,
            run_active: false,
            error: None,
        }
    }

    pub fn message(&self, id: &MessageId) -> Option<&ConversationMessage> {
        self.messages.iter().find(|message| &message.id == id)
    }

    pub fn message_mut(&mut self, id: &MessageId) -> Option<&mut ConversationMessage> {
        self.messages.iter_mut().find(|message| &message.id == id)
    }
}

/// Root state shared by every thread of a client session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingState {
    pub threads: BTreeMap<ThreadId, Arc<ThreadState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_thread_id: Option<ThreadId>,
    /// Number of raw realtime chunks already consumed.
    pub last_processed_index: usize,
    pub is_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_error: Option<StateError>,
}

impl StreamingState {
    pub fn new(current_thread_id: Option<ThreadId>) -> Self {
        Self {
            current_thread_id,
            ..Self::default()
        }
    }

    pub fn thread(&self, id: &ThreadId) -> Option<&ThreadState> {
        self.threads.get(id).map(Arc::as_ref)
    }

    pub fn current_thread(&self) -> Option<&ThreadState> {
        self.current_thread_id.as_ref().and_then(|id| self.thread(id))
    }

    pub fn is_current(&self, id: &ThreadId) -> bool {
        self.current_thread_id.as_ref() == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_thread_starts_ready_at_sequence_zero() {
        let thread = ThreadState::new(Utc::now());
        assert_eq!(thread.agent_status, AgentStatus::Ready);
        assert_eq!(thread.next_expected_sequence, 0);
        assert!(thread.event_buffer.is_empty());
        assert!(!thread.run_active);
    }

    #[test]
    fn current_thread_lookup() {
        let id = ThreadId::from("t1");
        let mut state = StreamingState::new(Some(id.clone()));
        assert!(state.current_thread().is_none());
        state
            .threads
            .insert(id.clone(), Arc::new(ThreadState::new(Utc::now())));
        assert!(state.current_thread().is_some());
        assert!(state.is_current(&id));
        assert!(!state.is_current(&ThreadId::from("t2")));
    }

    #[test]
    fn agent_status_serializes_lowercase() {
        let json = serde_json::to_string(&AgentStatus::Submitted).unwrap();
        assert_eq!(json, "\"submitted\"");
    }
}
