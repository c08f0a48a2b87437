//! # streamkit-reducer
//!
//! Pure state transitions for the multi-thread streaming view.
//!
//! [`reduce`] takes the current [`StreamingState`] and one
//! [`StreamingAction`] and returns the next state. It never fails and never
//! performs I/O. State is shared through `Arc`: an action that changes nothing
//! returns the very same `Arc`, and threads an action does not touch keep
//! their previous `Arc`, so consumers detect change with `Arc::ptr_eq`.

mod apply;
mod sequencing;
mod tool_input;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use streamkit_protocol::{
    AgentKitEvent, AgentStatus, ConversationMessage, MessagePart, MessageStatus, PartId,
    StateError, StreamingAction, StreamingState, ThreadId, ThreadState, ToolCallPart,
    ToolCallState,
};
use tracing::debug;

use crate::apply::ApplyContext;
use crate::sequencing::Disposition;

/// Error text recorded on a tool call whose approval was denied.
pub const APPROVAL_DENIED: &str = "denied";

/// Apply one action. `debug` enables per-event sequencing diagnostics.
pub fn reduce(
    state: &Arc<StreamingState>,
    action: StreamingAction,
    debug: bool,
) -> Arc<StreamingState> {
    match action {
        StreamingAction::RealtimeMessagesReceived {
            messages,
            cursor_advance,
        } => receive_events(state, messages, cursor_advance, debug),
        StreamingAction::ConnectionStateChanged { state: raw } => {
            let connected = is_connected_value(&raw);
            if state.is_connected == connected {
                return Arc::clone(state);
            }
            edit_root(state, |next| next.is_connected = connected)
        }
        StreamingAction::ConnectionFailed { error, at } => edit_root(state, |next| {
            next.is_connected = false;
            next.connection_error = Some(StateError::recoverable(error, at));
        }),
        StreamingAction::ClearConnectionError => {
            if state.connection_error.is_none() {
                return Arc::clone(state);
            }
            edit_root(state, |next| next.connection_error = None)
        }
        StreamingAction::SetCurrentThread { thread_id, at } => {
            set_current_thread(state, thread_id, at)
        }
        StreamingAction::MessageSent {
            thread_id,
            message_id,
            message,
            client_state,
            timestamp,
        } => edit_thread(state, &thread_id, Some(timestamp), |thread| {
            let known = thread.message(&message_id).is_some();
            if known && thread.agent_status == AgentStatus::Submitted {
                return false;
            }
            if !known {
                thread.messages.push(ConversationMessage::user(
                    message_id,
                    message,
                    timestamp,
                    client_state,
                ));
                thread.last_activity = timestamp;
            }
            thread.agent_status = AgentStatus::Submitted;
            true
        }),
        StreamingAction::MessageSendSuccess {
            thread_id,
            message_id,
        } => edit_thread(state, &thread_id, None, |thread| {
            match thread.message_mut(&message_id) {
                Some(message) if message.status != MessageStatus::Sent => {
                    message.status = MessageStatus::Sent;
                    true
                }
                _ => false,
            }
        }),
        StreamingAction::MessageSendFailed {
            thread_id,
            message_id,
            error,
            at,
        } => edit_thread(state, &thread_id, Some(at), |thread| {
            if let Some(message) = thread.message_mut(&message_id) {
                message.status = MessageStatus::Failed;
            }
            thread.error = Some(StateError::recoverable(error, at));
            thread.agent_status = AgentStatus::Error;
            true
        }),
        StreamingAction::ReplaceThreadMessages {
            thread_id,
            messages,
            at,
        } => edit_thread(state, &thread_id, Some(at), |thread| {
            thread.messages = messages;
            thread.history_loaded = true;
            thread.error = None;
            thread.agent_status = AgentStatus::Ready;
            true
        }),
        StreamingAction::ClearThreadMessages { thread_id, at } => {
            edit_thread(state, &thread_id, Some(at), |thread| {
                thread.messages.clear();
                thread.event_buffer.clear();
                thread.next_expected_sequence = 0;
                thread.epoch_anchor = None;
                thread.error = None;
                thread.agent_status = AgentStatus::Ready;
                true
            })
        }
        StreamingAction::ClearThreadError { thread_id } => {
            edit_thread(state, &thread_id, None, |thread| thread.error.take().is_some())
        }
        StreamingAction::MarkThreadViewed { thread_id } => {
            edit_thread(state, &thread_id, None, |thread| {
                std::mem::take(&mut thread.has_new_messages)
            })
        }
        StreamingAction::CreateThread { thread_id, at } => {
            if state.threads.contains_key(&thread_id) {
                return Arc::clone(state);
            }
            edit_root(state, |next| {
                let mut thread = ThreadState::new(at);
                thread.history_loaded = true;
                next.threads.insert(thread_id, Arc::new(thread));
            })
        }
        StreamingAction::RemoveThread { thread_id } => {
            if !state.threads.contains_key(&thread_id) {
                return Arc::clone(state);
            }
            edit_root(state, |next| {
                next.threads.remove(&thread_id);
            })
        }
        StreamingAction::ToolApprovalRequested {
            thread_id,
            tool_call_id,
        } => edit_thread(state, &thread_id, None, |thread| {
            match find_tool_call(thread, &tool_call_id) {
                Some(part)
                    if !matches!(
                        part.state,
                        ToolCallState::AwaitingApproval | ToolCallState::OutputAvailable
                    ) =>
                {
                    part.state = ToolCallState::AwaitingApproval;
                    true
                }
                _ => false,
            }
        }),
        StreamingAction::ToolApprovalResolved {
            thread_id,
            tool_call_id,
            approved,
        } => edit_thread(state, &thread_id, None, |thread| {
            match find_tool_call(thread, &tool_call_id) {
                Some(part) if part.state == ToolCallState::AwaitingApproval => {
                    if approved {
                        part.state = ToolCallState::Executing;
                    } else {
                        part.error = Some(APPROVAL_DENIED.to_owned());
                        part.state = ToolCallState::OutputAvailable;
                    }
                    true
                }
                _ => false,
            }
        }),
        StreamingAction::Unknown { action_type, .. } => {
            if debug {
                debug!(%action_type, "unknown action ignored");
            }
            Arc::clone(state)
        }
    }
}

/// Map an opaque connection-state value: the string `"Active"` or a non-zero
/// number means connected; anything else means disconnected.
pub fn is_connected_value(value: &Value) -> bool {
    match value {
        Value::String(text) => text == "Active",
        Value::Number(number) => number.as_f64().is_some_and(|code| code != 0.0),
        _ => false,
    }
}

fn receive_events(
    state: &Arc<StreamingState>,
    messages: Vec<AgentKitEvent>,
    cursor_advance: usize,
    debug: bool,
) -> Arc<StreamingState> {
    let mut next = StreamingState::clone(state);
    next.last_processed_index = next.last_processed_index.saturating_add(cursor_advance);
    let mut changed = cursor_advance > 0;

    for event in messages {
        let Some(thread_id) = event.thread_id() else {
            if debug {
                debug!(event = event.name(), sequence = event.sequence_number, "event without threadId dropped");
            }
            continue;
        };
        let ctx = ApplyContext {
            is_current: next.is_current(&thread_id),
            debug,
        };

        let disposition = match next.threads.get(&thread_id) {
            Some(thread) => sequencing::classify(thread, &event),
            None => sequencing::classify(&ThreadState::new(event.occurred_at()), &event),
        };
        if disposition == Disposition::Discard && next.threads.contains_key(&thread_id) {
            if debug {
                debug!(thread_id = %thread_id, sequence = event.sequence_number, "stale event discarded");
            }
            continue;
        }

        let at = event.occurred_at();
        let thread = next
            .threads
            .entry(thread_id)
            .or_insert_with(|| Arc::new(ThreadState::new(at)));
        sequencing::ingest(Arc::make_mut(thread), event, disposition, &ctx);
        changed = true;
    }

    if changed {
        Arc::new(next)
    } else {
        Arc::clone(state)
    }
}

fn set_current_thread(
    state: &Arc<StreamingState>,
    thread_id: ThreadId,
    at: DateTime<Utc>,
) -> Arc<StreamingState> {
    if state.is_current(&thread_id) {
        return Arc::clone(state);
    }
    edit_root(state, |next| {
        next.threads
            .entry(thread_id.clone())
            .or_insert_with(|| Arc::new(ThreadState::new(at)));
        next.current_thread_id = Some(thread_id);
    })
}

fn edit_root<F>(state: &Arc<StreamingState>, edit: F) -> Arc<StreamingState>
where
    F: FnOnce(&mut StreamingState),
{
    let mut next = StreamingState::clone(state);
    edit(&mut next);
    Arc::new(next)
}

/// Edit one thread copy-on-write. `create_at` materializes a missing thread;
/// without it a missing thread makes the action a no-op. `edit` returns
/// whether it changed anything; an unchanged existing thread yields the same
/// state reference.
fn edit_thread<F>(
    state: &Arc<StreamingState>,
    thread_id: &ThreadId,
    create_at: Option<DateTime<Utc>>,
    edit: F,
) -> Arc<StreamingState>
where
    F: FnOnce(&mut ThreadState) -> bool,
{
    let existing = state.threads.get(thread_id);
    let mut thread = match (existing, create_at) {
        (Some(thread), _) => ThreadState::clone(thread),
        (None, Some(at)) => ThreadState::new(at),
        (None, None) => return Arc::clone(state),
    };
    if !edit(&mut thread) && existing.is_some() {
        return Arc::clone(state);
    }
    let mut next = StreamingState::clone(state);
    next.threads.insert(thread_id.clone(), Arc::new(thread));
    Arc::new(next)
}

fn find_tool_call<'a>(thread: &'a mut ThreadState, id: &PartId) -> Option<&'a mut ToolCallPart> {
    thread
        .messages
        .iter_mut()
        .flat_map(|message| message.parts.iter_mut())
        .find_map(|part| match part {
            MessagePart::ToolCall(tool_call) if &tool_call.tool_call_id == id => Some(tool_call),
            _ => None,
        })
}
