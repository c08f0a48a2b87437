use serde::{Deserialize, Serialize};
use serde_json::Value;
use streamkit_protocol::{AgentKitEvent, ThreadId};
use tracing::trace;

/// Normalize a raw realtime chunk into a typed event.
///
/// The chunk may be wrapped in a transport envelope `{ channel, topic, data }`;
/// when `data` itself carries a string `event` field it is unwrapped one level.
/// Returns `None` for malformed chunks, which callers drop silently.
pub fn map_to_network_event(input: &Value) -> Option<AgentKitEvent> {
    let candidate = unwrap_envelope(input);
    let event = AgentKitEvent::from_wire(candidate);
    if event.is_none() {
        trace!("dropping malformed realtime chunk");
    }
    event
}

fn unwrap_envelope(input: &Value) -> &Value {
    match input.get("data") {
        Some(inner) if inner.get("event").is_some_and(Value::is_string) => inner,
        _ => input,
    }
}

/// Map a batch of raw chunks, dropping the malformed ones.
pub fn map_chunks(chunks: &[Value]) -> Vec<AgentKitEvent> {
    chunks.iter().filter_map(map_to_network_event).collect()
}

/// Coarse pre-filter applied before dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ThreadId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// False only when a filter field is set and the event's `data` carries a
/// different string value for it. Events without the field always pass.
pub fn should_process_event(event: &AgentKitEvent, filter: &SubscriptionFilter) -> bool {
    if let Some(thread_id) = &filter.thread_id
        && let Some(event_thread) = event.data_str("threadId")
        && event_thread != thread_id.as_str()
    {
        return false;
    }
    if let Some(user_id) = &filter.user_id
        && let Some(event_user) = event.user_id()
        && event_user != user_id
    {
        return false;
    }
    true
}
