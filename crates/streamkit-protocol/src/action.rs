//! Reducer actions.
//!
//! Forward-compatible: an action whose `"type"` is unknown (or whose payload
//! does not decode) deserializes into `Unknown` instead of failing. The
//! reducer treats `Unknown` as a no-op and returns the same state reference.

use crate::event::AgentKitEvent;
use crate::ids::{MessageId, PartId, ThreadId};
use crate::message::ConversationMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum StreamingAction {
    /// A batch of mapped realtime events. `cursor_advance` is the number of
    /// raw chunks the batch consumed, including chunks the mapper dropped.
    RealtimeMessagesReceived {
        messages: Vec<AgentKitEvent>,
        cursor_advance: usize,
    },
    /// Opaque connection-state value reported by the connection port.
    ConnectionStateChanged {
        state: Value,
    },
    ConnectionFailed {
        error: String,
        at: DateTime<Utc>,
    },
    /// `at` stamps the thread if switching to it creates one.
    SetCurrentThread {
        thread_id: ThreadId,
        at: DateTime<Utc>,
    },
    MessageSent {
        thread_id: ThreadId,
        message_id: MessageId,
        message: String,
        client_state: Option<Value>,
        timestamp: DateTime<Utc>,
    },
    MessageSendSuccess {
        thread_id: ThreadId,
        message_id: MessageId,
    },
    MessageSendFailed {
        thread_id: ThreadId,
        message_id: MessageId,
        error: String,
        at: DateTime<Utc>,
    },
    ReplaceThreadMessages {
        thread_id: ThreadId,
        messages: Vec<ConversationMessage>,
        at: DateTime<Utc>,
    },
    ClearThreadMessages {
        thread_id: ThreadId,
        at: DateTime<Utc>,
    },
    ClearThreadError {
        thread_id: ThreadId,
    },
    ClearConnectionError,
    MarkThreadViewed {
        thread_id: ThreadId,
    },
    CreateThread {
        thread_id: ThreadId,
        at: DateTime<Utc>,
    },
    RemoveThread {
        thread_id: ThreadId,
    },
    ToolApprovalRequested {
        thread_id: ThreadId,
        tool_call_id: PartId,
    },
    ToolApprovalResolved {
        thread_id: ThreadId,
        tool_call_id: PartId,
        approved: bool,
    },
    /// Written back out as `{ "type": action_type, ..payload }`.
    #[serde(untagged, serialize_with = "serialize_unknown")]
    Unknown {
        action_type: String,
        payload: Value,
    },
}

fn serialize_unknown<S>(action_type: &str, payload: &Value, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut object = match payload {
        Value::Object(fields) => fields.clone(),
        Value::Null => Map::new(),
        other => Map::from_iter([("payload".to_owned(), other.clone())]),
    };
    object.insert("type".to_owned(), Value::String(action_type.to_owned()));
    object.serialize(serializer)
}

impl StreamingAction {
    /// Realtime batch where every raw chunk mapped to an event.
    pub fn realtime(messages: Vec<AgentKitEvent>) -> Self {
        let cursor_advance = messages.len();
        Self::RealtimeMessagesReceived {
            messages,
            cursor_advance,
        }
    }

    /// Wire `type` tag, mainly for logging.
    pub fn action_type(&self) -> &str {
        match self {
            Self::RealtimeMessagesReceived { .. } => "REALTIME_MESSAGES_RECEIVED",
            Self::ConnectionStateChanged { .. } => "CONNECTION_STATE_CHANGED",
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::SetCurrentThread { .. } => "SET_CURRENT_THREAD",
            Self::MessageSent { .. } => "MESSAGE_SENT",
            Self::MessageSendSuccess { .. } => "MESSAGE_SEND_SUCCESS",
            Self::MessageSendFailed { .. } => "MESSAGE_SEND_FAILED",
            Self::ReplaceThreadMessages { .. } => "REPLACE_THREAD_MESSAGES",
            Self::ClearThreadMessages { .. } => "CLEAR_THREAD_MESSAGES",
            Self::ClearThreadError { .. } => "CLEAR_THREAD_ERROR",
            Self::ClearConnectionError => "CLEAR_CONNECTION_ERROR",
            Self::MarkThreadViewed { .. } => "MARK_THREAD_VIEWED",
            Self::CreateThread { .. } => "CREATE_THREAD",
            Self::RemoveThread { .. } => "REMOVE_THREAD",
            Self::ToolApprovalRequested { .. } => "TOOL_APPROVAL_REQUESTED",
            Self::ToolApprovalResolved { .. } => "TOOL_APPROVAL_RESOLVED",
            Self::Unknown { action_type, .. } => action_type,
        }
    }
}

/// Decoding helper holding only the known variants.
#[derive(Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
enum StreamingActionKnown {
    RealtimeMessagesReceived {
        messages: Vec<AgentKitEvent>,
        #[serde(default)]
        cursor_advance: Option<usize>,
    },
    ConnectionStateChanged {
        state: Value,
    },
    ConnectionFailed {
        error: String,
        at: DateTime<Utc>,
    },
    SetCurrentThread {
        thread_id: ThreadId,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    MessageSent {
        thread_id: ThreadId,
        message_id: MessageId,
        message: String,
        #[serde(default)]
        client_state: Option<Value>,
        timestamp: DateTime<Utc>,
    },
    MessageSendSuccess {
        thread_id: ThreadId,
        message_id: MessageId,
    },
    MessageSendFailed {
        thread_id: ThreadId,
        message_id: MessageId,
        error: String,
        at: DateTime<Utc>,
    },
    ReplaceThreadMessages {
        thread_id: ThreadId,
        messages: Vec<ConversationMessage>,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    ClearThreadMessages {
        thread_id: ThreadId,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    ClearThreadError {
        thread_id: ThreadId,
    },
    ClearConnectionError,
    MarkThreadViewed {
        thread_id: ThreadId,
    },
    CreateThread {
        thread_id: ThreadId,
        at: DateTime<Utc>,
    },
    RemoveThread {
        thread_id: ThreadId,
    },
    ToolApprovalRequested {
        thread_id: ThreadId,
        tool_call_id: PartId,
    },
    ToolApprovalResolved {
        thread_id: ThreadId,
        tool_call_id: PartId,
        approved: bool,
    },
}

impl From<StreamingActionKnown> for StreamingAction {
    fn from(known: StreamingActionKnown) -> Self {
        use StreamingActionKnown as K;
        match known {
            K::RealtimeMessagesReceived {
                messages,
                cursor_advance,
            } => Self::RealtimeMessagesReceived {
                cursor_advance: cursor_advance.unwrap_or(messages.len()),
                messages,
            },
            K::ConnectionStateChanged { state } => Self::ConnectionStateChanged { state },
            K::ConnectionFailed { error, at } => Self::ConnectionFailed { error, at },
            K::SetCurrentThread { thread_id, at } => Self::SetCurrentThread {
                thread_id,
                at: at.unwrap_or_else(Utc::now),
            },
            K::MessageSent {
                thread_id,
                message_id,
                message,
                client_state,
                timestamp,
            } => Self::MessageSent {
                thread_id,
                message_id,
                message,
                client_state,
                timestamp,
            },
            K::MessageSendSuccess {
                thread_id,
                message_id,
            } => Self::MessageSendSuccess {
                thread_id,
                message_id,
            },
            K::MessageSendFailed {
                thread_id,
                message_id,
                error,
                at,
            } => Self::MessageSendFailed {
                thread_id,
                message_id,
                error,
                at,
            },
            K::ReplaceThreadMessages {
                thread_id,
                messages,
                at,
            } => Self::ReplaceThreadMessages {
                thread_id,
                messages,
                at: at.unwrap_or_else(Utc::now),
            },
            K::ClearThreadMessages { thread_id, at } => Self::ClearThreadMessages {
                thread_id,
                at: at.unwrap_or_else(Utc::now),
            },
            K::ClearThreadError { thread_id } => Self::ClearThreadError { thread_id },
            K::ClearConnectionError => Self::ClearConnectionError,
            K::MarkThreadViewed { thread_id } => Self::MarkThreadViewed { thread_id },
            K::CreateThread { thread_id, at } => Self::CreateThread { thread_id, at },
            K::RemoveThread { thread_id } => Self::RemoveThread { thread_id },
            K::ToolApprovalRequested {
                thread_id,
                tool_call_id,
            } => Self::ToolApprovalRequested {
                thread_id,
                tool_call_id,
            },
            K::ToolApprovalResolved {
                thread_id,
                tool_call_id,
                approved,
            } => Self::ToolApprovalResolved {
                thread_id,
                tool_call_id,
                approved,
            },
        }
    }
}

impl<'de> Deserialize<'de> for StreamingAction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        match serde_json::from_value::<StreamingActionKnown>(raw.clone()) {
            Ok(known) => Ok(known.into()),
            Err(_) => {
                let action_type = raw
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("UNKNOWN")
                    .to_owned();
                let mut payload = raw;
                if let Some(object) = payload.as_object_mut() {
                    object.remove("type");
                }
                Ok(Self::Unknown {
                    action_type,
                    payload,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_action_decodes_camel_case_fields() {
        let action: StreamingAction = serde_json::from_value(json!({
            "type": "SET_CURRENT_THREAD",
            "threadId": "t1",
            "at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            action,
            StreamingAction::SetCurrentThread {
                thread_id: ThreadId::from("t1"),
                at,
            }
        );
    }

    #[test]
    fn missing_timestamp_is_stamped_on_decode() {
        let action: StreamingAction =
            serde_json::from_value(json!({"type": "CLEAR_THREAD_MESSAGES", "threadId": "t1"}))
                .unwrap();
        assert!(matches!(action, StreamingAction::ClearThreadMessages { .. }));
    }

    #[test]
    fn unknown_action_serializes_back_to_its_wire_shape() {
        let wire = json!({"type": "TELEPORT", "to": "mars"});
        let action: StreamingAction = serde_json::from_value(wire.clone()).unwrap();
        let encoded = serde_json::to_value(&action).unwrap();
        assert_eq!(encoded, wire);
        let decoded: StreamingAction = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, action);
        assert_eq!(decoded.action_type(), "TELEPORT");
    }

    #[test]
    fn unknown_action_type_becomes_unknown() {
        let action: StreamingAction =
            serde_json::from_value(json!({"type": "TELEPORT", "to": "mars"})).unwrap();
        let StreamingAction::Unknown {
            action_type,
            payload,
        } = action
        else {
            panic!("should be Unknown");
        };
        assert_eq!(action_type, "TELEPORT");
        assert_eq!(payload, json!({"to": "mars"}));
    }

    #[test]
    fn realtime_batch_defaults_cursor_advance_to_batch_len() {
        let action: StreamingAction = serde_json::from_value(json!({
            "type": "REALTIME_MESSAGES_RECEIVED",
            "messages": [
                {"event": "stream.ended", "data": {"threadId": "t1"}, "timestamp": 1, "sequenceNumber": 0}
            ]
        }))
        .unwrap();
        assert!(matches!(
            action,
            StreamingAction::RealtimeMessagesReceived {
                cursor_advance: 1,
                ..
            }
        ));
    }

    #[test]
    fn serialized_action_carries_screaming_tag() {
        let value = serde_json::to_value(StreamingAction::ClearConnectionError).unwrap();
        assert_eq!(value["type"], "CLEAR_CONNECTION_ERROR");
        let value = serde_json::to_value(StreamingAction::MarkThreadViewed {
            thread_id: ThreadId::from("t1"),
        })
        .unwrap();
        assert_eq!(value["threadId"], "t1");
    }
}
