//! Realtime wire events.
//!
//! The realtime channel delivers JSON envelopes of the shape
//! `{ event, data, timestamp, sequenceNumber, id? }`. Known `event` names
//! decode into typed payloads; anything else (including known names whose
//! `data` does not validate) is kept as `EventKind::Custom` so it still
//! reaches consumers and still counts toward sequencing.

use crate::ids::{EventId, MessageId, PartId, RunId, SeqNo, ThreadId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

pub const RUN_STARTED: &str = "run.started";
pub const RUN_COMPLETED: &str = "run.completed";
pub const STREAM_ENDED: &str = "stream.ended";
pub const PART_CREATED: &str = "part.created";
pub const TEXT_DELTA: &str = "text.delta";
pub const TOOL_CALL_ARGUMENTS_DELTA: &str = "tool_call.arguments.delta";
pub const TOOL_CALL_OUTPUT_DELTA: &str = "tool_call.output.delta";
pub const PART_COMPLETED: &str = "part.completed";

/// Which kind of run a lifecycle event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunScope {
    Network,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStarted {
    pub scope: RunScope,
    #[serde(default)]
    pub run_id: Option<RunId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_run_id: Option<RunId>,
}

impl RunStarted {
    /// Network runs and standalone agent runs anchor a new sequence epoch.
    /// Agent runs with a parent are nested inside the active run and do not.
    pub fn starts_epoch(&self) -> bool {
        match self.scope {
            RunScope::Network => true,
            RunScope::Agent => self.parent_run_id.is_none(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunCompleted {
    pub scope: Option<RunScope>,
    pub run_id: Option<RunId>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamEnded {
    pub run_id: Option<RunId>,
}

/// Part shapes the stream can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartType {
    Text,
    ToolCall,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartCreated {
    pub message_id: MessageId,
    pub part_id: PartId,
    #[serde(rename = "type")]
    pub part_type: PartType,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl PartCreated {
    /// Tool name announced for a tool-call part, if any.
    pub fn tool_name(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get("toolName"))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDelta {
    pub message_id: MessageId,
    pub part_id: PartId,
    pub delta: String,
}

/// Shared payload of `tool_call.arguments.delta` and `tool_call.output.delta`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallDelta {
    #[serde(default)]
    pub message_id: Option<MessageId>,
    pub part_id: PartId,
    pub delta: String,
}

/// Part shapes `part.completed` can finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletedPartType {
    Text,
    ToolCall,
    ToolOutput,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartCompleted {
    #[serde(default)]
    pub message_id: Option<MessageId>,
    pub part_id: PartId,
    #[serde(rename = "type")]
    pub part_type: CompletedPartType,
    #[serde(default)]
    pub final_content: Option<Value>,
}

/// Typed view of an event's `data`, keyed by the wire `event` name.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EventKind {
    RunStarted(RunStarted),
    RunCompleted(RunCompleted),
    StreamEnded(StreamEnded),
    PartCreated(PartCreated),
    TextDelta(TextDelta),
    ToolCallArgumentsDelta(ToolCallDelta),
    ToolCallOutputDelta(ToolCallDelta),
    PartCompleted(PartCompleted),
    /// Unknown event name, or a known name whose data failed validation.
    Custom { event: String },
}

fn typed<T: DeserializeOwned>(data: &Value) -> Option<T> {
    T::deserialize(data).ok()
}

impl EventKind {
    /// Decode `data` for the given event name, falling back to `Custom`.
    pub fn decode(event: &str, data: &Value) -> Self {
        let known = match event {
            RUN_STARTED => typed(data).map(Self::RunStarted),
            RUN_COMPLETED => typed(data).map(Self::RunCompleted),
            STREAM_ENDED => typed(data).map(Self::StreamEnded),
            PART_CREATED => typed(data).map(Self::PartCreated),
            TEXT_DELTA => typed(data).map(Self::TextDelta),
            TOOL_CALL_ARGUMENTS_DELTA => typed(data).map(Self::ToolCallArgumentsDelta),
            TOOL_CALL_OUTPUT_DELTA => typed(data).map(Self::ToolCallOutputDelta),
            PART_COMPLETED => typed(data).map(Self::PartCompleted),
            _ => None,
        };
        known.unwrap_or_else(|| Self::Custom {
            event: event.to_owned(),
        })
    }

    /// The wire `event` name.
    pub fn name(&self) -> &str {
        match self {
            Self::RunStarted(_) => RUN_STARTED,
            Self::RunCompleted(_) => RUN_COMPLETED,
            Self::StreamEnded(_) => STREAM_ENDED,
            Self::PartCreated(_) => PART_CREATED,
            Self::TextDelta(_) => TEXT_DELTA,
            Self::ToolCallArgumentsDelta(_) => TOOL_CALL_ARGUMENTS_DELTA,
            Self::ToolCallOutputDelta(_) => TOOL_CALL_OUTPUT_DELTA,
            Self::PartCompleted(_) => PART_COMPLETED,
            Self::Custom { event } => event,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom { .. })
    }
}

/// A validated realtime event.
///
/// `data` is kept verbatim so custom events lose nothing; `kind` is the typed
/// view used by the reducer.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentKitEvent {
    pub id: EventId,
    pub kind: EventKind,
    pub data: Value,
    /// Milliseconds since UNIX epoch. Informational only, never used for ordering.
    pub timestamp: i64,
    pub sequence_number: SeqNo,
}

fn as_sequence(value: &Value) -> Option<SeqNo> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    (f >= 0.0 && f.fract() == 0.0).then_some(f as SeqNo)
}

impl AgentKitEvent {
    /// Build an event from an already-unwrapped wire object.
    ///
    /// Returns `None` unless `event` is a string and `timestamp` and
    /// `sequenceNumber` are numbers. A missing `id` defaults to
    /// `"{event}:{sequenceNumber}"`.
    pub fn from_wire(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let event = object.get("event")?.as_str()?;
        let timestamp = object.get("timestamp")?.as_f64()?;
        let sequence_number = as_sequence(object.get("sequenceNumber")?)?;
        let data = object
            .get("data")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        let id = object
            .get("id")
            .and_then(Value::as_str)
            .map(EventId::from)
            .unwrap_or_else(|| EventId::from_string(format!("{event}:{sequence_number}")));

        Some(Self {
            id,
            kind: EventKind::decode(event, &data),
            data,
            timestamp: timestamp as i64,
            sequence_number,
        })
    }

    /// Render back to the wire envelope.
    pub fn to_wire(&self) -> Value {
        json!({
            "event": self.name(),
            "data": self.data,
            "timestamp": self.timestamp,
            "sequenceNumber": self.sequence_number,
            "id": self.id,
        })
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    /// String field from `data`, if present and a string.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn thread_id(&self) -> Option<ThreadId> {
        self.data_str("threadId").map(ThreadId::from)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.data_str("userId")
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or_default()
    }
}

impl Serialize for AgentKitEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AgentKitEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        Self::from_wire(&raw).ok_or_else(|| {
            serde::de::Error::custom(
                "malformed event: expected string `event`, numeric `timestamp` and `sequenceNumber`",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(event: &str, seq: u64, data: Value) -> Value {
        json!({
            "event": event,
            "data": data,
            "timestamp": 1_700_000_000_000_i64,
            "sequenceNumber": seq,
        })
    }

    #[test]
    fn part_created_decodes_typed() {
        let raw = wire(
            PART_CREATED,
            1,
            json!({"threadId": "t1", "messageId": "m1", "partId": "p1", "type": "tool-call",
                   "metadata": {"toolName": "search"}}),
        );
        let event = AgentKitEvent::from_wire(&raw).unwrap();
        let EventKind::PartCreated(created) = &event.kind else {
            panic!("expected part.created, got {:?}", event.kind);
        };
        assert_eq!(created.part_type, PartType::ToolCall);
        assert_eq!(created.tool_name(), Some("search"));
        assert_eq!(event.thread_id(), Some(ThreadId::from("t1")));
    }

    #[test]
    fn invalid_known_payload_falls_back_to_custom() {
        let raw = wire(PART_CREATED, 1, json!({"messageId": "m1", "type": "image"}));
        let event = AgentKitEvent::from_wire(&raw).unwrap();
        assert_eq!(
            event.kind,
            EventKind::Custom {
                event: PART_CREATED.to_owned()
            }
        );
        assert_eq!(event.name(), PART_CREATED);
    }

    #[test]
    fn unknown_event_becomes_custom_and_keeps_data() {
        let raw = wire("future.feature", 4, json!({"threadId": "t1", "key": "value"}));
        let event = AgentKitEvent::from_wire(&raw).unwrap();
        assert!(event.kind.is_custom());
        assert_eq!(event.data["key"], "value");
    }

    #[test]
    fn missing_id_defaults_to_name_and_sequence() {
        let event = AgentKitEvent::from_wire(&wire(STREAM_ENDED, 9, json!({}))).unwrap();
        assert_eq!(event.id.as_str(), "stream.ended:9");
        assert!(matches!(event.kind, EventKind::StreamEnded(_)));
    }

    #[test]
    fn envelope_fields_are_required() {
        assert!(AgentKitEvent::from_wire(&json!({"event": "text.delta", "timestamp": 1})).is_none());
        assert!(
            AgentKitEvent::from_wire(&json!({"event": 3, "timestamp": 1, "sequenceNumber": 1}))
                .is_none()
        );
        assert!(
            AgentKitEvent::from_wire(
                &json!({"event": "x", "timestamp": "now", "sequenceNumber": 1})
            )
            .is_none()
        );
        assert!(AgentKitEvent::from_wire(&json!("text.delta")).is_none());
    }

    #[test]
    fn integral_float_sequence_is_accepted() {
        let raw = json!({"event": "x", "timestamp": 1.0, "sequenceNumber": 3.0});
        assert_eq!(AgentKitEvent::from_wire(&raw).unwrap().sequence_number, 3);
        let raw = json!({"event": "x", "timestamp": 1.0, "sequenceNumber": -1});
        assert!(AgentKitEvent::from_wire(&raw).is_none());
    }

    #[test]
    fn run_started_epoch_rules() {
        let network: RunStarted = serde_json::from_value(json!({"scope": "network"})).unwrap();
        assert!(network.starts_epoch());
        let standalone: RunStarted =
            serde_json::from_value(json!({"scope": "agent", "name": "triage"})).unwrap();
        assert!(standalone.starts_epoch());
        let nested: RunStarted =
            serde_json::from_value(json!({"scope": "agent", "parentRunId": "r0"})).unwrap();
        assert!(!nested.starts_epoch());
    }

    #[test]
    fn wire_roundtrip_through_serde() {
        let raw = wire(TEXT_DELTA, 2, json!({"messageId": "m1", "partId": "p1", "delta": "Hi"}));
        let event: AgentKitEvent = serde_json::from_value(raw).unwrap();
        let back: AgentKitEvent = serde_json::from_value(serde_json::to_value(&event).unwrap()).unwrap();
        assert_eq!(event, back);
        assert!(serde_json::from_value::<AgentKitEvent>(json!({"event": "x"})).is_err());
    }
}
