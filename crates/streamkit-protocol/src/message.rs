//! Conversation messages and their incrementally-built parts.

use crate::ids::{MessageId, PartId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Delivery status. Only meaningful for optimistically-created user messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    #[default]
    Sent,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartStatus {
    #[default]
    Streaming,
    Complete,
}

/// Tool-call lifecycle:
/// `input-streaming → input-available → [awaiting-approval] → executing → output-available`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallState {
    #[default]
    InputStreaming,
    InputAvailable,
    AwaitingApproval,
    Executing,
    OutputAvailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub id: PartId,
    pub content: String,
    #[serde(default)]
    pub status: PartStatus,
}

impl TextPart {
    pub fn streaming(id: PartId) -> Self {
        Self {
            id,
            content: String::new(),
            status: PartStatus::Streaming,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPart {
    pub tool_call_id: PartId,
    pub tool_name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub state: ToolCallState,
    /// Concatenated raw argument deltas.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub input_buffer: String,
    /// Concatenated raw output deltas.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output_buffer: String,
}

impl ToolCallPart {
    pub fn new(tool_call_id: PartId, tool_name: impl Into<String>) -> Self {
        Self {
            tool_call_id,
            tool_name: tool_name.into(),
            input: Value::Null,
            output: None,
            error: None,
            state: ToolCallState::InputStreaming,
            input_buffer: String::new(),
            output_buffer: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPart {
    pub id: PartId,
    pub name: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePart {
    pub id: PartId,
    pub url: String,
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePart {
    pub id: PartId,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningPart {
    pub id: PartId,
    pub content: String,
    #[serde(default)]
    pub status: PartStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPart {
    pub id: PartId,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPart {
    pub id: PartId,
    pub error: String,
    #[serde(default)]
    pub recoverable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitlStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

/// Human-in-the-loop approval request attached to a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitlPart {
    pub id: PartId,
    pub tool_call_id: PartId,
    pub status: HitlStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A fragment of a message. The reducer only builds `Text` and `ToolCall`;
/// the remaining shapes are populated by the surrounding application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text(TextPart),
    ToolCall(ToolCallPart),
    Data(DataPart),
    File(FilePart),
    Source(SourcePart),
    Reasoning(ReasoningPart),
    Status(StatusPart),
    Error(ErrorPart),
    Hitl(HitlPart),
}

impl MessagePart {
    pub fn id(&self) -> &PartId {
        match self {
            Self::Text(part) => &part.id,
            Self::ToolCall(part) => &part.tool_call_id,
            Self::Data(part) => &part.id,
            Self::File(part) => &part.id,
            Self::Source(part) => &part.id,
            Self::Reasoning(part) => &part.id,
            Self::Status(part) => &part.id,
            Self::Error(part) => &part.id,
            Self::Hitl(part) => &part.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: MessageId,
    pub role: MessageRole,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_state: Option<Value>,
}

impl ConversationMessage {
    /// Optimistic user message holding a single completed text part.
    pub fn user(
        id: MessageId,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
        client_state: Option<Value>,
    ) -> Self {
        let part_id = PartId::from_string(format!("{id}-text"));
        Self {
            id,
            role: MessageRole::User,
            parts: vec![MessagePart::Text(TextPart {
                id: part_id,
                content: content.into(),
                status: PartStatus::Complete,
            })],
            agent_id: None,
            timestamp,
            status: MessageStatus::Sending,
            client_state,
        }
    }

    /// Empty assistant message that streaming parts get appended to.
    pub fn assistant(id: MessageId, agent_id: Option<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            role: MessageRole::Assistant,
            parts: Vec::new(),
            agent_id,
            timestamp,
            status: MessageStatus::Sent,
            client_state: None,
        }
    }

    pub fn part(&self, id: &PartId) -> Option<&MessagePart> {
        self.parts.iter().find(|part| part.id() == id)
    }

    pub fn part_mut(&mut self, id: &PartId) -> Option<&mut MessagePart> {
        self.parts.iter_mut().find(|part| part.id() == id)
    }

    pub fn text_part_mut(&mut self, id: &PartId) -> Option<&mut TextPart> {
        match self.part_mut(id) {
            Some(MessagePart::Text(part)) => Some(part),
            _ => None,
        }
    }

    pub fn tool_call_mut(&mut self, id: &PartId) -> Option<&mut ToolCallPart> {
        match self.part_mut(id) {
            Some(MessagePart::ToolCall(part)) => Some(part),
            _ => None,
        }
    }

    /// Concatenated content of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text(text) => Some(text.content.as_str()),
                _ => None,
            })
            .collect()
    }
}
