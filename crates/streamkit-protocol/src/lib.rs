//! # streamkit-protocol: shared contract types
//!
//! This crate defines the types every other streamkit crate speaks: the
//! realtime wire events, conversation messages and their streaming parts, the
//! per-thread and root streaming state, reducer actions, thread metadata, and
//! the connection/transport ports implemented outside the core.
//!
//! It is intentionally runtime-free (no tokio) so it can be shared by pure
//! code such as the reducer.
//!
//! ## Module Overview
//!
//! - [`ids`]: Typed ID wrappers (ThreadId, MessageId, PartId, RunId, EventId)
//! - [`event`]: `AgentKitEvent` + `EventKind` (known kinds plus a `Custom` catch-all)
//! - [`message`]: `ConversationMessage`, `MessagePart` and the part payloads
//! - [`state`]: `ThreadState`, `StreamingState`, `AgentStatus`
//! - [`action`]: `StreamingAction` (forward-compatible decoding)
//! - [`thread`]: `Thread` list metadata
//! - [`ports`]: Connection and transport boundary traits
//! - [`error`]: `TransportError`, `ConnectionError`

pub mod action;
pub mod error;
pub mod event;
pub mod ids;
pub mod message;
pub mod ports;
pub mod state;
pub mod thread;

pub use action::StreamingAction;
pub use error::{ConnectionError, TransportError, TransportResult};
pub use event::{
    AgentKitEvent, CompletedPartType, EventKind, PartCompleted, PartCreated, PartType,
    RunCompleted, RunScope, RunStarted, StreamEnded, TextDelta, ToolCallDelta,
};
pub use ids::{EventId, MessageId, PartId, RunId, SeqNo, ThreadId};
pub use message::{
    ConversationMessage, DataPart, ErrorPart, FilePart, HitlPart, HitlStatus, MessagePart,
    MessageRole, MessageStatus, PartStatus, ReasoningPart, SourcePart, StatusPart, TextPart,
    ToolCallPart, ToolCallState,
};
pub use ports::{
    ApproveToolCallRequest, ConnectionHandle, ConnectionPort, CreateThreadRequest,
    FetchThreadsRequest, MessageCallback, SendMessageRequest, SendMessageResponse,
    StateChangeCallback, SubscribeRequest, ThreadPage, TransportPort,
};
pub use state::{AgentStatus, StateError, StreamingState, ThreadState};
pub use thread::Thread;
