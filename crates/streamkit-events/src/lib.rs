//! Realtime event plumbing: the event mapper that normalizes raw chunks into
//! [`AgentKitEvent`]s, and an in-process broadcast hub that implements the
//! connection port.

mod hub;
mod mapper;

pub use hub::{BroadcastConnection, ChunkHub, HubMessage, HubPayload};
pub use mapper::{SubscriptionFilter, map_chunks, map_to_network_event, should_process_event};
pub use streamkit_protocol::AgentKitEvent;
