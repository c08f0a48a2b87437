//! Typed ID wrappers.
//!
//! Every identifier on the wire is an opaque string chosen by the server
//! (or by the client for optimistic messages). The wrappers keep thread,
//! message and part ids from being mixed up while staying serde-transparent.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Create a new random ID (UUID v4).
            pub fn new_uuid() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(
    /// Identifier of a conversation thread.
    ThreadId
);
typed_id!(
    /// Identifier of a conversation message, stable for its lifetime.
    MessageId
);
typed_id!(
    /// Identifier of a message part. For tool-call parts this is the tool call id.
    PartId
);
typed_id!(
    /// Identifier of a network or agent run.
    RunId
);
typed_id!(
    /// Opaque idempotency/debug identifier of a realtime event.
    EventId
);

/// Monotonic sequence number within a run epoch.
pub type SeqNo = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uuid_is_unique() {
        let a = MessageId::new_uuid();
        let b = MessageId::new_uuid();
        assert_ne!(a, b);
    }

    #[test]
    fn thread_id_from_string() {
        let id = ThreadId::from_string("thread-1");
        assert_eq!(id.as_str(), "thread-1");
        assert_eq!(id.to_string(), "thread-1");
    }

    #[test]
    fn typed_id_is_serde_transparent() {
        let id = PartId::from("p1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"p1\"");
        let back: PartId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn thread_ids_order_lexically() {
        let mut ids = vec![ThreadId::from("b"), ThreadId::from("a")];
        ids.sort();
        assert_eq!(ids[0].as_str(), "a");
    }
}
