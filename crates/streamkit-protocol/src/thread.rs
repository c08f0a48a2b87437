//! Thread list metadata.

use crate::ids::ThreadId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation thread as shown in a thread list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: ThreadId,
    pub title: String,
    #[serde(default)]
    pub message_count: u64,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub has_new_messages: bool,
}

impl Thread {
    /// Fresh, empty thread with every timestamp set to `at`.
    pub fn new(id: ThreadId, title: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            message_count: 0,
            last_message_at: at,
            created_at: at,
            updated_at: at,
            has_new_messages: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_serializes_camel_case() {
        let thread = Thread::new(ThreadId::from("t1"), "Refunds", Utc::now());
        let value = serde_json::to_value(&thread).unwrap();
        assert_eq!(value["messageCount"], 0);
        assert!(value.get("lastMessageAt").is_some());
        let back: Thread = serde_json::from_value(value).unwrap();
        assert_eq!(back, thread);
    }
}
