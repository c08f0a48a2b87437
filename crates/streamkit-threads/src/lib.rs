//! Thread list reconciliation.
//!
//! A client keeps its own thread list (possibly restored from cache) and
//! periodically receives a fresh page from the server. Merging keeps the
//! local order stable and takes the freshest counters from either side.

mod cache;

pub use cache::{THREADS_FILE, ThreadCacheStore, parse_cached_threads};

use indexmap::{IndexMap, IndexSet};
use indexmap::map::Entry;
use streamkit_protocol::{Thread, ThreadId};

const GENERIC_TITLES: [&str; 2] = ["new conversation", "new query"];

/// Placeholder titles a thread gets before anything meaningful is known.
pub fn is_generic_title(title: &str) -> bool {
    let title = title.trim();
    title.is_empty()
        || GENERIC_TITLES
            .iter()
            .any(|generic| title.eq_ignore_ascii_case(generic))
}

/// Drop repeated ids, keeping the first occurrence.
pub fn dedupe_threads(threads: Vec<Thread>) -> Vec<Thread> {
    let mut unique: IndexMap<ThreadId, Thread> = IndexMap::with_capacity(threads.len());
    for thread in threads {
        if let Entry::Vacant(slot) = unique.entry(thread.id.clone()) {
            slot.insert(thread);
        }
    }
    unique.into_values().collect()
}

/// Merge a server page into the local list.
///
/// Local order is preserved and server-only threads are appended. Threads
/// known to both sides are combined with [`merge_thread`].
pub fn merge_threads_preserve_order(local: &[Thread], server: &[Thread]) -> Vec<Thread> {
    let mut from_server: IndexMap<&ThreadId, &Thread> = IndexMap::with_capacity(server.len());
    for thread in server {
        from_server.entry(&thread.id).or_insert(thread);
    }
    let known_locally: IndexSet<&ThreadId> = local.iter().map(|thread| &thread.id).collect();

    let mut merged: Vec<Thread> = local
        .iter()
        .map(|thread| match from_server.get(&thread.id) {
            Some(remote) => merge_thread(thread, remote),
            None => thread.clone(),
        })
        .collect();
    merged.extend(
        server
            .iter()
            .filter(|thread| !known_locally.contains(&thread.id))
            .cloned(),
    );
    dedupe_threads(merged)
}

/// Combine two records of the same thread.
pub fn merge_thread(local: &Thread, server: &Thread) -> Thread {
    Thread {
        id: local.id.clone(),
        title: preferred_title(&local.title, &server.title).to_owned(),
        message_count: local.message_count.max(server.message_count),
        last_message_at: local.last_message_at.max(server.last_message_at),
        created_at: local.created_at.min(server.created_at),
        updated_at: local.updated_at.max(server.updated_at),
        has_new_messages: local.has_new_messages || server.has_new_messages,
    }
}

fn preferred_title<'a>(local: &'a str, server: &'a str) -> &'a str {
    let (local_generic, server_generic) = (is_generic_title(local), is_generic_title(server));
    if local_generic && !server_generic {
        return server;
    }
    // Between two real titles the longer wins; ties go to the server.
    if !local_generic && !server_generic && local.chars().count() <= server.chars().count() {
        return server;
    }
    local
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    fn thread(id: &str, title: &str) -> Thread {
        Thread::new(ThreadId::from(id), title, at(0))
    }

    #[test]
    fn specific_local_title_beats_generic_server_title() {
        let merged = merge_threads_preserve_order(
            &[thread("a", "My refund question")],
            &[thread("a", "New conversation")],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "My refund question");
    }

    #[test]
    fn title_preference_rules() {
        assert_eq!(preferred_title("", "Billing"), "Billing");
        assert_eq!(preferred_title("NEW QUERY", "Billing"), "Billing");
        assert_eq!(preferred_title("Refund", "Refund for order 42"), "Refund for order 42");
        assert_eq!(preferred_title("Refund for order 42", "Refund"), "Refund for order 42");
        assert_eq!(preferred_title("Same", "Also"), "Also");
        assert_eq!(preferred_title("New conversation", "new query"), "New conversation");
    }

    #[test]
    fn counters_take_the_freshest_side() {
        let mut local = thread("a", "Refunds");
        local.message_count = 4;
        local.created_at = at(-60);
        local.updated_at = at(30);
        local.has_new_messages = true;

        let mut server = thread("a", "Refunds");
        server.message_count = 6;
        server.last_message_at = at(90);
        server.updated_at = at(10);

        let merged = merge_thread(&local, &server);
        assert_eq!(merged.message_count, 6);
        assert_eq!(merged.last_message_at, at(90));
        assert_eq!(merged.created_at, at(-60));
        assert_eq!(merged.updated_at, at(30));
        assert!(merged.has_new_messages);
    }

    #[test]
    fn local_order_kept_and_server_only_appended() {
        let local = vec![thread("b", "B"), thread("a", "A"), thread("b", "B again")];
        let server = vec![thread("c", "C"), thread("a", "A"), thread("c", "C dup")];
        let merged = merge_threads_preserve_order(&local, &server);
        let ids: Vec<&str> = merged.iter().map(|thread| thread.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(merged[0].title, "B");
        assert_eq!(merged[2].title, "C");
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let mut later = thread("a", "Second");
        later.updated_at = at(0) + Duration::minutes(5);
        let deduped = dedupe_threads(vec![thread("a", "First"), thread("b", "B"), later]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "First");
    }

    #[test]
    fn generic_titles() {
        assert!(is_generic_title("   "));
        assert!(is_generic_title("New Conversation"));
        assert!(is_generic_title("new query "));
        assert!(!is_generic_title("New conversation about refunds"));
    }
}
