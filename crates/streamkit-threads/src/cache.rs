use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use streamkit_protocol::{Thread, ThreadId};
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::merge_threads_preserve_order;

pub const THREADS_FILE: &str = "threads.json";

/// Parse a persisted thread list, skipping entries that cannot be revived.
///
/// Dates may be stored as epoch milliseconds or RFC 3339 strings. An entry
/// needs a non-empty `id` and at least one usable timestamp; missing
/// timestamps fall back to the nearest available one.
pub fn parse_cached_threads(raw: &str) -> Vec<Thread> {
    let entries = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            debug!("cached threads blob is not an array");
            return Vec::new();
        }
        Err(error) => {
            debug!(%error, "cached threads blob is not JSON");
            return Vec::new();
        }
    };

    let total = entries.len();
    let threads: Vec<Thread> = entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(revive_thread)
        .collect();
    if threads.len() < total {
        debug!(total, kept = threads.len(), "skipped malformed cached threads");
    }
    threads
}

fn revive_thread(entry: &Map<String, Value>) -> Option<Thread> {
    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())?;

    let created_at = revive_date(entry.get("createdAt"));
    let updated_at = revive_date(entry.get("updatedAt"));
    let last_message_at = revive_date(entry.get("lastMessageAt"));
    let fallback = updated_at.or(created_at).or(last_message_at)?;

    Some(Thread {
        id: ThreadId::from(id),
        title: entry
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        message_count: entry
            .get("messageCount")
            .and_then(revive_count)
            .unwrap_or(0),
        last_message_at: last_message_at.or(updated_at).unwrap_or(fallback),
        created_at: created_at.unwrap_or(fallback),
        updated_at: updated_at.unwrap_or(fallback),
        has_new_messages: entry
            .get("hasNewMessages")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn revive_date(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc)),
        Value::Number(number) => {
            let millis = number.as_i64().or_else(|| {
                number
                    .as_f64()
                    .filter(|millis| millis.is_finite())
                    .map(|millis| millis as i64)
            })?;
            DateTime::from_timestamp_millis(millis)
        }
        _ => None,
    }
}

fn revive_count(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|count| count.is_finite() && *count >= 0.0)
            .map(|count| count as u64)
    })
}

/// File-backed cache of the thread list at `<root>/threads.json`.
#[derive(Debug, Clone)]
pub struct ThreadCacheStore {
    root: PathBuf,
}

impl ThreadCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.root.join(THREADS_FILE)
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create cache dir {parent:?}"))?;
        }
        Ok(())
    }

    /// Load the cached list. A missing file yields an empty list; malformed
    /// entries are skipped.
    #[instrument(skip(self), fields(path = ?self.path()))]
    pub async fn load(&self) -> Result<Vec<Thread>> {
        let path = self.path();
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed reading thread cache {path:?}"))?;
        let threads = parse_cached_threads(&raw);
        debug!(count = threads.len(), "thread cache loaded");
        Ok(threads)
    }

    #[instrument(skip(self, threads), fields(path = ?self.path(), count = threads.len()))]
    pub async fn save(&self, threads: &[Thread]) -> Result<()> {
        let path = self.path();
        Self::ensure_parent(&path).await?;
        let payload = serde_json::to_string_pretty(threads)?;
        fs::write(&path, payload)
            .await
            .with_context(|| format!("failed writing thread cache {path:?}"))?;
        Ok(())
    }

    /// Merge a server page into the cached list, persist the result, and
    /// return it.
    pub async fn refresh(&self, server: &[Thread]) -> Result<Vec<Thread>> {
        let local = match self.load().await {
            Ok(local) => local,
            Err(error) => {
                warn!(%error, "thread cache unreadable; starting from server list");
                Vec::new()
            }
        };
        let merged = merge_threads_preserve_order(&local, server);
        self.save(&merged).await?;
        Ok(merged)
    }
}
