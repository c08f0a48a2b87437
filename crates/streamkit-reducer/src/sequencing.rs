//! Sequence-epoch reconciliation.
//!
//! Each thread applies events strictly in `sequenceNumber` order. Events ahead
//! of the cursor wait in `event_buffer`; events behind it are stale and
//! dropped. A top-level `run.started` anchors a new epoch: the cursor jumps to
//! just past it and buffered entries at or below it are purged. A
//! re-delivered copy of the anchoring `run.started` is stale like any other
//! event behind the cursor.

use std::cmp::Ordering;

use streamkit_protocol::{AgentKitEvent, EventKind, RunStarted, ThreadState};
use tracing::debug;

use crate::apply::{ApplyContext, apply_event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    EpochReset,
    Apply,
    Buffer,
    Discard,
}

/// Decide what to do with `event` without touching the thread.
pub(crate) fn classify(thread: &ThreadState, event: &AgentKitEvent) -> Disposition {
    let sequence = event.sequence_number;
    if let EventKind::RunStarted(run) = &event.kind
        && run.starts_epoch()
    {
        if sequence < thread.next_expected_sequence && reanchors(thread, run, event) {
            return Disposition::Discard;
        }
        return Disposition::EpochReset;
    }
    match sequence.cmp(&thread.next_expected_sequence) {
        Ordering::Equal => Disposition::Apply,
        Ordering::Greater if thread.event_buffer.get(&sequence) == Some(event) => {
            Disposition::Discard
        }
        Ordering::Greater => Disposition::Buffer,
        Ordering::Less => Disposition::Discard,
    }
}

fn reanchors(thread: &ThreadState, run: &RunStarted, event: &AgentKitEvent) -> bool {
    let Some(anchor) = &thread.epoch_anchor else {
        return false;
    };
    if anchor.sequence_number != event.sequence_number {
        return false;
    }
    match (&anchor.kind, &run.run_id) {
        (EventKind::RunStarted(anchor_run), Some(run_id)) if anchor_run.run_id.is_some() => {
            anchor_run.run_id.as_ref() == Some(run_id)
        }
        _ => anchor == event,
    }
}

/// Apply, buffer or drop one event according to `disposition`, then drain
/// any contiguous run of buffered events.
pub(crate) fn ingest(
    thread: &mut ThreadState,
    event: AgentKitEvent,
    disposition: Disposition,
    ctx: &ApplyContext,
) {
    let sequence = event.sequence_number;
    match disposition {
        Disposition::EpochReset => {
            if ctx.debug {
                debug!(
                    sequence,
                    previous_cursor = thread.next_expected_sequence,
                    buffered = thread.event_buffer.len(),
                    "new run epoch"
                );
            }
            thread.next_expected_sequence = sequence.saturating_add(1);
            thread.event_buffer.retain(|&buffered, _| buffered > sequence);
            apply_event(thread, &event, ctx);
            thread.epoch_anchor = Some(event);
        }
        Disposition::Apply => {
            thread.next_expected_sequence = sequence.saturating_add(1);
            apply_event(thread, &event, ctx);
        }
        Disposition::Buffer => {
            if ctx.debug {
                debug!(
                    sequence,
                    expected = thread.next_expected_sequence,
                    event = event.name(),
                    "event buffered out of order"
                );
            }
            thread.event_buffer.insert(sequence, event);
            return;
        }
        Disposition::Discard => {
            if ctx.debug {
                debug!(
                    sequence,
                    expected = thread.next_expected_sequence,
                    event = event.name(),
                    "stale or duplicate event discarded"
                );
            }
            return;
        }
    }
    drain(thread, ctx);
}

fn drain(thread: &mut ThreadState, ctx: &ApplyContext) {
    while let Some(event) = thread
        .event_buffer
        .remove(&thread.next_expected_sequence)
    {
        thread.next_expected_sequence = thread.next_expected_sequence.saturating_add(1);
        apply_event(thread, &event, ctx);
    }
    let cursor = thread.next_expected_sequence;
    thread.event_buffer.retain(|&buffered, _| buffered > cursor);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::{Value, json};

    const CTX: ApplyContext = ApplyContext {
        is_current: true,
        debug: true,
    };

    fn event(name: &str, sequence: u64, data: Value) -> AgentKitEvent {
        AgentKitEvent::from_wire(&json!({
            "event": name,
            "data": data,
            "timestamp": 1_700_000_000_000_i64,
            "sequenceNumber": sequence,
        }))
        .unwrap()
    }

    fn feed(thread: &mut ThreadState, event: AgentKitEvent) {
        let disposition = classify(thread, &event);
        ingest(thread, event, disposition, &CTX);
    }

    #[test]
    fn classify_orders_against_cursor() {
        let mut thread = ThreadState::new(Utc::now());
        thread.next_expected_sequence = 3;
        assert_eq!(classify(&thread, &event("x", 3, json!({}))), Disposition::Apply);
        assert_eq!(classify(&thread, &event("x", 5, json!({}))), Disposition::Buffer);
        assert_eq!(classify(&thread, &event("x", 1, json!({}))), Disposition::Discard);
        assert_eq!(
            classify(&thread, &event("run.started", 1, json!({"scope": "network"}))),
            Disposition::EpochReset
        );
    }

    #[test]
    fn identical_buffered_event_is_a_duplicate() {
        let mut thread = ThreadState::new(Utc::now());
        let early = event("x", 4, json!({}));
        feed(&mut thread, early.clone());
        assert_eq!(classify(&thread, &early), Disposition::Discard);
    }

    #[test]
    fn gap_fill_drains_contiguous_buffer() {
        let mut thread = ThreadState::new(Utc::now());
        feed(&mut thread, event("x", 2, json!({})));
        feed(&mut thread, event("x", 1, json!({})));
        feed(&mut thread, event("x", 4, json!({})));
        assert_eq!(thread.next_expected_sequence, 0);
        assert_eq!(thread.event_buffer.len(), 3);

        feed(&mut thread, event("x", 0, json!({})));
        assert_eq!(thread.next_expected_sequence, 3);
        assert_eq!(thread.event_buffer.keys().copied().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn epoch_reset_purges_entries_at_or_below_anchor() {
        let mut thread = ThreadState::new(Utc::now());
        thread.next_expected_sequence = 1;
        feed(&mut thread, event("x", 3, json!({})));
        feed(&mut thread, event("x", 9, json!({})));
        feed(&mut thread, event("run.started", 4, json!({"scope": "network"})));
        assert_eq!(thread.next_expected_sequence, 5);
        assert_eq!(thread.event_buffer.keys().copied().collect::<Vec<_>>(), vec![9]);
        assert!(thread.run_active);
    }

    #[test]
    fn redelivered_anchor_is_stale() {
        let mut thread = ThreadState::new(Utc::now());
        let start = event("run.started", 0, json!({"scope": "network", "runId": "net-1"}));
        feed(&mut thread, start.clone());
        feed(&mut thread, event("x", 1, json!({})));
        assert_eq!(classify(&thread, &start), Disposition::Discard);

        let next_run = event("run.started", 0, json!({"scope": "network", "runId": "net-2"}));
        assert_eq!(classify(&thread, &next_run), Disposition::EpochReset);

        let mut anonymous = ThreadState::new(Utc::now());
        let start = event("run.started", 0, json!({"scope": "network"}));
        feed(&mut anonymous, start.clone());
        assert_eq!(classify(&anonymous, &start), Disposition::Discard);
        let mut later = start;
        later.timestamp += 1;
        assert_eq!(classify(&anonymous, &later), Disposition::EpochReset);
    }
}
