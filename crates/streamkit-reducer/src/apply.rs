//! Per-kind folding of in-order events into a thread.

use chrono::{DateTime, Utc};
use serde_json::Value;
use streamkit_protocol::{
    AgentKitEvent, AgentStatus, CompletedPartType, ConversationMessage, EventKind, MessageId,
    MessagePart, PartCompleted, PartCreated, PartId, PartStatus, PartType, RunScope, RunStarted,
    TextDelta, TextPart, ThreadState, ToolCallDelta, ToolCallPart,
};
use tracing::debug;

use crate::tool_input;

#[derive(Debug, Clone, Copy)]
pub(crate) struct ApplyContext {
    pub is_current: bool,
    pub debug: bool,
}

/// Apply one event that is next in sequence.
pub(crate) fn apply_event(thread: &mut ThreadState, event: &AgentKitEvent, ctx: &ApplyContext) {
    let at = event.occurred_at();
    match &event.kind {
        EventKind::RunStarted(run) => run_started(thread, run),
        EventKind::RunCompleted(_) => run_completed(thread, ctx),
        EventKind::StreamEnded(_) => {
            thread.agent_status = AgentStatus::Ready;
            thread.run_active = false;
        }
        EventKind::PartCreated(created) => part_created(thread, created, at),
        EventKind::TextDelta(delta) => text_delta(thread, delta, at),
        EventKind::ToolCallArgumentsDelta(delta) => tool_delta(thread, delta, ctx, |part, text| {
            tool_input::accumulate_arguments(part, text)
        }),
        EventKind::ToolCallOutputDelta(delta) => tool_delta(thread, delta, ctx, |part, text| {
            tool_input::accumulate_output(part, text)
        }),
        EventKind::PartCompleted(completed) => part_completed(thread, completed, ctx),
        // Custom and future kinds only advance the cursor.
        _ => {}
    }

    thread.last_activity = at;
    if !ctx.is_current {
        thread.has_new_messages = true;
    }
}

fn run_started(thread: &mut ThreadState, run: &RunStarted) {
    thread.run_active = true;
    if run.starts_epoch() {
        thread.agent_status = AgentStatus::Submitted;
        thread.error = None;
    }
    if run.scope == RunScope::Agent
        && let Some(name) = &run.name
    {
        thread.current_agent = Some(name.clone());
    }
}

fn run_completed(thread: &mut ThreadState, ctx: &ApplyContext) {
    let mut promoted = 0_usize;
    for message in &mut thread.messages {
        for part in &mut message.parts {
            if let MessagePart::ToolCall(tool_call) = part
                && tool_input::promote_executing(tool_call)
            {
                promoted += 1;
            }
        }
    }
    if ctx.debug && promoted > 0 {
        debug!(promoted, "run completed with executing tool calls; promoted to output-available");
    }
}

fn ensure_message<'a>(
    thread: &'a mut ThreadState,
    id: &MessageId,
    at: DateTime<Utc>,
) -> &'a mut ConversationMessage {
    let index = match thread.messages.iter().position(|message| &message.id == id) {
        Some(index) => index,
        None => {
            let agent = thread.current_agent.clone();
            thread
                .messages
                .push(ConversationMessage::assistant(id.clone(), agent, at));
            thread.messages.len() - 1
        }
    };
    &mut thread.messages[index]
}

fn part_created(thread: &mut ThreadState, created: &PartCreated, at: DateTime<Utc>) {
    let message = ensure_message(thread, &created.message_id, at);
    if message.part(&created.part_id).is_none() {
        let part = match created.part_type {
            PartType::Text => MessagePart::Text(TextPart::streaming(created.part_id.clone())),
            PartType::ToolCall => MessagePart::ToolCall(ToolCallPart::new(
                created.part_id.clone(),
                created.tool_name().unwrap_or_default(),
            )),
        };
        message.parts.push(part);
    }
    thread.agent_status = AgentStatus::Streaming;
}

fn text_delta(thread: &mut ThreadState, delta: &TextDelta, at: DateTime<Utc>) {
    let message = ensure_message(thread, &delta.message_id, at);
    if message.part(&delta.part_id).is_none() {
        message
            .parts
            .push(MessagePart::Text(TextPart::streaming(delta.part_id.clone())));
    }
    let Some(part) = message.text_part_mut(&delta.part_id) else {
        return;
    };
    part.content.push_str(&delta.delta);
    part.status = PartStatus::Streaming;
    thread.agent_status = AgentStatus::Streaming;
}

fn locate<F>(thread: &ThreadState, message_id: Option<&MessageId>, holds: F) -> Option<usize>
where
    F: Fn(&ConversationMessage) -> bool,
{
    message_id
        .and_then(|id| {
            thread
                .messages
                .iter()
                .position(|message| &message.id == id && holds(message))
        })
        .or_else(|| thread.messages.iter().rposition(|message| holds(message)))
}

fn tool_call_mut<'a>(
    thread: &'a mut ThreadState,
    message_id: Option<&MessageId>,
    part_id: &PartId,
) -> Option<&'a mut ToolCallPart> {
    let index = locate(thread, message_id, |message| {
        matches!(message.part(part_id), Some(MessagePart::ToolCall(_)))
    })?;
    thread.messages[index].tool_call_mut(part_id)
}

fn text_part_mut<'a>(
    thread: &'a mut ThreadState,
    message_id: Option<&MessageId>,
    part_id: &PartId,
) -> Option<&'a mut TextPart> {
    let index = locate(thread, message_id, |message| {
        matches!(message.part(part_id), Some(MessagePart::Text(_)))
    })?;
    thread.messages[index].text_part_mut(part_id)
}

fn tool_delta<F>(thread: &mut ThreadState, delta: &ToolCallDelta, ctx: &ApplyContext, fold: F)
where
    F: FnOnce(&mut ToolCallPart, &str),
{
    match tool_call_mut(thread, delta.message_id.as_ref(), &delta.part_id) {
        Some(part) => {
            fold(part, &delta.delta);
            thread.agent_status = AgentStatus::Streaming;
        }
        None if ctx.debug => {
            debug!(part_id = %delta.part_id, "tool delta for unknown part ignored");
        }
        None => {}
    }
}

fn part_completed(thread: &mut ThreadState, completed: &PartCompleted, ctx: &ApplyContext) {
    let message_id = completed.message_id.as_ref();
    let final_content = completed.final_content.as_ref();
    let found = match completed.part_type {
        CompletedPartType::Text => text_part_mut(thread, message_id, &completed.part_id)
            .map(|part| {
                part.status = PartStatus::Complete;
                if let Some(Value::String(content)) = final_content {
                    part.content = content.clone();
                }
            })
            .is_some(),
        CompletedPartType::ToolCall => tool_call_mut(thread, message_id, &completed.part_id)
            .map(|part| tool_input::finalize_arguments(part, final_content))
            .is_some(),
        CompletedPartType::ToolOutput => tool_call_mut(thread, message_id, &completed.part_id)
            .map(|part| tool_input::complete_output(part, final_content))
            .is_some(),
    };
    if !found && ctx.debug {
        debug!(part_id = %completed.part_id, "completion for unknown part ignored");
    }
}
