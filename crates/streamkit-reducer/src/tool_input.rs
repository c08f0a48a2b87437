//! Tool-call argument and output accumulation.

use serde_json::Value;
use streamkit_protocol::{ToolCallPart, ToolCallState};

/// Parse `raw` as JSON, or keep it as a string.
pub(crate) fn parse_or_string(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

/// Fold one argument delta into the part's input.
///
/// The concatenated buffer wins when it parses. Otherwise a delta that is a
/// complete JSON object on its own is shallow-merged into an object input and
/// the buffer is rewritten to the merged document. Anything else leaves the
/// raw concatenation as a string input.
pub(crate) fn accumulate_arguments(part: &mut ToolCallPart, delta: &str) {
    part.input_buffer.push_str(delta);
    if let Ok(parsed) = serde_json::from_str::<Value>(&part.input_buffer) {
        part.input = parsed;
        return;
    }

    let fragment = match serde_json::from_str::<Value>(delta) {
        Ok(Value::Object(fragment)) => Some(fragment),
        _ => None,
    };
    let merged = match fragment {
        Some(fragment) => match &mut part.input {
            Value::Object(existing) => {
                existing.extend(fragment);
                true
            }
            Value::Null => {
                part.input = Value::Object(fragment);
                true
            }
            _ => false,
        },
        None => false,
    };

    if merged {
        part.input_buffer = part.input.to_string();
    } else {
        part.input = Value::String(part.input_buffer.clone());
    }
}

/// Replace the input with the final argument document, keeping the prior
/// input when a string payload does not parse.
pub(crate) fn finalize_arguments(part: &mut ToolCallPart, final_content: Option<&Value>) {
    match final_content {
        Some(Value::String(raw)) => {
            if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
                part.input = parsed;
            }
        }
        Some(Value::Null) | None => {}
        Some(structured) => part.input = structured.clone(),
    }
    if part.state == ToolCallState::InputStreaming {
        part.state = ToolCallState::InputAvailable;
    }
}

pub(crate) fn accumulate_output(part: &mut ToolCallPart, delta: &str) {
    part.output_buffer.push_str(delta);
    if part.state != ToolCallState::OutputAvailable {
        part.state = ToolCallState::Executing;
    }
}

pub(crate) fn complete_output(part: &mut ToolCallPart, final_content: Option<&Value>) {
    part.output = Some(match final_content {
        Some(content) => content.clone(),
        None => parse_or_string(&part.output_buffer),
    });
    part.state = ToolCallState::OutputAvailable;
}

/// Promote an executing tool call using whatever output has streamed in.
/// Returns whether the part changed.
pub(crate) fn promote_executing(part: &mut ToolCallPart) -> bool {
    if part.state != ToolCallState::Executing {
        return false;
    }
    if part.output.is_none() {
        part.output = Some(parse_or_string(&part.output_buffer));
    }
    part.state = ToolCallState::OutputAvailable;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use streamkit_protocol::PartId;

    fn part() -> ToolCallPart {
        ToolCallPart::new(PartId::from("call-1"), "lookup")
    }

    #[test]
    fn partial_json_stays_string_until_complete() {
        let mut part = part();
        accumulate_arguments(&mut part, r#"{"query": "ref"#);
        assert_eq!(part.input, json!(r#"{"query": "ref"#));
        accumulate_arguments(&mut part, r#"unds"}"#);
        assert_eq!(part.input, json!({"query": "refunds"}));
    }

    #[test]
    fn standalone_object_deltas_merge() {
        let mut part = part();
        accumulate_arguments(&mut part, r#"{"a":1}"#);
        accumulate_arguments(&mut part, r#"{"b":2}"#);
        assert_eq!(part.input, json!({"a": 1, "b": 2}));
        assert_eq!(
            serde_json::from_str::<Value>(&part.input_buffer).unwrap(),
            json!({"a": 1, "b": 2})
        );
    }

    #[test]
    fn non_json_delta_becomes_string_input() {
        let mut part = part();
        accumulate_arguments(&mut part, "oops");
        assert_eq!(part.input, Value::String("oops".to_owned()));
    }

    #[test]
    fn object_delta_after_garbage_keeps_string() {
        let mut part = part();
        accumulate_arguments(&mut part, "oops");
        accumulate_arguments(&mut part, r#"{"b":2}"#);
        assert_eq!(part.input, json!(r#"oops{"b":2}"#));
    }

    #[test]
    fn finalize_keeps_prior_input_on_bad_json() {
        let mut part = part();
        accumulate_arguments(&mut part, r#"{"a":1}"#);
        finalize_arguments(&mut part, Some(&json!("{not json")));
        assert_eq!(part.input, json!({"a": 1}));
        assert_eq!(part.state, ToolCallState::InputAvailable);

        finalize_arguments(&mut part, Some(&json!(r#"{"a":2}"#)));
        assert_eq!(part.input, json!({"a": 2}));
    }

    #[test]
    fn executing_part_is_promoted_with_streamed_output() {
        let mut part = part();
        accumulate_output(&mut part, r#"{"rows":"#);
        accumulate_output(&mut part, "3}");
        assert_eq!(part.state, ToolCallState::Executing);
        assert!(promote_executing(&mut part));
        assert_eq!(part.output, Some(json!({"rows": 3})));
        assert_eq!(part.state, ToolCallState::OutputAvailable);
        assert!(!promote_executing(&mut part));
    }
}
