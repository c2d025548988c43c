//! Parse the model's reply into a final answer or a tool call.
//!
//! A tool call is written as the marker `TOOL_CALL:` followed by
//! `{"name": ..., "arguments": {...}}`, optionally inside a code fence.
//! Text before the marker is the model's reasoning.

use forgeloop_core::tool::ToolCall;
use serde::Deserialize;
use serde_json::Value;

use crate::json::extract_json_object;

pub const TOOL_CALL_MARKER: &str = "TOOL_CALL:";

#[derive(Debug, Clone)]
pub enum ParsedAction {
    /// No marker: the reply is the answer.
    FinalAnswer(String),

    ToolCall { thought: String, call: ToolCall },

    /// A marker was present but what followed it was not a usable call.
    Malformed { thought: String, reason: String },
}

#[derive(Debug, Deserialize)]
struct RawCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

pub fn parse_action(text: &str) -> ParsedAction {
    let Some(marker) = text.find(TOOL_CALL_MARKER) else {
        return ParsedAction::FinalAnswer(text.trim().to_string());
    };

    let thought = text[..marker].trim().to_string();
    let rest = &text[marker + TOOL_CALL_MARKER.len()..];

    let Some(json) = extract_json_object(rest) else {
        return ParsedAction::Malformed {
            thought,
            reason: "no JSON object after TOOL_CALL:".into(),
        };
    };

    let raw: RawCall = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(e) => {
            return ParsedAction::Malformed {
                thought,
                reason: format!("tool call JSON is invalid: {e}"),
            };
        }
    };

    let name = raw.name.trim();
    if name.is_empty() {
        return ParsedAction::Malformed {
            thought,
            reason: "tool call has an empty name".into(),
        };
    }

    let arguments = match raw.arguments {
        Value::Null => Value::Object(serde_json::Map::new()),
        // Some models double-encode the arguments.
        Value::String(encoded) => match serde_json::from_str::<Value>(&encoded) {
            Ok(value @ Value::Object(_)) => value,
            _ => {
                return ParsedAction::Malformed {
                    thought,
                    reason: "tool call arguments must be a JSON object".into(),
                };
            }
        },
        value @ Value::Object(_) => value,
        _ => {
            return ParsedAction::Malformed {
                thought,
                reason: "tool call arguments must be a JSON object".into(),
            };
        }
    };

    ParsedAction::ToolCall {
        thought,
        call: ToolCall::new(name, arguments),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_call(text: &str) -> (String, ToolCall) {
        match parse_action(text) {
            ParsedAction::ToolCall { thought, call } => (thought, call),
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn plain_text_is_final_answer() {
        match parse_action("  The app is running on port 5173.\n") {
            ParsedAction::FinalAnswer(answer) => assert_eq!(answer, "The app is running on port 5173."),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn inline_tool_call_with_thought() {
        let (thought, call) = expect_call(
            r#"I should look at the manifest first.
TOOL_CALL: {"name": "read_file", "arguments": {"path": "package.json"}}"#,
        );
        assert_eq!(thought, "I should look at the manifest first.");
        assert_eq!(call.name, "read_file");
        assert_eq!(call.arguments["path"], "package.json");
    }

    #[test]
    fn fenced_tool_call() {
        let (_, call) = expect_call(
            "TOOL_CALL:\n```json\n{\"name\": \"execute_command\", \"arguments\": {\"command\": \"npm run dev\"}}\n```",
        );
        assert_eq!(call.name, "execute_command");
        assert_eq!(call.arguments["command"], "npm run dev");
    }

    #[test]
    fn missing_and_string_arguments() {
        let (_, call) = expect_call(r#"TOOL_CALL: {"name": "list_directory"}"#);
        assert!(call.arguments.as_object().unwrap().is_empty());

        let (_, call) =
            expect_call(r#"TOOL_CALL: {"name": "read_file", "arguments": "{\"path\": \"a.rs\"}"}"#);
        assert_eq!(call.arguments["path"], "a.rs");
    }

    #[test]
    fn malformed_calls() {
        assert!(matches!(
            parse_action("TOOL_CALL: read_file(package.json)"),
            ParsedAction::Malformed { .. }
        ));
        assert!(matches!(
            parse_action(r#"TOOL_CALL: {"arguments": {}}"#),
            ParsedAction::Malformed { .. }
        ));
        assert!(matches!(
            parse_action(r#"TOOL_CALL: {"name": " ", "arguments": {}}"#),
            ParsedAction::Malformed { .. }
        ));
        assert!(matches!(
            parse_action(r#"TOOL_CALL: {"name": "read_file", "arguments": [1]}"#),
            ParsedAction::Malformed { .. }
        ));
    }
}
