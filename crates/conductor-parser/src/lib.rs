mod dialect;
mod error;
mod session_meta;
mod wire;

use std::fs::File;
use std::io::BufReader;

use conductor_types::Event;
use serde_json::Value;

pub use error::{Error, Result};
pub use session_meta::{parse_session_meta, SessionMeta};
pub use wire::{ContentBlock, Envelope, Message, Usage};

/// The parser accepts lines at least this large without truncating them;
/// callers should size their line-reading buffer to at least this capacity.
pub const MIN_LINE_BUFFER_CAPACITY: usize = 10 * 1024 * 1024;

/// Wraps a file in a `BufReader` sized to satisfy [`MIN_LINE_BUFFER_CAPACITY`].
/// The stdlib's default 8 KiB buffer is far too small for the 10 MiB line
/// guarantee this dialect makes.
pub fn buffered_reader(file: File) -> BufReader<File> {
    BufReader::with_capacity(MIN_LINE_BUFFER_CAPACITY, file)
}

/// Decodes one JSONL line into zero or more events. Empty lines yield no
/// events. A line is classified by its top-level `type`:
/// - simple dialect (`tool_call`/`tool_execution`, `bash_command`,
///   `file_operation`, `token_usage`) decodes directly to one event;
/// - nested dialect (`assistant`, `user`) decodes the envelope and may
///   yield several events;
/// - the skip category (`summary`, `file-history-snapshot`,
///   `queue-operation`, `init`, `system`) and session-metadata lines
///   (`session_start`, `session_metadata`, handled separately by
///   [`parse_session_meta`]) yield no events and no error;
/// - anything else is an unknown-type parse error.
pub fn parse_line(line: &str) -> Result<Vec<Event>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(trimmed)?;
    let type_str = value
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or(Error::MissingField("type"))?;

    if type_str.is_empty() {
        return Err(Error::MissingField("type"));
    }

    let events = match type_str {
        "tool_call" | "tool_execution" => dialect::decode_tool_call(&value).map(|e| vec![e]),
        "bash_command" => dialect::decode_bash_command(&value).map(|e| vec![e]),
        "file_operation" => dialect::decode_file_operation(&value).map(|e| vec![e]),
        "token_usage" => dialect::decode_token_usage(&value).map(|e| vec![e]),
        "assistant" => dialect::decode_assistant(&value),
        "user" => dialect::decode_user(&value),
        "summary" | "file-history-snapshot" | "queue-operation" | "init" | "system" => {
            Ok(Vec::new())
        }
        "session_start" | "session_metadata" => Ok(Vec::new()),
        other => Err(Error::UnknownType(other.to_string())),
    }?;

    for event in &events {
        event.validate()?;
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_types::EventKind;

    #[test]
    fn empty_line_yields_no_events() {
        assert!(parse_line("").unwrap().is_empty());
        assert!(parse_line("   \n").unwrap().is_empty());
    }

    #[test]
    fn simple_tool_call_decodes_one_event() {
        let line = r#"{"type":"tool_call","timestamp":"2024-01-01T00:00:00Z","tool_name":"bash","parameters":{"command":"ls"},"success":true}"#;
        let events = parse_line(line).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            EventKind::ToolCall(c) => assert_eq!(c.tool_name, "bash"),
            _ => panic!("expected ToolCall"),
        }
    }

    #[test]
    fn skip_category_yields_no_events_and_no_error() {
        let line = r#"{"type":"summary","leafUuid":"abc"}"#;
        assert!(parse_line(line).unwrap().is_empty());
    }

    #[test]
    fn unknown_simple_type_is_an_error() {
        let line = r#"{"type":"something_else","timestamp":"2024-01-01T00:00:00Z"}"#;
        assert!(matches!(parse_line(line), Err(Error::UnknownType(_))));
    }

    #[test]
    fn negative_cost_fails_validation() {
        let line = r#"{"type":"token_usage","timestamp":"2024-01-01T00:00:00Z","input_tokens":10,"cost_usd":-1.0}"#;
        assert!(matches!(parse_line(line), Err(Error::Validation(_))));
    }

    #[test]
    fn zero_timestamp_fails_validation() {
        let line = r#"{"type":"tool_call","timestamp":"1970-01-01T00:00:00Z","tool_name":"bash","success":true}"#;
        assert!(matches!(parse_line(line), Err(Error::Validation(_))));
    }

    #[test]
    fn nested_assistant_message_with_bash_and_read_and_usage() {
        // S5: one assistant line containing a Bash tool_use, a Read
        // tool_use, and a non-zero usage block yields three events.
        let line = serde_json::json!({
            "type": "assistant",
            "timestamp": "2024-01-01T00:00:00Z",
            "sessionId": "s1",
            "message": {
                "role": "assistant",
                "model": "claude-x",
                "content": [
                    {"type": "tool_use", "id": "t1", "name": "Bash", "input": {"command": "ls"}},
                    {"type": "tool_use", "id": "t2", "name": "Read", "input": {"file_path": "/a.txt"}}
                ],
                "usage": {"input_tokens": 10, "output_tokens": 5}
            }
        })
        .to_string();

        let events = parse_line(&line).unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0].kind, EventKind::BashCommand(_)));
        assert!(matches!(events[1].kind, EventKind::FileOperation(_)));
        assert!(matches!(events[2].kind, EventKind::TokenUsage(_)));
    }

    #[test]
    fn nested_user_message_tool_result_correlates_by_id() {
        let line = serde_json::json!({
            "type": "user",
            "timestamp": "2024-01-01T00:00:01Z",
            "sessionId": "s1",
            "message": {
                "role": "user",
                "content": [
                    {"type": "tool_result", "tool_use_id": "t1", "content": "ok", "is_error": false}
                ]
            }
        })
        .to_string();

        let events = parse_line(&line).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            EventKind::ToolCall(c) => {
                assert_eq!(c.tool_use_id.as_deref(), Some("t1"));
                assert!(c.is_result);
                assert!(c.success);
            }
            _ => panic!("expected ToolCall"),
        }
    }

    #[test]
    fn session_start_line_yields_no_events() {
        let line = r#"{"type":"session_start","sessionId":"s1","timestamp":"2024-01-01T00:00:00Z"}"#;
        assert!(parse_line(line).unwrap().is_empty());
    }
}
