use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::dialect::parse_rfc3339;

/// Session-header fields extracted from a `session_start`/`session_metadata`
/// line. Never derived from event lines — conflating the two would corrupt
/// `Session.success` with a per-event success flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMeta {
    pub session_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub agent_name: Option<String>,
    pub success: Option<bool>,
}

/// Returns `Some` only when `line`'s top-level `type` is `session_start` or
/// `session_metadata`. Any other type, or a line that fails to parse as
/// JSON at all, yields `None` rather than an error — malformed-JSON
/// reporting is `parse_line`'s job, not this one's.
pub fn parse_session_meta(line: &str) -> Option<SessionMeta> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    let type_str = value.get("type").and_then(|v| v.as_str())?;
    if type_str != "session_start" && type_str != "session_metadata" {
        return None;
    }

    let session_id = value
        .get("sessionId")
        .or_else(|| value.get("session_id"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let timestamp = value
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(|raw| parse_rfc3339(raw).ok());
    let status = value
        .get("status")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let agent_name = value
        .get("agentType")
        .or_else(|| value.get("agent_name"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let success = value.get("success").and_then(|v| v.as_bool());

    Some(SessionMeta {
        session_id,
        timestamp,
        status,
        agent_name,
        success,
    })
}
