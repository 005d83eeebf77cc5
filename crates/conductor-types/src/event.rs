use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// A single parsed event line, or one of the several events a nested-dialect
/// line can expand into.
///
/// The envelope carries the header fields common to every variant
/// (`type`, `timestamp`); everything variant-specific lives in `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Closed tagged union over the event variant set. A single `type`
/// discriminator plus variant-specific payload keeps parsing and dispatch a
/// single match and avoids conflating per-event success with session-level
/// success.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ToolCall(ToolCallEvent),
    BashCommand(BashCommandEvent),
    FileOperation(FileOperationEvent),
    TokenUsage(TokenUsageEvent),
    Text(TextEvent),
    SessionStart(SessionStartEvent),
    /// Known-but-ignored type (`summary`, `file-history-snapshot`,
    /// `queue-operation`, `init`, `system`, ...). Carries the original type
    /// string for diagnostics; never produced by an error path.
    Skip(SkipEvent),
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>, kind: EventKind) -> Self {
        Self { timestamp, kind }
    }

    /// Name of the event's variant as it appears on the wire.
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Validates the header plus whatever per-variant invariants apply.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timestamp.timestamp() == 0 && self.timestamp.timestamp_subsec_nanos() == 0 {
            return Err(ValidationError::ZeroTimestamp);
        }
        self.kind.validate()
    }
}

impl EventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::ToolCall(_) => "tool_call",
            EventKind::BashCommand(_) => "bash_command",
            EventKind::FileOperation(_) => "file_operation",
            EventKind::TokenUsage(_) => "token_usage",
            EventKind::Text(_) => "text",
            EventKind::SessionStart(_) => "session_start",
            EventKind::Skip(s) => {
                // leak-free: the skip category only ever wraps a small fixed
                // set of known type strings, so a &'static str is available
                // via a lookup rather than the owned field.
                skip_type_name(&s.original_type)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            EventKind::ToolCall(e) => e.validate(),
            EventKind::BashCommand(e) => e.validate(),
            EventKind::FileOperation(e) => e.validate(),
            EventKind::TokenUsage(e) => e.validate(),
            EventKind::Text(_) => Ok(()),
            EventKind::SessionStart(_) => Ok(()),
            EventKind::Skip(_) => Ok(()),
        }
    }
}

fn skip_type_name(original: &str) -> &'static str {
    match original {
        "summary" => "summary",
        "file-history-snapshot" => "file-history-snapshot",
        "queue-operation" => "queue-operation",
        "init" => "init",
        "system" => "system",
        _ => "skip",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Correlation id for nested-dialect `tool_use`/`tool_result` pairing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    /// True when this event represents a `tool_result` block rather than a
    /// `tool_use` invocation.
    #[serde(default)]
    pub is_result: bool,
}

impl ToolCallEvent {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.tool_name.is_empty() {
            return Err(ValidationError::EmptyToolName);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BashCommandEvent {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_length: Option<u64>,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl BashCommandEvent {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.command.is_empty() {
            return Err(ValidationError::EmptyBashCommand);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOperationEvent {
    pub operation: String,
    pub path: String,
    #[serde(default)]
    pub size_bytes: u64,
}

impl FileOperationEvent {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.operation.is_empty() {
            return Err(ValidationError::EmptyFileOperationField("operation"));
        }
        if self.path.is_empty() {
            return Err(ValidationError::EmptyFileOperationField("path"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsageEvent {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

impl TokenUsageEvent {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(cost) = self.cost_usd {
            if cost < 0.0 {
                return Err(ValidationError::NegativeTokenCount);
            }
        }
        Ok(())
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipEvent {
    pub original_type: String,
}
