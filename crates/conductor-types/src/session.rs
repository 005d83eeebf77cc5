use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::event::Event;

/// One agent session. `id` and `project` are required; `status` is opaque
/// to the core (active/completed/failed/... are caller conventions, not
/// enforced here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    /// Overrides any `agent-{id}` filename-derived fallback when a
    /// human-readable agent type was present in the session metadata.
    pub agent_name: Option<String>,
    pub duration_ms: i64,
    pub success: bool,
    pub error_count: u64,
}

impl Session {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingSessionId);
        }
        if self.project.is_empty() {
            return Err(ValidationError::MissingSessionProject);
        }
        if self.timestamp.timestamp() == 0 && self.timestamp.timestamp_subsec_nanos() == 0 {
            return Err(ValidationError::ZeroTimestamp);
        }
        Ok(())
    }
}

/// Parse output for one session file: the session header plus every event
/// decoded from its lines. For the nested dialect a single input line may
/// contribute several entries to `events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub session: Session,
    pub events: Vec<Event>,
}

impl SessionData {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            events: Vec::new(),
        }
    }
}

/// Per-tool-name aggregation produced by the extractor.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolExecution {
    pub name: String,
    pub count: u64,
    pub total_success: u64,
    pub total_errors: u64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub avg_duration_ms: f64,
}

/// A bash command passed through from a session's events, unaggregated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BashCommandRecord {
    pub command: String,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub duration_ms: Option<u64>,
}

/// A file operation passed through from a session's events, unaggregated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOperationRecord {
    pub operation: String,
    pub path: String,
    pub size_bytes: u64,
}

/// Summed token usage across a session, with cost filled in from the
/// pricing table when the event stream did not already carry it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TokenUsageSummary {
    pub input: u64,
    pub output: u64,
    pub cost: f64,
    pub model_name: Option<String>,
}

/// Per-session aggregate produced by `extract`. `nil`/absent input produces
/// an empty, valid value — every numeric field defaults to zero and every
/// rate defaults to 0.0, which trivially satisfies the `[0,1]` bound.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BehavioralMetrics {
    pub total_sessions: u64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub total_errors: u64,
    pub average_duration: f64,
    pub total_cost: f64,
    pub token_usage: TokenUsageSummary,
    pub agent_performance: HashMap<String, u64>,
    pub tool_executions: Vec<ToolExecution>,
    pub bash_commands: Vec<BashCommandRecord>,
    pub file_operations: Vec<FileOperationRecord>,
}

impl BehavioralMetrics {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.success_rate) || !(0.0..=1.0).contains(&self.error_rate) {
            return Err(ValidationError::NegativeTokenCount);
        }
        Ok(())
    }
}

/// Durable per-file ingest progress, uniquely keyed by `file_path`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestOffset {
    pub file_path: PathBuf,
    pub byte_offset: u64,
    /// Platform inode number; opaque beyond equality comparison.
    pub inode: u64,
    pub last_line_hash: String,
}

impl IngestOffset {
    pub fn fresh(file_path: PathBuf) -> Self {
        Self {
            file_path,
            byte_offset: 0,
            inode: 0,
            last_line_hash: String::new(),
        }
    }
}

/// One LRU slot. Held by both the lookup map and the eviction order; both
/// references are dropped together on eviction (see `conductor-cache`).
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub metrics: BehavioralMetrics,
    pub mtime: SystemTime,
    pub file_path: PathBuf,
}
