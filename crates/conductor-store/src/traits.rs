use std::path::Path;

use chrono::{DateTime, Utc};
use conductor_types::{BashCommandEvent, FileOperationEvent, IngestOffset, ToolCallEvent};

use crate::cancel::CancellationToken;
use crate::error::Result;

/// Seed data for a session record created on its first upsert. Ignored on
/// subsequent upserts of the same external id.
#[derive(Debug, Clone)]
pub struct SessionHint {
    pub project: String,
    pub agent_name: Option<String>,
}

/// The narrow persistence contract the ingestion core depends on. The core
/// never reaches for SQL, a schema, or a transactional semantics of its
/// own — it only ever calls through this trait, so any compliant backend
/// (SQLite here, something else entirely in a different deployment) can
/// stand behind it.
pub trait Store: Send + Sync {
    fn get_file_offset(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<IngestOffset>>;

    fn set_file_offset(&self, offset: &IngestOffset, cancel: &CancellationToken) -> Result<()>;

    /// Idempotent upsert keyed by `external_id`. Returns the internal
    /// session id and whether this call created a new record.
    fn upsert_session(
        &self,
        external_id: &str,
        file_path: &Path,
        hint: &SessionHint,
        cancel: &CancellationToken,
    ) -> Result<(String, bool)>;

    fn append_tool_execution(
        &self,
        session_id: &str,
        data: &ToolCallEvent,
        cancel: &CancellationToken,
    ) -> Result<()>;

    fn append_bash_command(
        &self,
        session_id: &str,
        data: &BashCommandEvent,
        cancel: &CancellationToken,
    ) -> Result<()>;

    fn append_file_operation(
        &self,
        session_id: &str,
        data: &FileOperationEvent,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// `cost_delta` is `None` when no cost information was available for
    /// this flush, distinct from `Some(0.0)` meaning zero-cost tokens were
    /// observed (see DESIGN.md's resolution of the upstream ambiguity
    /// around this call).
    fn update_session_aggregates(
        &self,
        session_id: &str,
        tokens_delta: u64,
        cost_delta: Option<f64>,
        cancel: &CancellationToken,
    ) -> Result<()>;

    fn update_session_timestamps(
        &self,
        session_id: &str,
        first: DateTime<Utc>,
        last: DateTime<Utc>,
        duration_sec: i64,
        model: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<()>;
}
