use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use conductor_types::{BashCommandEvent, FileOperationEvent, IngestOffset, ToolCallEvent};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::traits::{SessionHint, Store};

// Schema-on-read: the durable offsets and session rollups here are an
// index over the JSONL files, not the source of truth. Re-ingesting from
// offset 0 against an empty database always reproduces the same rollups,
// so the schema can evolve freely without a migration story.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS file_offsets (
    file_path TEXT PRIMARY KEY,
    byte_offset INTEGER NOT NULL,
    inode INTEGER NOT NULL,
    last_line_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    external_id TEXT NOT NULL UNIQUE,
    project TEXT NOT NULL,
    agent_name TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    first_seen TEXT,
    last_seen TEXT,
    duration_sec INTEGER NOT NULL DEFAULT 0,
    model_name TEXT,
    tokens_total INTEGER NOT NULL DEFAULT 0,
    cost_total REAL NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS tool_executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    success INTEGER NOT NULL,
    duration_ms INTEGER,
    FOREIGN KEY(session_id) REFERENCES sessions(id)
);

CREATE TABLE IF NOT EXISTS bash_commands (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    command TEXT NOT NULL,
    exit_code INTEGER,
    success INTEGER NOT NULL,
    duration_ms INTEGER,
    FOREIGN KEY(session_id) REFERENCES sessions(id)
);

CREATE TABLE IF NOT EXISTS file_operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    operation TEXT NOT NULL,
    path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    FOREIGN KEY(session_id) REFERENCES sessions(id)
);

CREATE INDEX IF NOT EXISTS idx_tool_executions_session ON tool_executions(session_id);
CREATE INDEX IF NOT EXISTS idx_bash_commands_session ON bash_commands(session_id);
CREATE INDEX IF NOT EXISTS idx_file_operations_session ON file_operations(session_id);
CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project);
"#;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Resolves a possibly-ambiguous internal-id prefix (short ids as
    /// surfaced by a CLI) to exactly one session id.
    pub fn find_session_by_prefix(&self, prefix: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("{}%", prefix);
        let mut stmt = conn.prepare("SELECT id FROM sessions WHERE id LIKE ?1 LIMIT 2")?;
        let mut matches: Vec<String> = stmt
            .query_map([&pattern], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches.remove(0))),
            _ => Err(Error::AmbiguousSessionPrefix(prefix.to_string())),
        }
    }
}

impl Store for SqliteStore {
    fn get_file_offset(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<IngestOffset>> {
        Self::check_cancelled(cancel)?;
        let conn = self.conn.lock().unwrap();
        let path_str = path.to_string_lossy();
        let result = conn
            .query_row(
                "SELECT file_path, byte_offset, inode, last_line_hash FROM file_offsets WHERE file_path = ?1",
                [path_str.as_ref()],
                |row| {
                    let file_path: String = row.get(0)?;
                    Ok(IngestOffset {
                        file_path: PathBuf::from(file_path),
                        byte_offset: row.get::<_, i64>(1)? as u64,
                        inode: row.get::<_, i64>(2)? as u64,
                        last_line_hash: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    fn set_file_offset(&self, offset: &IngestOffset, cancel: &CancellationToken) -> Result<()> {
        Self::check_cancelled(cancel)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO file_offsets (file_path, byte_offset, inode, last_line_hash)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(file_path) DO UPDATE SET
                byte_offset = ?2,
                inode = ?3,
                last_line_hash = ?4
            "#,
            params![
                offset.file_path.to_string_lossy(),
                offset.byte_offset as i64,
                offset.inode as i64,
                offset.last_line_hash,
            ],
        )?;
        Ok(())
    }

    fn upsert_session(
        &self,
        external_id: &str,
        _file_path: &Path,
        hint: &SessionHint,
        cancel: &CancellationToken,
    ) -> Result<(String, bool)> {
        Self::check_cancelled(cancel)?;
        let conn = self.conn.lock().unwrap();

        if let Some(id) = conn
            .query_row(
                "SELECT id FROM sessions WHERE external_id = ?1",
                [external_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?
        {
            return Ok((id, false));
        }

        let internal_id = Uuid::new_v4().to_string();
        conn.execute(
            r#"
            INSERT INTO sessions (id, external_id, project, agent_name)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![internal_id, external_id, hint.project, hint.agent_name],
        )?;
        Ok((internal_id, true))
    }

    fn append_tool_execution(
        &self,
        session_id: &str,
        data: &ToolCallEvent,
        cancel: &CancellationToken,
    ) -> Result<()> {
        Self::check_cancelled(cancel)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tool_executions (session_id, tool_name, success, duration_ms) VALUES (?1, ?2, ?3, ?4)",
            params![
                session_id,
                data.tool_name,
                data.success,
                data.duration_ms.map(|d| d as i64),
            ],
        )?;
        if !data.success {
            conn.execute(
                "UPDATE sessions SET error_count = error_count + 1 WHERE id = ?1",
                [session_id],
            )?;
        }
        Ok(())
    }

    fn append_bash_command(
        &self,
        session_id: &str,
        data: &BashCommandEvent,
        cancel: &CancellationToken,
    ) -> Result<()> {
        Self::check_cancelled(cancel)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO bash_commands (session_id, command, exit_code, success, duration_ms) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                data.command,
                data.exit_code,
                data.success,
                data.duration_ms.map(|d| d as i64),
            ],
        )?;
        if !data.success {
            conn.execute(
                "UPDATE sessions SET error_count = error_count + 1 WHERE id = ?1",
                [session_id],
            )?;
        }
        Ok(())
    }

    fn append_file_operation(
        &self,
        session_id: &str,
        data: &FileOperationEvent,
        cancel: &CancellationToken,
    ) -> Result<()> {
        Self::check_cancelled(cancel)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO file_operations (session_id, operation, path, size_bytes) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, data.operation, data.path, data.size_bytes as i64],
        )?;
        Ok(())
    }

    fn update_session_aggregates(
        &self,
        session_id: &str,
        tokens_delta: u64,
        cost_delta: Option<f64>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        Self::check_cancelled(cancel)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sessions SET tokens_total = tokens_total + ?1, cost_total = cost_total + ?2 WHERE id = ?3",
            params![tokens_delta as i64, cost_delta.unwrap_or(0.0), session_id],
        )?;
        Ok(())
    }

    fn update_session_timestamps(
        &self,
        session_id: &str,
        first: DateTime<Utc>,
        last: DateTime<Utc>,
        duration_sec: i64,
        model: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        Self::check_cancelled(cancel)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            UPDATE sessions SET
                first_seen = COALESCE(first_seen, ?1),
                last_seen = ?2,
                duration_sec = ?3,
                model_name = COALESCE(?4, model_name)
            WHERE id = ?5
            "#,
            params![
                first.to_rfc3339(),
                last.to_rfc3339(),
                duration_sec,
                model,
                session_id,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint() -> SessionHint {
        SessionHint {
            project: "demo".to_string(),
            agent_name: Some("claude".to_string()),
        }
    }

    #[test]
    fn upsert_session_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        let (id1, is_new1) = store
            .upsert_session("ext-1", Path::new("/a.jsonl"), &hint(), &cancel)
            .unwrap();
        assert!(is_new1);
        let (id2, is_new2) = store
            .upsert_session("ext-1", Path::new("/a.jsonl"), &hint(), &cancel)
            .unwrap();
        assert!(!is_new2);
        assert_eq!(id1, id2);
    }

    #[test]
    fn file_offset_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        assert!(store
            .get_file_offset(Path::new("/a.jsonl"), &cancel)
            .unwrap()
            .is_none());

        let offset = IngestOffset {
            file_path: PathBuf::from("/a.jsonl"),
            byte_offset: 42,
            inode: 7,
            last_line_hash: "deadbeef".to_string(),
        };
        store.set_file_offset(&offset, &cancel).unwrap();

        let loaded = store
            .get_file_offset(Path::new("/a.jsonl"), &cancel)
            .unwrap()
            .unwrap();
        assert_eq!(loaded, offset);
    }

    #[test]
    fn append_failed_tool_execution_increments_error_count() {
        let store = SqliteStore::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        let (session_id, _) = store
            .upsert_session("ext-1", Path::new("/a.jsonl"), &hint(), &cancel)
            .unwrap();

        store
            .append_tool_execution(
                &session_id,
                &ToolCallEvent {
                    tool_name: "bash".to_string(),
                    parameters: serde_json::Value::Null,
                    success: false,
                    duration_ms: Some(12),
                    tool_use_id: None,
                    is_result: false,
                },
                &cancel,
            )
            .unwrap();

        let conn = store.conn.lock().unwrap();
        let error_count: i64 = conn
            .query_row(
                "SELECT error_count FROM sessions WHERE id = ?1",
                [&session_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(error_count, 1);
    }

    #[test]
    fn cancelled_token_aborts_before_touching_the_database() {
        let store = SqliteStore::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = store.get_file_offset(Path::new("/a.jsonl"), &cancel);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
