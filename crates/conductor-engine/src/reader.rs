use std::io::{BufRead, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use conductor_store::{CancellationToken, Store};
use conductor_types::{Event, IngestOffset};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// One line surviving the offset/hash bookkeeping, paired with the
/// `sessionId` it carried (if any) so the flusher can correlate it without
/// re-parsing the line.
pub struct ReadEvent {
    pub event: Event,
    pub session_id: Option<String>,
}

pub struct ReadOutcome {
    /// Lines read past the skip-first check this pass (P2).
    pub lines_read: usize,
    pub events: Vec<ReadEvent>,
    /// Per-line parse failures: logged and skipped, still counted toward
    /// the byte offset (spec.md §4.F, §7 class 3).
    pub parse_errors: usize,
    /// Set when an IO error truncated the scan partway through the file
    /// (spec.md §7 class 2); the offset reflects only what was read before
    /// the failure.
    pub io_error: bool,
}

impl ReadOutcome {
    fn empty() -> Self {
        Self {
            lines_read: 0,
            events: Vec::new(),
            parse_errors: 0,
            io_error: false,
        }
    }
}

/// Converts watcher/catch-up notifications into a stream of newly
/// appended logical lines, exactly-once with respect to byte offset and
/// content hash (spec.md §4.F).
pub struct IncrementalReader<'a> {
    store: &'a dyn Store,
    cancel: CancellationToken,
}

impl<'a> IncrementalReader<'a> {
    pub fn new(store: &'a dyn Store, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }

    /// Processes one file: loads its durable offset, detects rotation,
    /// reads newly appended lines, parses them, and persists the new
    /// offset when at least one line was read.
    pub fn process_file(&self, path: &Path) -> Result<ReadOutcome> {
        let prior = self
            .store
            .get_file_offset(path, &self.cancel)?
            .unwrap_or_else(|| IngestOffset::fresh(path.to_path_buf()));

        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(ReadOutcome::empty()),
            Err(err) => return Err(err.into()),
        };

        let size = metadata.len();
        let inode = file_inode(&metadata);

        // Rotation/truncation: the file shrank since we last saw it.
        let base_offset = if size < prior.byte_offset {
            IngestOffset::fresh(path.to_path_buf())
        } else {
            prior
        };

        let file = std::fs::File::open(path)?;
        let mut reader = conductor_parser::buffered_reader(file);
        reader.seek(SeekFrom::Start(base_offset.byte_offset))?;

        let mut outcome = ReadOutcome::empty();
        let mut byte_pos = base_offset.byte_offset;
        let mut last_hash = base_offset.last_line_hash.clone();
        let mut first_line = true;
        let mut raw = String::new();

        loop {
            raw.clear();
            let read = match reader.read_line(&mut raw) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    outcome.io_error = true;
                    self.persist_progress(path, byte_pos, &last_hash, inode, outcome.lines_read)?;
                    let _ = err;
                    return Ok(outcome);
                }
            };

            let content = raw.trim_end_matches(['\n', '\r']).to_string();
            let hash = line_hash(&content);
            byte_pos += read as u64;

            if first_line {
                first_line = false;
                if !last_hash.is_empty() && hash == last_hash {
                    // The trailing newline of the prior offset's last line
                    // was included before the writer finished it; this is
                    // that same line re-surfacing, not a new one.
                    continue;
                }
            }

            last_hash = hash;
            outcome.lines_read += 1;

            if conductor_parser::parse_session_meta(&content).is_some() {
                // Session metadata never enters the event stream (spec.md §4.B).
                continue;
            }

            let session_id = peek_session_id(&content);
            match conductor_parser::parse_line(&content) {
                Ok(events) => {
                    outcome.events.extend(events.into_iter().map(|event| ReadEvent {
                        event,
                        session_id: session_id.clone(),
                    }));
                }
                Err(err) => {
                    outcome.parse_errors += 1;
                    eprintln!(
                        "conductor-engine: skipping unparsable line in {}: {}",
                        path.display(),
                        err
                    );
                }
            }
        }

        self.persist_progress(path, byte_pos, &last_hash, inode, outcome.lines_read)?;
        Ok(outcome)
    }

    fn persist_progress(
        &self,
        path: &Path,
        byte_offset: u64,
        last_line_hash: &str,
        inode: u64,
        lines_read: usize,
    ) -> Result<()> {
        if lines_read == 0 {
            return Ok(());
        }
        let offset = IngestOffset {
            file_path: path.to_path_buf(),
            byte_offset,
            inode,
            last_line_hash: last_line_hash.to_string(),
        };
        self.store.set_file_offset(&offset, &self.cancel)?;
        Ok(())
    }
}

/// Truncated (first 8 bytes, hex) SHA-256 digest over the raw line bytes.
fn line_hash(line: &str) -> String {
    let digest = Sha256::digest(line.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(unix)]
fn file_inode(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn file_inode(_metadata: &std::fs::Metadata) -> u64 {
    0
}

/// Best-effort peek at a top-level `sessionId`/`session_id` field without
/// committing to a dialect; used purely for flusher correlation hints.
fn peek_session_id(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line.trim()).ok()?;
    value
        .get("sessionId")
        .or_else(|| value.get("session_id"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_store::SessionHint;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeStore {
        offsets: Mutex<HashMap<PathBuf, IngestOffset>>,
    }

    impl Store for FakeStore {
        fn get_file_offset(
            &self,
            path: &Path,
            _cancel: &CancellationToken,
        ) -> conductor_store::Result<Option<IngestOffset>> {
            Ok(self.offsets.lock().unwrap().get(path).cloned())
        }

        fn set_file_offset(
            &self,
            offset: &IngestOffset,
            _cancel: &CancellationToken,
        ) -> conductor_store::Result<()> {
            self.offsets
                .lock()
                .unwrap()
                .insert(offset.file_path.clone(), offset.clone());
            Ok(())
        }

        fn upsert_session(
            &self,
            external_id: &str,
            _file_path: &Path,
            _hint: &SessionHint,
            _cancel: &CancellationToken,
        ) -> conductor_store::Result<(String, bool)> {
            Ok((external_id.to_string(), true))
        }

        fn append_tool_execution(
            &self,
            _sid: &str,
            _data: &conductor_types::ToolCallEvent,
            _cancel: &CancellationToken,
        ) -> conductor_store::Result<()> {
            Ok(())
        }

        fn append_bash_command(
            &self,
            _sid: &str,
            _data: &conductor_types::BashCommandEvent,
            _cancel: &CancellationToken,
        ) -> conductor_store::Result<()> {
            Ok(())
        }

        fn append_file_operation(
            &self,
            _sid: &str,
            _data: &conductor_types::FileOperationEvent,
            _cancel: &CancellationToken,
        ) -> conductor_store::Result<()> {
            Ok(())
        }

        fn update_session_aggregates(
            &self,
            _sid: &str,
            _tokens_delta: u64,
            _cost_delta: Option<f64>,
            _cancel: &CancellationToken,
        ) -> conductor_store::Result<()> {
            Ok(())
        }

        fn update_session_timestamps(
            &self,
            _sid: &str,
            _first: chrono::DateTime<chrono::Utc>,
            _last: chrono::DateTime<chrono::Utc>,
            _duration_sec: i64,
            _model: Option<&str>,
            _cancel: &CancellationToken,
        ) -> conductor_store::Result<()> {
            Ok(())
        }
    }

    fn line(ts: &str, tool: &str) -> String {
        format!(r#"{{"type":"tool_call","timestamp":"{ts}","tool_name":"{tool}","success":true}}"#)
    }

    #[test]
    fn incremental_append_reads_only_new_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent-abc123.jsonl");
        let store = FakeStore::default();
        let cancel = CancellationToken::new();

        fs::write(&path, format!("{}\n", line("2024-01-01T00:00:00Z", "a"))).unwrap();
        let reader = IncrementalReader::new(&store, cancel.clone());
        let first = reader.process_file(&path).unwrap();
        assert_eq!(first.lines_read, 1);
        assert_eq!(first.events.len(), 1);

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        use std::io::Write;
        writeln!(file, "{}", line("2024-01-01T00:00:01Z", "b")).unwrap();
        writeln!(file, "{}", line("2024-01-01T00:00:02Z", "c")).unwrap();

        let second = reader.process_file(&path).unwrap();
        assert_eq!(second.lines_read, 2);
        assert_eq!(second.events.len(), 2);

        let offset = store.offsets.lock().unwrap().get(&path).cloned().unwrap();
        let expected_len = fs::metadata(&path).unwrap().len();
        assert_eq!(offset.byte_offset, expected_len);
    }

    #[test]
    fn rotation_resets_offset_when_file_shrinks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent-def456.jsonl");
        let store = FakeStore::default();
        let cancel = CancellationToken::new();
        let reader = IncrementalReader::new(&store, cancel);

        fs::write(
            &path,
            format!(
                "{}\n{}\n",
                line("2024-01-01T00:00:00Z", "a"),
                line("2024-01-01T00:00:01Z", "b")
            ),
        )
        .unwrap();
        let first = reader.process_file(&path).unwrap();
        assert_eq!(first.lines_read, 2);
        let recorded = store.offsets.lock().unwrap().get(&path).cloned().unwrap();
        assert!(recorded.byte_offset > 0);

        fs::write(&path, format!("{}\n", line("2024-01-02T00:00:00Z", "z"))).unwrap();
        let second = reader.process_file(&path).unwrap();
        assert_eq!(second.lines_read, 1);
        let new_offset = store.offsets.lock().unwrap().get(&path).cloned().unwrap();
        assert_eq!(new_offset.byte_offset, fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn session_metadata_lines_never_become_events() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent-meta.jsonl");
        let store = FakeStore::default();
        let cancel = CancellationToken::new();
        let reader = IncrementalReader::new(&store, cancel);

        fs::write(
            &path,
            r#"{"type":"session_start","sessionId":"s1","timestamp":"2024-01-01T00:00:00Z","success":true}
"#,
        )
        .unwrap();
        let outcome = reader.process_file(&path).unwrap();
        assert_eq!(outcome.lines_read, 1);
        assert!(outcome.events.is_empty());
    }

    #[test]
    fn empty_file_yields_no_events_and_no_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent-empty.jsonl");
        fs::write(&path, "").unwrap();
        let store = FakeStore::default();
        let cancel = CancellationToken::new();
        let reader = IncrementalReader::new(&store, cancel);
        let outcome = reader.process_file(&path).unwrap();
        assert_eq!(outcome.lines_read, 0);
        assert!(outcome.events.is_empty());
        assert!(!outcome.io_error);
    }

    #[test]
    fn malformed_line_is_skipped_but_still_advances_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent-bad.jsonl");
        let store = FakeStore::default();
        let cancel = CancellationToken::new();
        let reader = IncrementalReader::new(&store, cancel);

        fs::write(&path, "not json\n").unwrap();
        let outcome = reader.process_file(&path).unwrap();
        assert_eq!(outcome.lines_read, 1);
        assert_eq!(outcome.parse_errors, 1);
        assert!(outcome.events.is_empty());
        let offset = store.offsets.lock().unwrap().get(&path).cloned().unwrap();
        assert_eq!(offset.byte_offset, fs::metadata(&path).unwrap().len());
    }
}
