use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use conductor_store::{CancellationToken, SessionHint, Store};
use conductor_types::{Event, EventKind};

use crate::error::Result;
use crate::stats::StatsTracker;

static AGENT_HEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^agent-([0-9a-f]+)\.jsonl$").unwrap());

/// Default size trigger (spec.md §4.G, §6).
pub const DEFAULT_BATCH_SIZE: usize = 50;

struct PendingEntry {
    event: Event,
    external_id: String,
    file_path: PathBuf,
}

struct SessionTime {
    first: DateTime<Utc>,
    last: DateTime<Utc>,
    model: Option<String>,
}

struct Inner {
    buffer: Vec<PendingEntry>,
    /// external id → internal id, the idempotent upsert cache.
    session_cache: HashMap<String, String>,
    /// internal id → first/last-seen timestamps and model, accumulated
    /// over the lifetime of the session's pending membership (spec.md
    /// §4.G "Timestamp aggregation"), not reset per flush.
    session_time: HashMap<String, SessionTime>,
    /// path → external ids touched through that path, so a `Removed`
    /// watcher event can drop the in-memory correlation without deleting
    /// the durable offset (spec.md §4.F "Rotation").
    path_external_ids: HashMap<PathBuf, HashSet<String>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            session_cache: HashMap::new(),
            session_time: HashMap::new(),
            path_external_ids: HashMap::new(),
        }
    }
}

/// Buffers `(event, external-session-id, file-path)` triples and drives the
/// persistence interface on a size or timeout trigger (spec.md §4.G).
/// At most one flush executes at a time: the mutex guarding the buffer is
/// held for the buffer mutation *and* the flush itself.
pub struct Flusher {
    store: std::sync::Arc<dyn Store>,
    batch_size: usize,
    cancel: CancellationToken,
    stats: std::sync::Arc<StatsTracker>,
    inner: Mutex<Inner>,
}

impl Flusher {
    pub fn new(
        store: std::sync::Arc<dyn Store>,
        batch_size: usize,
        cancel: CancellationToken,
        stats: std::sync::Arc<StatsTracker>,
    ) -> Self {
        Self {
            store,
            batch_size: if batch_size == 0 { DEFAULT_BATCH_SIZE } else { batch_size },
            cancel,
            stats,
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Enqueues one event. `line_session_id` is whatever `sessionId` the
    /// event's own line carried, if any. Triggers an immediate synchronous
    /// flush once the buffer reaches `batch_size`.
    pub fn enqueue(&self, event: Event, file_path: PathBuf, line_session_id: Option<String>) {
        let external_id = external_id_for(&file_path, line_session_id.as_deref());

        let should_flush = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .path_external_ids
                .entry(file_path.clone())
                .or_default()
                .insert(external_id.clone());
            inner.buffer.push(PendingEntry {
                event,
                external_id,
                file_path,
            });
            inner.buffer.len() >= self.batch_size
        };

        if should_flush {
            let _ = self.flush();
        }
    }

    /// Drops in-memory session correlation for `path` without touching the
    /// durable offset (spec.md §4.F rotation handling).
    pub fn forget_path(&self, path: &Path) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(ids) = inner.path_external_ids.remove(path) {
            for id in ids {
                inner.session_cache.remove(&id);
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().unwrap().buffer.len()
    }

    /// Forces a flush regardless of the size trigger; used by both the
    /// size trigger itself and the engine's timeout ticker.
    pub fn flush(&self) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if inner.buffer.is_empty() {
            return Ok(0);
        }
        let entries = std::mem::take(&mut inner.buffer);
        let count = entries.len();

        let mut touched = HashSet::new();
        for entry in entries {
            match self.dispatch(entry, &mut inner) {
                Ok(internal_id) => {
                    touched.insert(internal_id);
                }
                Err(err) => {
                    // Store append errors are logged and counted; the
                    // batch continues (spec.md §7 class 4).
                    self.stats.record_error();
                    eprintln!("conductor-engine: store append failed: {err}");
                }
            }
        }

        for internal_id in touched {
            if let Some(t) = inner.session_time.get(&internal_id) {
                let duration_sec = (t.last - t.first).num_seconds().max(0);
                if let Err(err) = self.store.update_session_timestamps(
                    &internal_id,
                    t.first,
                    t.last,
                    duration_sec,
                    t.model.as_deref(),
                    &self.cancel,
                ) {
                    self.stats.record_error();
                    eprintln!("conductor-engine: timestamp update failed: {err}");
                }
            }
        }

        drop(inner);
        self.stats.record_events(count as u64);
        self.stats.record_flush();
        Ok(count)
    }

    fn dispatch(&self, entry: PendingEntry, inner: &mut Inner) -> Result<String> {
        let internal_id = match inner.session_cache.get(&entry.external_id) {
            Some(id) => id.clone(),
            None => {
                let hint = SessionHint {
                    project: conductor_discovery::infer_project(&entry.file_path).unwrap_or_default(),
                    agent_name: agent_fallback_name(&entry.external_id),
                };
                let (id, is_new) =
                    self.store
                        .upsert_session(&entry.external_id, &entry.file_path, &hint, &self.cancel)?;
                if is_new {
                    self.stats.record_session_created();
                }
                inner.session_cache.insert(entry.external_id.clone(), id.clone());
                id
            }
        };

        let ts = entry.event.timestamp;
        let tracker = inner
            .session_time
            .entry(internal_id.clone())
            .or_insert(SessionTime {
                first: ts,
                last: ts,
                model: None,
            });
        if ts < tracker.first {
            tracker.first = ts;
        }
        if ts > tracker.last {
            tracker.last = ts;
        }

        match &entry.event.kind {
            EventKind::ToolCall(data) => self.store.append_tool_execution(&internal_id, data, &self.cancel)?,
            EventKind::BashCommand(data) => self.store.append_bash_command(&internal_id, data, &self.cancel)?,
            EventKind::FileOperation(data) => {
                self.store.append_file_operation(&internal_id, data, &self.cancel)?
            }
            EventKind::TokenUsage(data) => {
                self.store.update_session_aggregates(
                    &internal_id,
                    data.total_tokens(),
                    data.cost_usd,
                    &self.cancel,
                )?;
                if let Some(model) = &data.model_name {
                    inner.session_time.get_mut(&internal_id).unwrap().model = Some(model.clone());
                }
            }
            // Unknown/non-actionable variants are discarded (spec.md §4.G).
            EventKind::Text(_) | EventKind::SessionStart(_) | EventKind::Skip(_) => {}
        }

        Ok(internal_id)
    }
}

/// Derives the session-correlation external id for one event (spec.md
/// §4.G "Session correlation"). Agent files get a composite id so sibling
/// agent subprocesses sharing their parent's `sessionId` don't collide;
/// otherwise the event's own `sessionId` is used, falling back to the file
/// path itself when nothing else is available.
fn external_id_for(path: &Path, line_session_id: Option<&str>) -> String {
    if let Some(hex) = agent_hex(path) {
        match line_session_id {
            Some(parent) if !parent.is_empty() => format!("{parent}-agent-{hex}"),
            _ => format!("agent-{hex}"),
        }
    } else if let Some(id) = line_session_id.filter(|s| !s.is_empty()) {
        id.to_string()
    } else {
        path.to_string_lossy().into_owned()
    }
}

fn agent_hex(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    AGENT_HEX_RE.captures(name).map(|c| c[1].to_string())
}

/// `agent-{id}` fallback naming per spec.md §3, used only as seed data on
/// first upsert; a human-readable `agentType` from session metadata, when
/// known, overrides it downstream.
fn agent_fallback_name(external_id: &str) -> Option<String> {
    external_id.rsplit_once("agent-").map(|(_, hex)| format!("agent-{hex}"))
}
