use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use conductor_store::{CancellationToken, Store};

use crate::config::Config;
use crate::error::Result;
use crate::flusher::Flusher;
use crate::lock::IngestLock;
use crate::reader::IncrementalReader;
use crate::stats::{Stats, StatsTracker};
use crate::watch::{FileOp, FileWatcher};

const STATS_EVENTS_TICK: Duration = Duration::from_millis(100);

/// Orchestrates the watch → read → flush pipeline (spec.md §4, §5, §9).
///
/// `start` performs a blocking catch-up scan of every file currently
/// matching the root/pattern, flushing whatever it accumulates, then spawns
/// two background threads: one draining the watcher's debounced events into
/// the reader/flusher, the other ticking the flusher on `batch_timeout` so
/// a slow trickle of events is never held indefinitely. `stop` is
/// idempotent and blocks until both threads have exited and the lock file
/// is released.
pub struct Engine {
    config: Config,
    store: Arc<dyn Store>,
    stats: Arc<StatsTracker>,
    flusher: Arc<Flusher>,
    cancel: CancellationToken,
    lock: Option<IngestLock>,
    event_thread: Option<JoinHandle<()>>,
    timer_thread: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        let config = config.normalized();
        let cancel = CancellationToken::new();
        let stats = Arc::new(StatsTracker::new());
        let flusher = Arc::new(Flusher::new(
            store.clone(),
            config.batch_size,
            cancel.clone(),
            stats.clone(),
        ));
        Self {
            config,
            store,
            stats,
            flusher,
            cancel,
            lock: None,
            event_thread: None,
            timer_thread: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats.snapshot(self.flusher.pending_len() as u64)
    }

    /// Acquires the single-writer lock, performs the blocking catch-up
    /// scan, then starts the watch/flush threads. Calling `start` twice
    /// without an intervening `stop` is a logic error the caller must
    /// avoid; a fresh lock acquisition would simply fail.
    pub fn start(&mut self) -> Result<()> {
        let lock_path = self.config.resolved_lock_path();
        let lock = IngestLock::acquire(&lock_path)?;

        self.catch_up()?;
        self.flusher.flush()?;

        let watcher = FileWatcher::new(&self.config.root_dir, &self.config.pattern)?;

        self.running.store(true, Ordering::SeqCst);

        let event_thread = self.spawn_event_thread(watcher);
        let timer_thread = self.spawn_timer_thread();

        self.lock = Some(lock);
        self.event_thread = Some(event_thread);
        self.timer_thread = Some(timer_thread);
        Ok(())
    }

    /// Idempotent: a second call after a successful `stop` is a no-op.
    /// The watcher itself lives inside the event thread and is closed
    /// there once it observes `running` go false.
    pub fn stop(&mut self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.cancel.cancel();

        if let Some(handle) = self.event_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.timer_thread.take() {
            let _ = handle.join();
        }

        self.flusher.flush()?;
        self.lock = None;
        Ok(())
    }

    /// Blocking pre-scan of every file under `root_dir` currently matching
    /// `pattern` (spec.md §4.F "Startup"). Runs once, synchronously, before
    /// the watch threads start so that a freshly-started engine reflects
    /// everything already on disk.
    fn catch_up(&self) -> Result<()> {
        let sessions = conductor_discovery::discover(&self.config.root_dir);
        let pattern = compile_pattern(&self.config.pattern);
        for session in sessions {
            if matches_pattern(&pattern, &session.path) {
                self.ingest_one(&session.path)?;
            }
        }
        Ok(())
    }

    fn ingest_one(&self, path: &Path) -> Result<()> {
        let reader = IncrementalReader::new(self.store.as_ref(), self.cancel.clone());
        let outcome = reader.process_file(path)?;
        if outcome.lines_read > 0 {
            self.stats.record_file_tracked();
        }
        for read_event in outcome.events {
            self.flusher
                .enqueue(read_event.event, path.to_path_buf(), read_event.session_id);
        }
        if outcome.parse_errors > 0 {
            for _ in 0..outcome.parse_errors {
                self.stats.record_error();
            }
        }
        Ok(())
    }

    fn spawn_event_thread(&self, mut watcher: FileWatcher) -> JoinHandle<()> {
        let store = self.store.clone();
        let flusher = self.flusher.clone();
        let stats = self.stats.clone();
        let cancel = self.cancel.clone();
        let running = self.running.clone();

        std::thread::Builder::new()
            .name("conductor-events".to_string())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    match watcher.events().recv_timeout(STATS_EVENTS_TICK) {
                        Ok(event) => {
                            if cancel.is_cancelled() {
                                break;
                            }
                            let path = event.path.clone();
                            match event.op {
                                FileOp::Removed => flusher.forget_path(&path),
                                FileOp::Created | FileOp::Written => {
                                    let reader = IncrementalReader::new(store.as_ref(), cancel.clone());
                                    match reader.process_file(&path) {
                                        Ok(outcome) => {
                                            if outcome.lines_read > 0 {
                                                stats.record_file_tracked();
                                            }
                                            for read_event in outcome.events {
                                                flusher.enqueue(
                                                    read_event.event,
                                                    path.clone(),
                                                    read_event.session_id,
                                                );
                                            }
                                            for _ in 0..outcome.parse_errors {
                                                stats.record_error();
                                            }
                                        }
                                        Err(err) => {
                                            stats.record_error();
                                            eprintln!("conductor-engine: failed to read {}: {}", path.display(), err);
                                        }
                                    }
                                }
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                watcher.close();
            })
            .expect("failed to spawn conductor-events thread")
    }

    fn spawn_timer_thread(&self) -> JoinHandle<()> {
        let flusher = self.flusher.clone();
        let running = self.running.clone();
        let timeout = self.config.batch_timeout();

        std::thread::Builder::new()
            .name("conductor-flush-timer".to_string())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    std::thread::sleep(timeout);
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    let _ = flusher.flush();
                }
            })
            .expect("failed to spawn conductor-flush-timer thread")
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn compile_pattern(pattern: &str) -> glob::Pattern {
    let pattern = if pattern.is_empty() { "*" } else { pattern };
    glob::Pattern::new(pattern).unwrap_or_else(|_| glob::Pattern::new("*").unwrap())
}

fn matches_pattern(pattern: &glob::Pattern, path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => pattern.matches(name),
        None => false,
    }
}
