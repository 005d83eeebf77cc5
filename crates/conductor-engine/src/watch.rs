use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use notify::{Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};

use crate::error::Result;

/// Default quiescence window writes must settle within before a single
/// `Written` event is emitted (spec.md §4.E).
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
const POLL_INTERVAL: Duration = Duration::from_millis(200);
const TICK_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Created,
    Written,
    Removed,
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub op: FileOp,
}

/// Recursive, debounced, pattern-filtered directory watcher on top of
/// `notify::PollWatcher`, mirroring the teacher's
/// `agtrace-runtime::runtime::watcher`/`supervisor` channel-and-thread
/// idiom. A non-existent root is tolerated: the watcher simply never
/// subscribes and yields no events until `close`.
pub struct FileWatcher {
    watcher: Arc<Mutex<Option<PollWatcher>>>,
    events_rx: Receiver<WatchEvent>,
    errors_rx: Receiver<String>,
    closed: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl FileWatcher {
    pub fn new(root: impl AsRef<Path>, pattern: &str) -> Result<Self> {
        Self::with_debounce(root, pattern, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(root: impl AsRef<Path>, pattern: &str, debounce: Duration) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let glob_pattern = compile_pattern(pattern);

        let (raw_tx, raw_rx) = channel::<NotifyEvent>();
        let (err_tx, err_rx) = channel::<String>();
        let (out_tx, out_rx) = channel::<WatchEvent>();

        let notify_config = notify::Config::default().with_poll_interval(POLL_INTERVAL);
        let mut watcher = PollWatcher::new(
            move |res: std::result::Result<NotifyEvent, notify::Error>| match res {
                Ok(event) => {
                    let _ = raw_tx.send(event);
                }
                Err(err) => {
                    let _ = err_tx.send(err.to_string());
                }
            },
            notify_config,
        )?;

        if root.exists() {
            watcher.watch(&root, RecursiveMode::Recursive)?;
        }

        let watcher = Arc::new(Mutex::new(Some(watcher)));
        let closed = Arc::new(AtomicBool::new(false));

        let worker_watcher = watcher.clone();
        let worker_closed = closed.clone();
        let worker = std::thread::Builder::new()
            .name("conductor-watcher".to_string())
            .spawn(move || {
                debounce_loop(raw_rx, out_tx, glob_pattern, worker_watcher, debounce, worker_closed);
            })
            .ok();

        Ok(Self {
            watcher,
            events_rx: out_rx,
            errors_rx: err_rx,
            closed,
            worker,
        })
    }

    pub fn events(&self) -> &Receiver<WatchEvent> {
        &self.events_rx
    }

    pub fn errors(&self) -> &Receiver<String> {
        &self.errors_rx
    }

    /// Releases all OS subscriptions and drains both channels. Safe to
    /// call more than once.
    pub fn close(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(w) = self.watcher.lock().unwrap().take() {
            drop(w);
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        while self.events_rx.try_recv().is_ok() {}
        while self.errors_rx.try_recv().is_ok() {}
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn compile_pattern(pattern: &str) -> glob::Pattern {
    let pattern = if pattern.is_empty() { "*" } else { pattern };
    glob::Pattern::new(pattern).unwrap_or_else(|_| glob::Pattern::new("*").unwrap())
}

fn matches(pattern: &glob::Pattern, path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => pattern.matches(name),
        None => false,
    }
}

fn debounce_loop(
    raw_rx: Receiver<NotifyEvent>,
    out_tx: Sender<WatchEvent>,
    pattern: glob::Pattern,
    watcher: Arc<Mutex<Option<PollWatcher>>>,
    debounce: Duration,
    closed: Arc<AtomicBool>,
) {
    let mut pending_writes: HashMap<PathBuf, Instant> = HashMap::new();
    loop {
        if closed.load(Ordering::SeqCst) {
            return;
        }
        match raw_rx.recv_timeout(TICK_INTERVAL) {
            Ok(event) => handle_fs_event(event, &out_tx, &pattern, &watcher, &mut pending_writes),
            Err(RecvTimeoutError::Timeout) => flush_quiescent(&out_tx, &mut pending_writes, debounce),
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn handle_fs_event(
    event: NotifyEvent,
    out_tx: &Sender<WatchEvent>,
    pattern: &glob::Pattern,
    watcher: &Arc<Mutex<Option<PollWatcher>>>,
    pending_writes: &mut HashMap<PathBuf, Instant>,
) {
    match event.kind {
        EventKind::Create(_) => {
            for path in &event.paths {
                if path.is_dir() {
                    // Recursive subscription: extend coverage to the new
                    // subtree immediately rather than waiting for the next
                    // poll cycle to discover it (spec.md §4.E).
                    if let Some(w) = watcher.lock().unwrap().as_mut() {
                        let _ = w.watch(path, RecursiveMode::Recursive);
                    }
                    continue;
                }
                if matches(pattern, path) {
                    let _ = out_tx.send(WatchEvent {
                        path: path.clone(),
                        op: FileOp::Created,
                    });
                }
            }
        }
        EventKind::Modify(_) => {
            for path in &event.paths {
                if matches(pattern, path) {
                    pending_writes.insert(path.clone(), Instant::now());
                }
            }
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                if matches(pattern, path) {
                    pending_writes.remove(path);
                    let _ = out_tx.send(WatchEvent {
                        path: path.clone(),
                        op: FileOp::Removed,
                    });
                }
            }
        }
        _ => {}
    }
}

fn flush_quiescent(
    out_tx: &Sender<WatchEvent>,
    pending_writes: &mut HashMap<PathBuf, Instant>,
    debounce: Duration,
) {
    let now = Instant::now();
    let ready: Vec<PathBuf> = pending_writes
        .iter()
        .filter(|(_, seen)| now.duration_since(**seen) >= debounce)
        .map(|(path, _)| path.clone())
        .collect();
    for path in ready {
        pending_writes.remove(&path);
        let _ = out_tx.send(WatchEvent {
            path,
            op: FileOp::Written,
        });
    }
}
