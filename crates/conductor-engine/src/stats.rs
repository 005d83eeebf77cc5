use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Point-in-time snapshot of the engine's running counters (spec.md §4.G
/// "Observability", §9).
#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub files_tracked: u64,
    pub events_processed: u64,
    pub sessions_created: u64,
    pub errors: u64,
    pub events_pending: u64,
    pub uptime: Duration,
    pub since_last_flush: Option<Duration>,
}

/// Atomic counters plus the started/last-flush instants backing `Stats`.
/// Cheap to update from any of the engine's worker threads without
/// contending on the flusher's own buffer lock.
pub struct StatsTracker {
    files_tracked: AtomicU64,
    events_processed: AtomicU64,
    sessions_created: AtomicU64,
    errors: AtomicU64,
    started_at: Instant,
    last_flush_at: Mutex<Option<Instant>>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            files_tracked: AtomicU64::new(0),
            events_processed: AtomicU64::new(0),
            sessions_created: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started_at: Instant::now(),
            last_flush_at: Mutex::new(None),
        }
    }

    pub fn record_file_tracked(&self) {
        self.files_tracked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_events(&self, count: u64) {
        self.events_processed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        *self.last_flush_at.lock().unwrap() = Some(Instant::now());
    }

    pub fn snapshot(&self, events_pending: u64) -> Stats {
        let since_last_flush = self.last_flush_at.lock().unwrap().map(|t| t.elapsed());
        Stats {
            files_tracked: self.files_tracked.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            events_pending,
            uptime: self.started_at.elapsed(),
            since_last_flush,
        }
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_counters() {
        let stats = StatsTracker::new();
        stats.record_file_tracked();
        stats.record_events(5);
        stats.record_session_created();
        stats.record_error();

        let snap = stats.snapshot(3);
        assert_eq!(snap.files_tracked, 1);
        assert_eq!(snap.events_processed, 5);
        assert_eq!(snap.sessions_created, 1);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.events_pending, 3);
        assert!(snap.since_last_flush.is_none());
    }

    #[test]
    fn record_flush_populates_since_last_flush() {
        let stats = StatsTracker::new();
        stats.record_flush();
        let snap = stats.snapshot(0);
        assert!(snap.since_last_flush.is_some());
    }
}
