mod error;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use conductor_types::BehavioralMetrics;

pub use error::{Error, Result};

const DEFAULT_MAX_SIZE: usize = 256;

/// One slot in the arena. `prev`/`next` are arena indices, not pointers —
/// the list is a vector of nodes plus integer links, which avoids the
/// back-pointer cycles an `Rc<RefCell<_>>` doubly-linked list would need.
struct Node {
    path: PathBuf,
    metrics: BehavioralMetrics,
    mtime: SystemTime,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Inner {
    arena: Vec<Option<Node>>,
    free: Vec<usize>,
    index: HashMap<PathBuf, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl Inner {
    fn new() -> Self {
        Self {
            arena: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.arena[idx].as_ref().unwrap();
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.arena[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.arena[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.arena[idx].as_mut().unwrap();
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.arena[h].as_mut().unwrap().prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn alloc(&mut self, node: Node) -> usize {
        if let Some(idx) = self.free.pop() {
            self.arena[idx] = Some(node);
            idx
        } else {
            self.arena.push(Some(node));
            self.arena.len() - 1
        }
    }

    fn remove_idx(&mut self, idx: usize) {
        self.unlink(idx);
        let node = self.arena[idx].take().unwrap();
        self.index.remove(&node.path);
        self.free.push(idx);
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// mtime-keyed LRU cache of `BehavioralMetrics`, bounded to `max_size`
/// entries and safe to share across threads via `&Cache`.
///
/// `Cache` is deliberately parse-agnostic: callers supply a `loader`
/// closure that turns a path into metrics (typically "parse the session
/// file, then run the extractor"), keeping the arena/eviction logic free
/// of any dependency on the parser or aggregator crates.
pub struct Cache {
    max_size: usize,
    inner: RwLock<Inner>,
}

impl Cache {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            inner: RwLock::new(Inner::new()),
        }
    }

    /// Returns the cached metrics for `path` if present and still fresh
    /// according to `path`'s current mtime; otherwise calls `loader` to
    /// produce fresh metrics, inserts them at the front of the LRU order,
    /// and evicts from the back until `CacheSize() <= max_size`.
    ///
    /// Multiple callers may race on a cache miss for the same path and
    /// load concurrently; the last insert to complete wins. Both racing
    /// loads produce equivalent immutable snapshots, so this is safe.
    pub fn load_session<F>(&self, path: &Path, loader: F) -> Result<BehavioralMetrics>
    where
        F: FnOnce(&Path) -> Result<BehavioralMetrics>,
    {
        let stat_mtime = std::fs::metadata(path)?.modified()?;

        if let Some(metrics) = self.try_promote(path, stat_mtime) {
            return Ok(metrics);
        }

        let metrics = loader(path)?;
        self.insert(path, metrics.clone(), stat_mtime);
        Ok(metrics)
    }

    fn try_promote(&self, path: &Path, stat_mtime: SystemTime) -> Option<BehavioralMetrics> {
        // Read-only freshness check first so concurrent lookups never
        // block each other; the promotion write only happens on a hit.
        {
            let guard = self.inner.read().unwrap();
            let idx = *guard.index.get(path)?;
            let node = guard.arena[idx].as_ref()?;
            if node.mtime != stat_mtime {
                return None;
            }
        }

        let mut guard = self.inner.write().unwrap();
        let idx = *guard.index.get(path)?;
        let fresh = guard.arena[idx].as_ref().map(|n| n.mtime == stat_mtime)?;
        if !fresh {
            return None;
        }
        guard.move_to_front(idx);
        guard.arena[idx].as_ref().map(|n| n.metrics.clone())
    }

    fn insert(&self, path: &Path, metrics: BehavioralMetrics, mtime: SystemTime) {
        let mut guard = self.inner.write().unwrap();

        if let Some(&idx) = guard.index.get(path) {
            guard.arena[idx].as_mut().unwrap().metrics = metrics;
            guard.arena[idx].as_mut().unwrap().mtime = mtime;
            guard.move_to_front(idx);
        } else {
            let idx = guard.alloc(Node {
                path: path.to_path_buf(),
                metrics,
                mtime,
                prev: None,
                next: None,
            });
            guard.index.insert(path.to_path_buf(), idx);
            guard.push_front(idx);
        }

        while guard.len() > self.max_size {
            if let Some(tail) = guard.tail {
                guard.remove_idx(tail);
            } else {
                break;
            }
        }
    }

    pub fn invalidate(&self, path: &Path) {
        let mut guard = self.inner.write().unwrap();
        if let Some(&idx) = guard.index.get(path) {
            guard.remove_idx(idx);
        }
    }

    pub fn clear(&self) {
        let mut guard = self.inner.write().unwrap();
        *guard = Inner::new();
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.inner.read().unwrap().index.contains_key(path)
    }

    pub fn cached_mtime(&self, path: &Path) -> Option<SystemTime> {
        let guard = self.inner.read().unwrap();
        let idx = *guard.index.get(path)?;
        guard.arena[idx].as_ref().map(|n| n.mtime)
    }

    pub fn size(&self) -> usize {
        self.inner.read().unwrap().len()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn miss_then_hit_does_not_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jsonl");
        fs::write(&path, "{}\n").unwrap();

        let cache = Cache::new(4);
        let loads = AtomicUsize::new(0);
        let load = |_: &Path| {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(BehavioralMetrics::default())
        };

        cache.load_session(&path, load).unwrap();
        cache.load_session(&path, load).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(cache.is_cached(&path));
    }

    #[test]
    fn mtime_change_forces_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jsonl");
        fs::write(&path, "{}\n").unwrap();

        let cache = Cache::new(4);
        let loads = AtomicUsize::new(0);
        let load = |_: &Path| {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(BehavioralMetrics::default())
        };

        cache.load_session(&path, load).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(1_900_000_000, 0)).unwrap();
        cache.load_session(&path, load).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn eviction_keeps_bound_and_drops_least_recently_used() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(3);
        let mut paths = Vec::new();
        for i in 0..5 {
            let path = dir.path().join(format!("s{i}.jsonl"));
            fs::write(&path, "{}\n").unwrap();
            cache
                .load_session(&path, |_| Ok(BehavioralMetrics::default()))
                .unwrap();
            paths.push(path);
        }

        assert_eq!(cache.size(), 3);
        assert!(!cache.is_cached(&paths[0]));
        assert!(cache.is_cached(&paths[4]));
    }

    #[test]
    fn invalidate_removes_single_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jsonl");
        fs::write(&path, "{}\n").unwrap();
        let cache = Cache::new(4);
        cache
            .load_session(&path, |_| Ok(BehavioralMetrics::default()))
            .unwrap();
        cache.invalidate(&path);
        assert!(!cache.is_cached(&path));
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn clear_resets_everything() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(4);
        for i in 0..3 {
            let path = dir.path().join(format!("s{i}.jsonl"));
            fs::write(&path, "{}\n").unwrap();
            cache
                .load_session(&path, |_| Ok(BehavioralMetrics::default()))
                .unwrap();
        }
        cache.clear();
        assert_eq!(cache.size(), 0);
    }
}
