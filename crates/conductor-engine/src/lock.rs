use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Error, Result};

/// Advisory, non-blocking exclusive lock guarding the single-writer
/// invariant (spec.md §4.F, §6): two engines pointed at the same root must
/// not ingest concurrently. Held for the engine's entire lifetime and
/// released exactly once by `Stop`.
pub struct IngestLock {
    file: Option<File>,
    path: PathBuf,
}

impl IngestLock {
    /// Opens (creating parent directories and the file itself as needed,
    /// permission `0644`) and locks `path`. `WouldBlock` maps to the
    /// dedicated "another engine is running" error rather than a generic
    /// IO error, per spec.md §4.F.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = open_lock_file(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                file: Some(file),
                path: path.to_path_buf(),
            }),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Err(Error::AnotherEngineRunning),
            Err(err) => Err(err.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock. Idempotent: a second call is a no-op because the
    /// file handle is already gone.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

impl Drop for IngestLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(unix)]
fn open_lock_file(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .create(true)
        .write(true)
        .mode(0o644)
        .open(path)
}

#[cfg(not(unix))]
fn open_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).write(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_on_same_path_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/ingestion.lock");
        let first = IngestLock::acquire(&path).unwrap();
        let second = IngestLock::acquire(&path);
        assert!(matches!(second, Err(Error::AnotherEngineRunning)));
        drop(first);
    }

    #[test]
    fn release_then_reacquire_succeeds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ingestion.lock");
        let mut first = IngestLock::acquire(&path).unwrap();
        first.release();
        let second = IngestLock::acquire(&path);
        assert!(second.is_ok());
    }
}
