use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const DEFAULT_PATTERN: &str = "*.jsonl";
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_BATCH_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_LOCK_FILE: &str = ".conductor/ingestion.lock";

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_batch_timeout_ms() -> u64 {
    DEFAULT_BATCH_TIMEOUT_MS
}

fn default_lock_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOCK_FILE)
}

/// Engine configuration (spec.md §6). Loadable from TOML, mirroring the
/// teacher's `agtrace-runtime::Config::load_from`/`save_to` convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub root_dir: PathBuf,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
}

impl Config {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            pattern: DEFAULT_PATTERN.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout_ms: DEFAULT_BATCH_TIMEOUT_MS,
            lock_file: PathBuf::from(DEFAULT_LOCK_FILE),
        }
        .normalized()
    }

    /// Non-positive batch settings fall back to the documented defaults
    /// (spec.md §6); an empty pattern falls back to "match all".
    pub fn normalized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
        if self.batch_timeout_ms == 0 {
            self.batch_timeout_ms = DEFAULT_BATCH_TIMEOUT_MS;
        }
        self
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Resolves `lock_file` against `root_dir` when it is a relative path,
    /// matching the default `.conductor/ingestion.lock` being rooted under
    /// the watched directory.
    pub fn resolved_lock_path(&self) -> PathBuf {
        if self.lock_file.is_absolute() {
            self.lock_file.clone()
        } else {
            self.root_dir.join(&self.lock_file)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config.normalized())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn non_positive_batch_settings_fall_back_to_defaults() {
        let config = Config {
            root_dir: PathBuf::from("/tmp"),
            pattern: String::new(),
            batch_size: 0,
            batch_timeout_ms: 0,
            lock_file: PathBuf::from(DEFAULT_LOCK_FILE),
        }
        .normalized();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.batch_timeout_ms, DEFAULT_BATCH_TIMEOUT_MS);
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::new("/var/log/agents");
        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.root_dir, config.root_dir);
        assert_eq!(loaded.batch_size, config.batch_size);
    }

    #[test]
    fn relative_lock_file_resolves_under_root() {
        let config = Config::new("/var/log/agents");
        assert_eq!(
            config.resolved_lock_path(),
            PathBuf::from("/var/log/agents/.conductor/ingestion.lock")
        );
    }
}
