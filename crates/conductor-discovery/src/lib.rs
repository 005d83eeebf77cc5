mod error;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use once_cell::sync::Lazy;
use regex::Regex;
use walkdir::WalkDir;

pub use error::{Error, Result};

/// `agent-<hex>.jsonl`, e.g. `agent-4f9c2a.jsonl`.
static AGENT_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^agent-[0-9a-f]+\.jsonl$").unwrap());

/// `<uuid-v4>.jsonl`.
static UUID_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\.jsonl$",
    )
    .unwrap()
});

/// Filesystem metadata for one discovered session file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub path: PathBuf,
    pub project: String,
    pub modified: Option<SystemTime>,
    pub size: u64,
}

/// True when `file_name` matches one of the two recognised session-file
/// shapes. Non-matching files (and directories) are ignored by discovery.
pub fn is_session_file(file_name: &str) -> bool {
    AGENT_FILE_RE.is_match(file_name) || UUID_FILE_RE.is_match(file_name)
}

/// Expands a leading `~` to the user's home directory. Any other path is
/// returned unchanged.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home);
        }
    }
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Infers the project name from the session file's parent directory, or
/// the grandparent when the direct parent is literally named `projects`
/// (the common `{base}/projects/{project}/{session}` layout).
pub fn infer_project(path: &Path) -> Option<String> {
    let parent = path.parent()?;
    let parent_name = parent.file_name()?.to_str()?;
    if parent_name == "projects" {
        let grandparent = parent.parent()?;
        return grandparent
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string());
    }
    Some(parent_name.to_string())
}

/// Recursively walks `base`, matching file names against the two session
/// file patterns. Accessibility errors on any subtree are logged to stderr
/// and skipped; they never abort the overall scan. `base` not existing
/// yields an empty result rather than an error, mirroring the watcher's
/// tolerance of a non-existent root.
pub fn discover(base: &Path) -> Vec<SessionInfo> {
    if !base.exists() {
        return Vec::new();
    }

    let mut sessions = Vec::new();
    let walker = WalkDir::new(base).into_iter();
    for entry in walker.filter_map(|entry| match entry {
        Ok(entry) => Some(entry),
        Err(err) => {
            eprintln!("conductor-discovery: skipping unreadable entry: {}", err);
            None
        }
    }) {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if !is_session_file(file_name) {
            continue;
        }
        let project = match infer_project(path) {
            Some(project) => project,
            None => continue,
        };
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                eprintln!(
                    "conductor-discovery: skipping {}: {}",
                    path.display(),
                    err
                );
                continue;
            }
        };
        sessions.push(SessionInfo {
            path: path.to_path_buf(),
            project,
            modified: metadata.modified().ok(),
            size: metadata.len(),
        });
    }
    sessions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn matches_agent_and_uuid_filenames() {
        assert!(is_session_file("agent-4f9c2a.jsonl"));
        assert!(is_session_file("AGENT-4F9C2A.jsonl"));
        assert!(is_session_file(
            "550e8400-e29b-41d4-a716-446655440000.jsonl"
        ));
        assert!(!is_session_file("notes.txt"));
        assert!(!is_session_file("agent-.jsonl"));
    }

    #[test]
    fn infers_project_from_parent_directory() {
        let path = Path::new("/base/my-project/agent-abc123.jsonl");
        assert_eq!(infer_project(path), Some("my-project".to_string()));
    }

    #[test]
    fn infers_project_from_grandparent_when_parent_is_projects() {
        let path = Path::new("/base/projects/my-project/agent-abc123.jsonl");
        assert_eq!(infer_project(path), Some("my-project".to_string()));
    }

    #[test]
    fn discover_skips_non_matching_files_and_finds_sessions() {
        let dir = TempDir::new().unwrap();
        let project_dir = dir.path().join("demo-project");
        fs::create_dir_all(&project_dir).unwrap();
        fs::write(project_dir.join("agent-abc123.jsonl"), "{}\n").unwrap();
        fs::write(project_dir.join("README.md"), "ignore me").unwrap();

        let sessions = discover(dir.path());
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].project, "demo-project");
    }

    #[test]
    fn discover_tolerates_missing_base_dir() {
        let sessions = discover(Path::new("/does/not/exist/at/all"));
        assert!(sessions.is_empty());
    }
}
