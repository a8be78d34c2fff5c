//! Per-file analysis cache
//!
//! Each analyzed path moves through `Idle -> Requesting -> {Cached, Failed}`.
//! A cached result survives a failed re-analysis and is only replaced by a
//! newer successful one or dropped by an explicit clear.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::anomaly::AnalysisResult;

/// Analysis status of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Idle,
    Requesting,
    Cached,
    Failed,
}

impl FileStatus {
    /// Check if moving to `next` is a valid transition
    pub fn can_transition_to(self, next: FileStatus) -> bool {
        matches!(
            (self, next),
            (FileStatus::Idle, FileStatus::Requesting)
                | (FileStatus::Cached, FileStatus::Requesting)
                | (FileStatus::Failed, FileStatus::Requesting)
                | (FileStatus::Requesting, FileStatus::Cached)
                | (FileStatus::Requesting, FileStatus::Failed)
        )
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Idle => "idle",
            FileStatus::Requesting => "requesting",
            FileStatus::Cached => "cached",
            FileStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    status: FileStatus,
    result: Option<AnalysisResult>,
    last_error: Option<String>,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            status: FileStatus::Idle,
            result: None,
            last_error: None,
        }
    }
}

/// Analysis results keyed by file path
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: Mutex<BTreeMap<PathBuf, Entry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut BTreeMap<PathBuf, Entry>) -> T) -> T {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut entries)
    }

    fn transition(&self, path: &Path, next: FileStatus, apply: impl FnOnce(&mut Entry)) {
        self.with_entries(|entries| {
            let entry = entries.entry(path.to_path_buf()).or_default();
            if !entry.status.can_transition_to(next) {
                debug!(
                    path = %path.display(),
                    from = %entry.status,
                    to = %next,
                    "Unexpected cache transition"
                );
            }
            entry.status = next;
            apply(entry);
        });
    }

    /// Mark an analysis of `path` as in flight
    pub fn begin(&self, path: &Path) {
        self.transition(path, FileStatus::Requesting, |_| {});
    }

    /// Store a successful result, replacing any previous one
    pub fn store(&self, path: &Path, result: AnalysisResult) {
        self.transition(path, FileStatus::Cached, |entry| {
            entry.result = Some(result);
            entry.last_error = None;
        });
    }

    /// Record a failed analysis, keeping any earlier result
    pub fn fail(&self, path: &Path, error: impl Into<String>) {
        let error = error.into();
        self.transition(path, FileStatus::Failed, |entry| {
            entry.last_error = Some(error);
        });
    }

    pub fn status(&self, path: &Path) -> FileStatus {
        self.with_entries(|entries| entries.get(path).map_or(FileStatus::Idle, |e| e.status))
    }

    pub fn last_error(&self, path: &Path) -> Option<String> {
        self.with_entries(|entries| entries.get(path).and_then(|e| e.last_error.clone()))
    }

    /// The cached result for one path
    pub fn get(&self, path: &Path) -> Option<AnalysisResult> {
        self.with_entries(|entries| entries.get(path).and_then(|e| e.result.clone()))
    }

    /// All cached results in path order
    pub fn all(&self) -> Vec<AnalysisResult> {
        self.with_entries(|entries| entries.values().filter_map(|e| e.result.clone()).collect())
    }

    /// Paths with a cached result
    pub fn paths(&self) -> Vec<PathBuf> {
        self.with_entries(|entries| {
            entries
                .iter()
                .filter(|(_, e)| e.result.is_some())
                .map(|(p, _)| p.clone())
                .collect()
        })
    }

    /// Evict one path, or everything when `path` is `None`
    pub fn clear(&self, path: Option<&Path>) {
        self.with_entries(|entries| match path {
            Some(path) => {
                entries.remove(path);
            }
            None => entries.clear(),
        });
    }

    pub fn len(&self) -> usize {
        self.with_entries(|entries| entries.values().filter(|e| e.result.is_some()).count())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
