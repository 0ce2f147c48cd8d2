//! Janitor types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

/// A regular file found under a janitor root
///
/// Rebuilt by every scan. `modified` is the only recency signal the janitor
/// uses; access times are never consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Running byte and file totals for a set of files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub bytes: u64,
    pub files: usize,
}

impl Totals {
    pub fn of(files: &[CachedFile]) -> Self {
        Self {
            bytes: files.iter().map(|f| f.size).sum(),
            files: files.len(),
        }
    }

    /// Account for a file that no longer exists
    pub fn remove(&mut self, file: &CachedFile) {
        self.bytes = self.bytes.saturating_sub(file.size);
        self.files = self.files.saturating_sub(1);
    }
}

/// Outcome of a single sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub root: PathBuf,
    /// The root did not exist, nothing was scanned
    pub root_missing: bool,
    pub scanned: usize,
    /// Entries whose metadata could not be read
    pub skipped: usize,
    pub deleted: usize,
    pub reclaimed_bytes: u64,
    pub delete_failures: usize,
    pub remaining: Totals,
    pub within_budget: bool,
    pub finished_at: DateTime<Utc>,
}

impl SweepReport {
    pub(crate) fn empty(root: PathBuf) -> Self {
        Self {
            root,
            root_missing: false,
            scanned: 0,
            skipped: 0,
            deleted: 0,
            reclaimed_bytes: 0,
            delete_failures: 0,
            remaining: Totals::default(),
            within_budget: true,
            finished_at: Utc::now(),
        }
    }
}
