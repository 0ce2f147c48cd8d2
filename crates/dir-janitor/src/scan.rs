//! Recursive listing of regular files

use crate::types::CachedFile;
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

/// Files found under a root, plus the number of entries that could not be read
#[derive(Debug, Default)]
pub struct ScanResult {
    pub files: Vec<CachedFile>,
    pub skipped: usize,
}

/// List every regular file under `root` with its size and modification time.
///
/// Symlinks are not followed. An entry that cannot be read is logged and
/// counted in `skipped`; it never aborts the scan.
pub fn scan_files(root: &Path) -> ScanResult {
    let mut result = ScanResult::default();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = ?root, error = %e, "Skipping unreadable entry");
                result.skipped += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = ?entry.path(), error = %e, "Failed to stat file");
                result.skipped += 1;
                continue;
            }
        };

        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                warn!(path = ?entry.path(), error = %e, "No modification time");
                result.skipped += 1;
                continue;
            }
        };

        result.files.push(CachedFile {
            path: entry.into_path(),
            size: metadata.len(),
            modified,
        });
    }

    result
}
