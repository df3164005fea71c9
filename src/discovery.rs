//! Locates suite documents on disk.

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::spec::normalize;
use crate::JsonTestError;

/// Directories scanned when none are given, relative to the working directory.
pub const DEFAULT_DIRS: [&str; 2] = ["test", "tests"];

fn is_suite_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// Recursively collects `*.json` files under every directory in `dirs`.
///
/// The list is sorted so suites run in a deterministic order.
pub fn discover_suite_files<P: AsRef<Path>>(dirs: &[P]) -> Result<Vec<PathBuf>, JsonTestError> {
    let mut files = Vec::new();
    for dir in dirs {
        for entry in WalkDir::new(dir.as_ref()) {
            let entry = entry.map_err(|e| JsonTestError::Io {
                message: format!("failed to walk {}: {}", dir.as_ref().display(), e),
                source: e.into_io_error(),
            })?;
            if entry.file_type().is_file() && is_suite_file(entry.path()) {
                files.push(normalize(entry.path()));
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Longest shared leading run of path components; suite titles are shown relative to it.
pub fn common_root<P: AsRef<Path>>(dirs: &[P]) -> PathBuf {
    let mut normalized = dirs.iter().map(|d| normalize(d.as_ref()));
    let Some(first) = normalized.next() else {
        return PathBuf::new();
    };
    let mut shared: Vec<Component<'_>> = Vec::new();
    let rest: Vec<PathBuf> = normalized.collect();
    for (i, component) in first.components().enumerate() {
        if rest.iter().all(|p| p.components().nth(i) == Some(component)) {
            shared.push(component);
        } else {
            break;
        }
    }
    shared.iter().map(|c| c.as_os_str()).collect()
}

/// The subset of [`DEFAULT_DIRS`] that exists under `cwd`.
pub fn default_dirs(cwd: &Path) -> Vec<PathBuf> {
    DEFAULT_DIRS
        .iter()
        .map(|name| cwd.join(name))
        .filter(|dir| dir.is_dir())
        .collect()
}
