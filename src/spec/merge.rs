//! Overlay of a suite's `common` block onto each of its cases.

use std::path::Path;

use serde_json::{Map, Value};

pub const SOURCE_DIR_KEY: &str = "sourceDir";
pub const SOURCE_FILE_KEY: &str = "sourceFile";
pub const INDEX_KEY: &str = "__index";

/// Returns a copy of `common` carrying the document's path metadata.
///
/// Done once per suite, before any case is merged.
pub fn inject_metadata(common: &Map<String, Value>, source_dir: &Path, source_file: &Path) -> Map<String, Value> {
    let mut common = common.clone();
    common.insert(
        SOURCE_DIR_KEY.to_string(),
        Value::String(source_dir.display().to_string()),
    );
    common.insert(
        SOURCE_FILE_KEY.to_string(),
        Value::String(source_file.display().to_string()),
    );
    common
}

/// Shallow key-wise overlay: keys of `case` win over keys of `common`.
///
/// Neither input is modified; each call yields a fresh mapping.
pub fn merge(common: &Map<String, Value>, case: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = common.clone();
    for (key, value) in case {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
