//! Turns a suite document into a [`SuiteSpec`].

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use super::merge::{inject_metadata, merge};
use super::{type_name, PathMeta, SuiteSpec, TestCaseSpec};
use crate::{err_msg, JsonTestError};

/// Reads and decodes the suite document at `path`.
pub fn load_file(path: &Path, root_dir: &Path) -> Result<SuiteSpec, JsonTestError> {
    let source = fs::read_to_string(path).map_err(|e| JsonTestError::Io {
        message: format!("failed to read '{}': {}", path.display(), e),
        source: Some(e),
    })?;
    let document = parse_document(&source, &path.display().to_string())?;
    SuiteSpec::from_document(document, PathMeta::for_file(path, root_dir))
}

/// Decodes JSON text, reporting failures with a labeled span into `source`.
pub fn parse_document(source: &str, name: &str) -> Result<Value, JsonTestError> {
    serde_json::from_str(source).map_err(|e| JsonTestError::from_json(name, source, &e))
}

impl SuiteSpec {
    /// Builds a suite from an already decoded document.
    ///
    /// A missing or non-array `tests` field yields a suite without cases, which
    /// registration reports as skipped.
    pub fn from_document(document: Value, meta: PathMeta) -> Result<SuiteSpec, JsonTestError> {
        let Value::Object(document) = document else {
            return Err(err_msg!(
                Configuration,
                "suite document {} must be an object, found {}",
                meta.source_file.display(),
                type_name(&document)
            ));
        };
        let common = match document.get("common") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(common)) => common.clone(),
            Some(other) => {
                return Err(err_msg!(
                    Configuration,
                    "`common` must be an object, found {}",
                    type_name(other)
                ))
            }
        };
        let common = inject_metadata(&common, &meta.source_dir, &meta.source_file);

        let mut tests = Vec::new();
        if let Some(Value::Array(cases)) = document.get("tests") {
            for (index, case) in cases.iter().enumerate() {
                let Value::Object(case) = case else {
                    return Err(err_msg!(
                        Configuration,
                        "tests[{}] must be an object, found {}",
                        index,
                        type_name(case)
                    ));
                };
                tests.push(TestCaseSpec::new(index, merge(&common, case)));
            }
        }
        SuiteSpec::new(document, tests, meta)
    }
}
