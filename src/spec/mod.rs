//! Data model of a suite document.
//!
//! A [`SuiteSpec`] is built once per document and never mutated afterwards. Each of its
//! [`TestCaseSpec`]s is the case's own mapping overlaid on the suite's `common` block.

use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};

use crate::lifecycle::ServerSpec;
use crate::{err_msg, JsonTestError};

pub mod loader;
pub mod merge;

pub use loader::{load_file, parse_document};

/// Absolute path metadata injected into every suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMeta {
    pub source_dir: PathBuf,
    pub source_file: PathBuf,
    pub root_dir: PathBuf,
}

impl PathMeta {
    /// Metadata for `file`, with `root_dir` used to shorten suite titles.
    pub fn for_file(file: &Path, root_dir: &Path) -> Self {
        let source_file = normalize(file);
        let source_dir = source_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            source_dir,
            source_file,
            root_dir: normalize(root_dir),
        }
    }
}

/// Which execution strategy a suite uses, decided once from field presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Factory,
    Class,
    Request,
}

impl StrategyKind {
    /// `factory` wins over `class`; neither selects HTTP requests.
    pub fn of(document: &Map<String, Value>) -> Self {
        if document.contains_key("factory") {
            StrategyKind::Factory
        } else if document.contains_key("class") {
            StrategyKind::Class
        } else {
            StrategyKind::Request
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Factory => "factory",
            StrategyKind::Class => "class",
            StrategyKind::Request => "request",
        }
    }
}

/// One parsed suite document.
#[derive(Debug, Clone)]
pub struct SuiteSpec {
    pub description: Option<String>,
    pub kind: StrategyKind,
    /// The `factory` or `class` path, depending on `kind`.
    pub target: Option<String>,
    /// Suite-level constructor arguments (class suites).
    pub construct: Option<Vec<Value>>,
    pub server: Option<ServerSpec>,
    pub tests: Vec<TestCaseSpec>,
    pub meta: PathMeta,
    document: Map<String, Value>,
}

impl SuiteSpec {
    /// Any suite-level field, including ones only a factory understands.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    pub fn has_tests(&self) -> bool {
        !self.tests.is_empty()
    }

    /// `"<description> (<sourceFile relative to rootDir>)"`.
    pub fn title(&self) -> String {
        let file = self
            .meta
            .source_file
            .strip_prefix(&self.meta.root_dir)
            .unwrap_or(&self.meta.source_file)
            .display()
            .to_string();
        match self.description.as_deref() {
            Some(description) => format!("{} ({})", description, file),
            None => file,
        }
    }

    /// Resolves `path` against the directory of the suite document.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        resolve_relative(&self.meta.source_dir, path)
    }

    pub(crate) fn new(
        document: Map<String, Value>,
        tests: Vec<TestCaseSpec>,
        meta: PathMeta,
    ) -> Result<Self, JsonTestError> {
        let kind = StrategyKind::of(&document);
        let description = optional_string(&document, "description")?;
        let target = match kind {
            StrategyKind::Factory => optional_string(&document, "factory")?,
            StrategyKind::Class => optional_string(&document, "class")?,
            StrategyKind::Request => None,
        };
        let construct = match kind {
            StrategyKind::Class => optional_args(&document, "construct")?,
            _ => None,
        };
        let server = match (kind, document.get("server")) {
            (StrategyKind::Request, Some(value)) => Some(ServerSpec::from_value(value, &meta.source_dir)?),
            (_, Some(_)) => {
                tracing::warn!(
                    file = %meta.source_file.display(),
                    kind = kind.as_str(),
                    "`server` is only honoured by request suites"
                );
                None
            }
            (_, None) => None,
        };
        Ok(Self {
            description,
            kind,
            target,
            construct,
            server,
            tests,
            meta,
            document,
        })
    }
}

pub const TRANSPORT_ERROR_KIND: &str = "TransportError";

/// Structured form of a case's `exception` field.
///
/// A plain string matches the raised message exactly; an object may also name a `kind`.
/// Transport failures carry the kind `TransportError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedException {
    pub message: Option<String>,
    pub kind: Option<String>,
}

impl ExpectedException {
    /// True when every configured field equals the raised error's.
    pub fn matches(&self, error: &JsonTestError) -> bool {
        let (message, kind) = match error {
            JsonTestError::Raised { message, kind } => (message, kind.as_deref()),
            JsonTestError::Transport { message, .. } => (message, Some(TRANSPORT_ERROR_KIND)),
            _ => return false,
        };
        let message_ok = self.message.as_ref().map_or(true, |m| m == message);
        let kind_ok = self.kind.as_deref().map_or(true, |k| kind == Some(k));
        message_ok && kind_ok
    }
}

/// One merged case of a suite.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCaseSpec {
    pub index: usize,
    fields: Map<String, Value>,
}

impl TestCaseSpec {
    pub fn new(index: usize, mut fields: Map<String, Value>) -> Self {
        fields.insert(merge::INDEX_KEY.to_string(), Value::from(index));
        Self { index, fields }
    }

    /// `"Test #<index+1>"`, with `" -- <description>"` when the case has one.
    pub fn title(&self) -> String {
        match self.description() {
            Some(description) => format!("Test #{} -- {}", self.index + 1, description),
            None => format!("Test #{}", self.index + 1),
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.fields.get("description").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// `expected`, or `null` when the case declares none.
    pub fn expected(&self) -> &Value {
        self.fields.get("expected").unwrap_or(&Value::Null)
    }

    pub fn property(&self) -> Result<Option<&str>, JsonTestError> {
        self.str_field("property")
    }

    pub fn method(&self) -> Result<Option<&str>, JsonTestError> {
        self.str_field("method")
    }

    /// `params`, defaulting to no arguments.
    pub fn params(&self) -> Result<Vec<Value>, JsonTestError> {
        Ok(optional_args(&self.fields, "params")?.unwrap_or_default())
    }

    pub fn construct(&self) -> Result<Option<Vec<Value>>, JsonTestError> {
        optional_args(&self.fields, "construct")
    }

    /// `options`, defaulting to an empty mapping.
    pub fn options(&self) -> Result<Map<String, Value>, JsonTestError> {
        match self.fields.get("options") {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(options)) => Ok(options.clone()),
            Some(other) => Err(err_msg!(
                Configuration,
                "`options` of {} must be an object, found {}",
                self.title(),
                type_name(other)
            )),
        }
    }

    pub fn exception(&self) -> Result<Option<ExpectedException>, JsonTestError> {
        match self.fields.get("exception") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(message)) => Ok(Some(ExpectedException {
                message: Some(message.clone()),
                kind: None,
            })),
            Some(Value::Object(map)) => Ok(Some(ExpectedException {
                message: optional_string(map, "message")?,
                kind: optional_string(map, "kind")?,
            })),
            Some(other) => Err(err_msg!(
                Configuration,
                "`exception` must be a string or an object, found {}",
                type_name(other)
            )),
        }
    }

    fn str_field(&self, key: &str) -> Result<Option<&str>, JsonTestError> {
        match self.fields.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(err_msg!(
                Configuration,
                "`{}` of {} must be a string, found {}",
                key,
                self.title(),
                type_name(other)
            )),
        }
    }
}

/// Joins a relative `path` onto `base` and normalises `.`/`..` lexically.
pub fn resolve_relative(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

/// Lexical normalisation; relative inputs are anchored at the working directory.
pub fn normalize(path: &Path) -> PathBuf {
    let anchored = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut out = PathBuf::new();
    for component in anchored.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn optional_string(map: &Map<String, Value>, key: &str) -> Result<Option<String>, JsonTestError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(err_msg!(
            Configuration,
            "`{}` must be a string, found {}",
            key,
            type_name(other)
        )),
    }
}

fn optional_args(map: &Map<String, Value>, key: &str) -> Result<Option<Vec<Value>>, JsonTestError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(args)) => Ok(Some(args.clone())),
        Some(other) => Err(err_msg!(
            Configuration,
            "`{}` must be an argument array, found {}",
            key,
            type_name(other)
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn case(index: usize, value: Value) -> TestCaseSpec {
        let Value::Object(fields) = value else { unreachable!() };
        TestCaseSpec::new(index, fields)
    }

    #[test]
    fn titles_are_one_based() {
        assert_eq!(case(0, json!({})).title(), "Test #1");
        assert_eq!(
            case(4, json!({"description": "sums"})).title(),
            "Test #5 -- sums"
        );
    }

    #[test]
    fn index_is_carried_in_the_fields() {
        assert_eq!(case(2, json!({})).get("__index"), Some(&json!(2)));
    }

    #[test]
    fn strategy_kind_prefers_factory() {
        let doc = |v: Value| match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        assert_eq!(StrategyKind::of(&doc(json!({"factory": "f", "class": "c"}))), StrategyKind::Factory);
        assert_eq!(StrategyKind::of(&doc(json!({"class": "c"}))), StrategyKind::Class);
        assert_eq!(StrategyKind::of(&doc(json!({}))), StrategyKind::Request);
    }

    #[test]
    fn exception_accepts_string_or_object() {
        let plain = case(0, json!({"exception": "boom"})).exception().unwrap().unwrap();
        assert_eq!(plain.message.as_deref(), Some("boom"));
        let structured = case(0, json!({"exception": {"kind": "range"}}))
            .exception()
            .unwrap()
            .unwrap();
        assert_eq!(structured.message, None);
        assert!(case(0, json!({"exception": 3})).exception().is_err());
    }

    #[test]
    fn exception_matching_requires_every_given_field() {
        let raised = JsonTestError::Raised {
            message: "boom".into(),
            kind: Some("range".into()),
        };
        let by_message = ExpectedException { message: Some("boom".into()), kind: None };
        let by_both = ExpectedException { message: Some("boom".into()), kind: Some("type".into()) };
        assert!(by_message.matches(&raised));
        assert!(!by_both.matches(&raised));
        assert!(!by_message.matches(&err_msg!(Configuration, "boom")));
        let by_transport = ExpectedException { message: None, kind: Some("TransportError".into()) };
        assert!(by_transport.matches(&err_msg!(Transport, "refused")));
        assert!(!by_transport.matches(&raised));
    }

    #[test]
    fn relative_paths_resolve_against_the_document_dir() {
        let resolved = resolve_relative(Path::new("/suites/math"), "../lib/./sum.js");
        assert_eq!(resolved, PathBuf::from("/suites/lib/sum.js"));
        assert_eq!(resolve_relative(Path::new("/a"), "/b/c"), PathBuf::from("/b/c"));
    }
}
