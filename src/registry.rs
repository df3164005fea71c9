//! Resolver for the `class` and `factory` paths of suite documents.
//!
//! Suites name their subjects by path. Instead of loading code at run time, the embedding
//! program registers constructible classes and factory functions under names, and the
//! registry maps a document path onto one of them.
//!
//! ## Lookup Order
//! For a path `./lib/counter.js` in `/suites/a.json`:
//! 1. the resolved absolute path, `/suites/lib/counter.js`
//! 2. the path exactly as written, `./lib/counter.js`
//! 3. the file stem, `counter`

use std::path::Path;
use std::sync::Arc;

use im::HashMap;
use serde_json::Value;

use crate::spec::{normalize, resolve_relative, SuiteSpec, TestCaseSpec};
use crate::strategy::factory::FactoryStrategy;
use crate::{Done, JsonTestError};

/// Instance of a registered class, exercised by class suites.
pub trait Subject: Send {
    /// Reads a property. Unknown properties read as `null`.
    fn property(&self, name: &str) -> Result<Value, JsonTestError>;
    /// Invokes a method with positional arguments.
    fn call(&mut self, method: &str, params: &[Value]) -> Result<Value, JsonTestError>;
}

/// Error raised by a subject, matched against a case's `exception`.
pub fn raise(message: impl Into<String>) -> JsonTestError {
    JsonTestError::Raised {
        message: message.into(),
        kind: None,
    }
}

/// Like [`raise`], with a structured kind for `{"exception": {"kind": ...}}`.
pub fn raise_kind(kind: impl Into<String>, message: impl Into<String>) -> JsonTestError {
    JsonTestError::Raised {
        message: message.into(),
        kind: Some(kind.into()),
    }
}

/// The error a subject should raise for a method it does not have.
pub fn unknown_method(method: &str) -> JsonTestError {
    raise_kind("TypeError", format!("{} is not a function", method))
}

type Constructor = dyn Fn(&[Value]) -> Result<Box<dyn Subject>, JsonTestError> + Send + Sync;

/// Constructible type descriptor.
#[derive(Clone)]
pub struct ClassDescriptor {
    name: String,
    required_args: usize,
    constructor: Arc<Constructor>,
}

impl ClassDescriptor {
    pub fn new<F, S>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&[Value]) -> Result<S, JsonTestError> + Send + Sync + 'static,
        S: Subject + 'static,
    {
        let boxed: Arc<Constructor> = Arc::new(
            move |args: &[Value]| -> Result<Box<dyn Subject>, JsonTestError> {
                let subject = constructor(args)?;
                Ok(Box::new(subject))
            },
        );
        Self {
            name: name.into(),
            required_args: 0,
            constructor: boxed,
        }
    }

    /// Declares how many constructor arguments the class cannot do without.
    pub fn requires(mut self, count: usize) -> Self {
        self.required_args = count;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn construct(&self, args: &[Value]) -> Result<Box<dyn Subject>, JsonTestError> {
        if args.len() < self.required_args {
            return Err(JsonTestError::Configuration {
                message: format!(
                    "class `{}` needs {} constructor argument(s), got {}",
                    self.name,
                    self.required_args,
                    args.len()
                ),
                help: Some("add `construct` to the suite or to the case".to_string()),
            });
        }
        (self.constructor)(args)
    }
}

impl std::fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("required_args", &self.required_args)
            .finish()
    }
}

/// Factory function: owns the whole semantics of a case and completes `done` itself.
pub type FactoryFn = Arc<dyn Fn(&FactoryStrategy, Done, &SuiteSpec, &TestCaseSpec) + Send + Sync>;

/// Registry of classes and factories, inspectable at runtime.
#[derive(Clone, Default)]
pub struct Registry {
    classes: HashMap<String, ClassDescriptor>,
    factories: HashMap<String, FactoryFn>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_class(&mut self, name: &str, class: ClassDescriptor) {
        self.classes.insert(registry_key(name), class);
    }

    pub fn register_factory<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&FactoryStrategy, Done, &SuiteSpec, &TestCaseSpec) + Send + Sync + 'static,
    {
        self.factories.insert(registry_key(name), Arc::new(factory));
    }

    pub fn resolve_class(&self, path: &str, source_dir: &Path) -> Result<ClassDescriptor, JsonTestError> {
        lookup(&self.classes, path, source_dir)
            .cloned()
            .ok_or_else(|| not_registered("class", path, source_dir))
    }

    pub fn resolve_factory(&self, path: &str, source_dir: &Path) -> Result<FactoryFn, JsonTestError> {
        lookup(&self.factories, path, source_dir)
            .cloned()
            .ok_or_else(|| not_registered("factory", path, source_dir))
    }

    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.classes.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn factory_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.factories.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("classes", &self.class_names())
            .field("factories", &self.factory_names())
            .finish()
    }
}

fn registry_key(name: &str) -> String {
    let path = Path::new(name);
    if path.is_absolute() {
        normalize(path).display().to_string()
    } else {
        name.to_string()
    }
}

fn candidates(path: &str, source_dir: &Path) -> Vec<String> {
    let mut keys = vec![resolve_relative(source_dir, path).display().to_string(), path.to_string()];
    if let Some(stem) = Path::new(path).file_stem().and_then(|s| s.to_str()) {
        keys.push(stem.to_string());
    }
    keys
}

fn lookup<'a, V: Clone>(map: &'a HashMap<String, V>, path: &str, source_dir: &Path) -> Option<&'a V> {
    candidates(path, source_dir)
        .iter()
        .find_map(|key| map.get(key.as_str()))
}

fn not_registered(what: &str, path: &str, source_dir: &Path) -> JsonTestError {
    JsonTestError::Configuration {
        message: format!("no {} registered for `{}`", what, path),
        help: Some(format!(
            "looked up {}",
            candidates(path, source_dir).join(", ")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(i64);

    impl Subject for Fixed {
        fn property(&self, name: &str) -> Result<Value, JsonTestError> {
            Ok(if name == "value" { json!(self.0) } else { Value::Null })
        }

        fn call(&mut self, method: &str, _params: &[Value]) -> Result<Value, JsonTestError> {
            Err(unknown_method(method))
        }
    }

    fn fixed() -> ClassDescriptor {
        ClassDescriptor::new("Fixed", |args: &[Value]| {
            Ok(Fixed(args.first().and_then(Value::as_i64).unwrap_or(0)))
        })
    }

    #[test]
    fn resolves_by_absolute_path_raw_name_or_stem() {
        let mut registry = Registry::new();
        registry.register_class("/suites/lib/fixed.js", fixed());
        registry.register_class("./other.js", fixed());
        registry.register_class("counter", fixed());
        let dir = Path::new("/suites/cases");
        assert!(registry.resolve_class("../lib/fixed.js", dir).is_ok());
        assert!(registry.resolve_class("./other.js", dir).is_ok());
        assert!(registry.resolve_class("./lib/counter.js", dir).is_ok());
    }

    #[test]
    fn unknown_paths_are_configuration_errors() {
        let registry = Registry::new();
        let err = registry.resolve_factory("./missing.js", Path::new("/s")).err().unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        assert!(err.to_string().contains("no factory registered for `./missing.js`"));
    }

    #[test]
    fn required_arguments_are_enforced() {
        let class = fixed().requires(1);
        assert!(class.construct(&[]).is_err());
        let subject = class.construct(&[json!(7)]).unwrap();
        assert_eq!(subject.property("value").unwrap(), json!(7));
    }
}
