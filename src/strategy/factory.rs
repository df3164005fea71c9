//! Factory suites: each case is handed to a registered factory function.
//!
//! Apart from `factory`, `description` and `tests`, every field of the document means
//! whatever the factory decides. The factory compares, and completes `done`, on its own.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::compare::{self, CheckResult};
use crate::host::SuiteScope;
use crate::registry::FactoryFn;
use crate::spec::{SuiteSpec, TestCaseSpec};

struct FactoryInner {
    suite: SuiteSpec,
    factory: FactoryFn,
}

/// The handle a factory receives as its first argument.
#[derive(Clone)]
pub struct FactoryStrategy {
    inner: Arc<FactoryInner>,
}

impl FactoryStrategy {
    pub fn new(suite: SuiteSpec, factory: FactoryFn) -> Self {
        Self {
            inner: Arc::new(FactoryInner { suite, factory }),
        }
    }

    /// Deep comparison, same as every other strategy uses.
    pub fn check(&self, actual: &Value, expected: &Value) -> CheckResult {
        compare::check(actual, expected)
    }

    /// Resolves `path` against the suite document's directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        self.inner.suite.resolve_path(path)
    }

    pub fn suite(&self) -> &SuiteSpec {
        &self.inner.suite
    }

    pub fn add_test(&self, scope: &mut dyn SuiteScope, case: TestCaseSpec) {
        let strategy = self.clone();
        scope.it(
            case.title(),
            Box::new(move |done| {
                let inner = &strategy.inner;
                (inner.factory)(&strategy, done, &inner.suite, &case);
            }),
        );
    }
}

impl std::fmt::Debug for FactoryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryStrategy")
            .field("factory", &self.inner.suite.target)
            .finish()
    }
}
