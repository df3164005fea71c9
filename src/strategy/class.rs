//! Class suites: exercise the properties and methods of a registered class.
//!
//! With a suite-level `construct`, one instance is built at registration and every case
//! runs against it in declaration order, so a suite can walk a stateful object step by
//! step. Without it, each case builds a fresh instance from its own `construct`.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::compare::check;
use crate::host::{Completion, SuiteScope};
use crate::registry::{ClassDescriptor, Subject};
use crate::spec::TestCaseSpec;
use crate::{err_msg, JsonTestError};

enum Instance {
    /// Per-case mode: every case constructs its own subject.
    NoInstance,
    Ready(Box<dyn Subject>),
    /// The suite-level constructor raised; kept so every case can report it.
    Failed(String),
}

struct ClassInner {
    class: ClassDescriptor,
    shared: Mutex<Instance>,
}

#[derive(Clone)]
pub struct ClassStrategy {
    inner: Arc<ClassInner>,
}

impl ClassStrategy {
    /// Builds the shared instance right away when `construct` is given.
    pub fn new(class: ClassDescriptor, construct: Option<&[Value]>) -> Self {
        let shared = match construct {
            None => Instance::NoInstance,
            Some(args) => match class.construct(args) {
                Ok(subject) => Instance::Ready(subject),
                Err(e) => {
                    tracing::warn!(class = class.name(), error = %e, "shared instance could not be built");
                    Instance::Failed(e.to_string())
                }
            },
        };
        Self {
            inner: Arc::new(ClassInner {
                class,
                shared: Mutex::new(shared),
            }),
        }
    }

    pub fn has_shared_instance(&self) -> bool {
        matches!(*self.lock(), Instance::Ready(_))
    }

    pub fn add_test(&self, scope: &mut dyn SuiteScope, case: TestCaseSpec) {
        let strategy = self.clone();
        scope.it(
            case.title(),
            Box::new(move |done| done.complete(strategy.run_case(&case))),
        );
    }

    /// Runs one case to completion.
    pub fn run_case(&self, case: &TestCaseSpec) -> Completion {
        let exception = case.exception()?;
        let mut shared = self.lock();
        let outcome = match &mut *shared {
            Instance::Ready(subject) => exercise(subject.as_mut(), case),
            Instance::Failed(reason) => {
                return Err(err_msg!(
                    Configuration,
                    "shared `{}` instance is unavailable: {}",
                    self.inner.class.name(),
                    reason
                ))
            }
            Instance::NoInstance => {
                let args = case.construct()?.unwrap_or_default();
                self.inner
                    .class
                    .construct(&args)
                    .and_then(|mut subject| exercise(subject.as_mut(), case))
            }
        };
        match outcome {
            Ok(actual) => check(&actual, case.expected()),
            Err(e) if exception.as_ref().is_some_and(|x| x.matches(&e)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Instance> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ClassStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassStrategy")
            .field("class", &self.inner.class)
            .field("shared", &self.has_shared_instance())
            .finish()
    }
}

/// Computes the case's actual value: a property read, else a method call.
fn exercise(subject: &mut dyn Subject, case: &TestCaseSpec) -> Result<Value, JsonTestError> {
    if let Some(property) = case.property()? {
        return subject.property(property);
    }
    if let Some(method) = case.method()? {
        return subject.call(method, &case.params()?);
    }
    Err(err_msg!(Configuration, "{} has neither `property` nor `method`", case.title())
        .with_help("add `property` to read a value or `method` (and `params`) to call one"))
}
