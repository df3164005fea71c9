//! Registers suite documents with a [`Host`].
//!
//! Per suite: the teardown hook, then the setup hook, then one case per entry of `tests`,
//! all inside a single `describe`. Suites with no cases, or whose strategy cannot be
//! built, are reported through [`Host::skip_suite`] instead.

use std::path::Path;
use std::sync::Arc;

use crate::host::Host;
use crate::registry::Registry;
use crate::spec::{self, SuiteSpec};
use crate::strategy::{self, HttpTransport, ReqwestTransport};
use crate::JsonTestError;

/// What happened to one suite document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Registered { title: String, cases: usize },
    /// Nothing to run: the document declares no cases.
    Skipped { reason: String },
    /// The suite's `class` or `factory` could not be resolved; reported like a skip.
    Misconfigured { reason: String },
}

impl Registration {
    /// Whether the run should fail on account of this suite before any case runs.
    pub fn is_error(&self) -> bool {
        matches!(self, Registration::Misconfigured { .. })
    }
}

/// Turns suite documents into host registrations.
#[derive(Clone)]
pub struct SuiteLoader {
    registry: Registry,
    transport: Arc<dyn HttpTransport>,
}

impl SuiteLoader {
    /// A loader whose request suites go over the network.
    pub fn new(registry: Registry) -> Result<Self, JsonTestError> {
        Ok(Self::with_transport(registry, Arc::new(ReqwestTransport::new()?)))
    }

    pub fn with_transport(registry: Registry, transport: Arc<dyn HttpTransport>) -> Self {
        Self { registry, transport }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Loads `path` and registers it. Only document errors are returned.
    pub fn register_file(
        &self,
        host: &mut dyn Host,
        path: &Path,
        root_dir: &Path,
    ) -> Result<Registration, JsonTestError> {
        let suite = spec::load_file(path, root_dir)?;
        Ok(self.register(host, suite))
    }

    pub fn register(&self, host: &mut dyn Host, suite: SuiteSpec) -> Registration {
        let file = suite.meta.source_file.clone();
        if !suite.has_tests() {
            let reason = format!("No tests found in file {}", file.display());
            tracing::info!(file = %file.display(), "suite skipped: no tests");
            host.skip_suite(&file, &reason);
            return Registration::Skipped { reason };
        }

        let strategy = match strategy::select(&suite, &self.registry, &self.transport) {
            Ok(strategy) => strategy,
            Err(e) => {
                let reason = match miette::Diagnostic::help(&e) {
                    Some(help) => format!("{} ({})", e, help),
                    None => e.to_string(),
                };
                tracing::warn!(file = %file.display(), error = %e, "suite misconfigured");
                host.skip_suite(&file, &reason);
                return Registration::Misconfigured { reason };
            }
        };

        let title = suite.title();
        let cases = suite.tests.len();
        tracing::debug!(title = %title, kind = suite.kind.as_str(), cases, "registering suite");
        let tests = suite.tests;
        host.describe(
            title.clone(),
            Box::new(move |scope| {
                let teardown = strategy.clone();
                scope.after(Box::new(move || teardown.tear_down()));
                let setup = strategy.clone();
                scope.before(Box::new(move |done| setup.set_up(done)));
                for case in tests {
                    strategy.add_test(scope, case);
                }
            }),
        );
        Registration::Registered { title, cases }
    }
}

impl std::fmt::Debug for SuiteLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteLoader")
            .field("registry", &self.registry)
            .finish()
    }
}
